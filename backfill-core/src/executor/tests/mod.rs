use super::*;
use rstest::rstest;

#[rstest]
#[case(0, 1, ExecutorConfigError::ZeroBatchSize)]
#[case(1, 0, ExecutorConfigError::ZeroConcurrency)]
fn rejects_zero_values(
    #[case] batch_size: usize,
    #[case] concurrency: usize,
    #[case] expected: ExecutorConfigError,
) {
    assert_eq!(ExecutorConfig::new(batch_size, concurrency), Err(expected));
}

#[rstest]
fn defaults_match_reference_tuning() {
    let config = ExecutorConfig::default();
    assert_eq!(config.batch_size().get(), DEFAULT_BATCH_SIZE);
    assert_eq!(config.concurrency().get(), DEFAULT_CONCURRENCY);
    assert_eq!(config.item_timeout(), None);
}

#[rstest]
fn unbatched_keeps_ceiling_and_timeout() {
    let config = ExecutorConfig::new(3, 2)
        .expect("valid config")
        .with_item_timeout(Duration::from_millis(50))
        .to_unbatched();
    assert_eq!(config.batch_size(), NonZeroUsize::MAX);
    assert_eq!(config.concurrency().get(), 2);
    assert_eq!(config.item_timeout(), Some(Duration::from_millis(50)));
}

#[rstest]
#[case(DuplicatePolicy::Quarantine, true)]
#[case(DuplicatePolicy::Skip, false)]
fn duplicate_policy_decides_retention(#[case] policy: DuplicatePolicy, #[case] kept: bool) {
    let duplicate = CreateError::Duplicate { id: "4".into() };
    assert_eq!(policy.retains(&duplicate), kept);
    assert!(policy.retains(&CreateError::store("offline")));
}

#[rstest]
fn into_quarantine_counts_dropped_duplicates() {
    let report = ExecutionReport {
        attempted: 3,
        succeeded: 1,
        failures: vec![
            Failure {
                item: 1,
                error: CreateError::Duplicate { id: "1".into() },
            },
            Failure {
                item: 2,
                error: CreateError::store("offline"),
            },
        ],
    };
    let (retained, dropped) = report.into_quarantine(DuplicatePolicy::Skip);
    assert_eq!(retained, vec![2]);
    assert_eq!(dropped, 1);
}

mod runs {
    use std::{collections::HashMap, time::Duration};

    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    use crate::{
        BatchExecutor, CreateError, ExecutorConfig, Record, RecordId, SilentObserver,
        test_support::{CallMark, MemorySink, RecordedEvent, RecordingObserver, block_on_for_tests},
    };

    fn records(count: i64) -> Vec<Record> {
        (0..count).map(Record::with_empty_payload).collect()
    }

    fn executor(batch_size: usize, concurrency: usize) -> BatchExecutor {
        BatchExecutor::new(ExecutorConfig::new(batch_size, concurrency).expect("valid config"))
    }

    /// Assert no call of batch `k + 1` started before every call of batch `k`
    /// finished.
    fn assert_batches_sequential(journal: &[CallMark<RecordId>], items: &[Record], batch_size: usize) {
        let batch_of: HashMap<&RecordId, usize> = items
            .iter()
            .enumerate()
            .map(|(index, item)| (&item.id, index / batch_size))
            .collect();
        let sizes: Vec<usize> = items.chunks(batch_size).map(<[Record]>::len).collect();
        let mut finished = vec![0_usize; sizes.len()];
        for mark in journal {
            match mark {
                CallMark::Started(id) => {
                    let batch = batch_of[id];
                    for earlier in 0..batch {
                        assert_eq!(
                            finished[earlier], sizes[earlier],
                            "item {id} of batch {batch} started before batch {earlier} settled"
                        );
                    }
                }
                CallMark::Finished(id) => finished[batch_of[id]] += 1,
            }
        }
    }

    #[fixture]
    fn sink() -> MemorySink<Record> {
        MemorySink::new()
    }

    #[rstest]
    #[tokio::test]
    async fn empty_input_issues_no_calls(sink: MemorySink<Record>) {
        let observer = RecordingObserver::default();
        let report = executor(3, 2).run(&records(0), &sink, &observer).await;
        assert_eq!(report.attempted, 0);
        assert!(report.failures.is_empty());
        assert!(sink.calls().is_empty());
        assert!(observer.events().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn every_item_is_attempted_once(sink: MemorySink<Record>) {
        let items = records(10);
        let report = executor(3, 2).run(&items, &sink, &SilentObserver).await;

        let mut calls = sink.calls();
        calls.sort();
        let expected: Vec<RecordId> = items.iter().map(|item| item.id.clone()).collect();
        assert_eq!(calls, expected);
        assert_eq!(report.attempted, 10);
        assert_eq!(report.succeeded, 10);
        assert_eq!(sink.stored().len(), 10);
    }

    #[rstest]
    #[tokio::test]
    async fn failures_do_not_cancel_siblings(sink: MemorySink<Record>) {
        let items = records(6);
        sink.fail_on([RecordId::Number(1), RecordId::Number(4)]);

        let report = executor(3, 3).run(&items, &sink, &SilentObserver).await;

        let mut failed: Vec<RecordId> = report
            .failures
            .iter()
            .map(|failure| failure.item.id.clone())
            .collect();
        failed.sort();
        assert_eq!(failed, vec![RecordId::Number(1), RecordId::Number(4)]);
        assert_eq!(report.succeeded, 4);
        assert_eq!(sink.calls().len(), 6);
        assert!(
            report
                .failures
                .iter()
                .all(|failure| matches!(failure.error, CreateError::Store { .. }))
        );
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    #[tokio::test]
    async fn in_flight_calls_never_exceed_ceiling(#[case] concurrency: usize) {
        let sink: MemorySink<Record> = MemorySink::new().with_delay(Duration::from_millis(5));
        let items = records(12);

        let _report = executor(12, concurrency).run(&items, &sink, &SilentObserver).await;

        assert!(sink.peak_in_flight() <= concurrency);
        assert_eq!(sink.peak_in_flight(), concurrency, "ceiling should be reached");
    }

    #[rstest]
    #[tokio::test]
    async fn batches_settle_before_the_next_starts() {
        let sink: MemorySink<Record> = MemorySink::new().with_delay(Duration::from_millis(2));
        let items = records(7);

        let _report = executor(3, 3).run(&items, &sink, &SilentObserver).await;

        assert_batches_sequential(&sink.journal(), &items, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn stalled_items_time_out(sink: MemorySink<Record>) {
        let items = records(3);
        sink.stall_on([RecordId::Number(2)]);
        let config = ExecutorConfig::new(3, 3)
            .expect("valid config")
            .with_item_timeout(Duration::from_millis(20));

        let report = BatchExecutor::new(config)
            .run(&items, &sink, &SilentObserver)
            .await;

        assert_eq!(report.succeeded, 2);
        let [failure] = report.failures.as_slice() else {
            panic!("expected exactly one failure, got {:?}", report.failures);
        };
        assert_eq!(failure.item.id, RecordId::Number(2));
        assert!(matches!(failure.error, CreateError::TimedOut { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn duplicates_surface_as_failures() {
        let sink = MemorySink::with_items([Record::with_empty_payload(1)]);
        let items = records(3);

        let report = executor(5, 2).run(&items, &sink, &SilentObserver).await;

        let [failure] = report.failures.as_slice() else {
            panic!("expected exactly one failure, got {:?}", report.failures);
        };
        assert!(failure.error.is_duplicate());
    }

    #[rstest]
    #[tokio::test]
    async fn observer_sees_batch_boundaries(sink: MemorySink<Record>) {
        let items = records(5);
        sink.fail_on([RecordId::Number(3)]);
        let observer = RecordingObserver::default();

        let _report = executor(2, 2).run(&items, &sink, &observer).await;

        let events = observer.events();
        let boundaries: Vec<_> = events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    RecordedEvent::BatchStarted { .. } | RecordedEvent::BatchCompleted { .. }
                )
            })
            .cloned()
            .collect();
        assert_eq!(
            boundaries,
            vec![
                RecordedEvent::BatchStarted { batch: 1, size: 2 },
                RecordedEvent::BatchCompleted { batch: 1, failures: 0 },
                RecordedEvent::BatchStarted { batch: 2, size: 2 },
                RecordedEvent::BatchCompleted { batch: 2, failures: 1 },
                RecordedEvent::BatchStarted { batch: 3, size: 1 },
                RecordedEvent::BatchCompleted { batch: 3, failures: 0 },
            ]
        );
        assert!(events.contains(&RecordedEvent::Failed(RecordId::Number(3))));
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, RecordedEvent::Succeeded(_)))
                .count(),
            4
        );
    }

    #[rstest]
    #[tokio::test]
    async fn unbatched_runs_everything_in_one_batch(sink: MemorySink<Record>) {
        let items = records(250);
        let config = ExecutorConfig::default().to_unbatched();
        let observer = RecordingObserver::default();

        let report = BatchExecutor::new(config).run(&items, &sink, &observer).await;

        assert_eq!(report.succeeded, 250);
        let starts = observer
            .events()
            .iter()
            .filter(|event| matches!(event, RecordedEvent::BatchStarted { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn partitions_items_into_successes_and_failures(
            count in 0_i64..40,
            batch_size in 1_usize..8,
            concurrency in 1_usize..6,
            failing in proptest::collection::hash_set(0_i64..40, 0..10),
        ) {
            let items = records(count);
            let sink: MemorySink<Record> = MemorySink::new();
            sink.fail_on(failing.iter().copied().map(RecordId::Number));

            let report = block_on_for_tests(
                executor(batch_size, concurrency).run(&items, &sink, &SilentObserver),
            );

            let expected_failures = failing.iter().filter(|id| **id < count).count();
            prop_assert_eq!(report.attempted, items.len());
            prop_assert_eq!(report.failed(), expected_failures);
            prop_assert_eq!(report.succeeded + report.failed(), items.len());
            prop_assert!(sink.peak_in_flight() <= concurrency);
            assert_batches_sequential(&sink.journal(), &items, batch_size);
        }
    }
}

mod behaviour;
