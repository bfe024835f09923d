//! Behavioural coverage for the batch executor.

use crate::test_support::{MemorySink, RecordedEvent, RecordingObserver, block_on_for_tests};
use crate::{BatchExecutor, ExecutionReport, ExecutorConfig, Record, RecordId};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::{cell::RefCell, fs, path::PathBuf};

#[derive(Debug, Default)]
struct ExecutorWorld {
    items: RefCell<Vec<Record>>,
    config: RefCell<Option<ExecutorConfig>>,
    rejected: RefCell<Vec<RecordId>>,
    preloaded: RefCell<Vec<Record>>,
    sink: RefCell<Option<MemorySink<Record>>>,
    observer: RecordingObserver<RecordId>,
    report: RefCell<Option<ExecutionReport<Record>>>,
}

impl ExecutorWorld {
    fn with_report<R>(&self, check: impl FnOnce(&ExecutionReport<Record>) -> R) -> R {
        let borrowed = self.report.borrow();
        let report = borrowed
            .as_ref()
            .unwrap_or_else(|| panic!("executor must have run"));
        check(report)
    }

    fn with_sink<R>(&self, check: impl FnOnce(&MemorySink<Record>) -> R) -> R {
        let borrowed = self.sink.borrow();
        let sink = borrowed
            .as_ref()
            .unwrap_or_else(|| panic!("sink must be prepared"));
        check(sink)
    }
}

#[fixture]
fn world() -> ExecutorWorld {
    ExecutorWorld::default()
}

#[given("a sequence of {count} records")]
fn sequence_of_records(#[from(world)] world: &ExecutorWorld, count: i64) {
    *world.items.borrow_mut() = (1..=count).map(Record::with_empty_payload).collect();
}

#[given("a batch size of {batch_size} with concurrency {concurrency}")]
fn batch_tuning(#[from(world)] world: &ExecutorWorld, batch_size: usize, concurrency: usize) {
    let config = match ExecutorConfig::new(batch_size, concurrency) {
        Ok(config) => config,
        Err(err) => panic!("invalid executor config: {err}"),
    };
    *world.config.borrow_mut() = Some(config);
}

#[given("the store rejects record {id}")]
fn store_rejects(#[from(world)] world: &ExecutorWorld, id: i64) {
    world.rejected.borrow_mut().push(RecordId::Number(id));
}

#[given("the store already holds record {id}")]
fn store_holds(#[from(world)] world: &ExecutorWorld, id: i64) {
    world
        .preloaded
        .borrow_mut()
        .push(Record::with_empty_payload(id));
}

fn run_executor(world: &ExecutorWorld) {
    let sink = MemorySink::with_items(world.preloaded.borrow().iter().cloned());
    sink.fail_on(world.rejected.borrow().iter().cloned());
    let config = world
        .config
        .borrow()
        .unwrap_or_else(|| panic!("executor config must be prepared"));
    let items = world.items.borrow();
    let report = block_on_for_tests(BatchExecutor::new(config).run(
        items.as_slice(),
        &sink,
        &world.observer,
    ));
    *world.report.borrow_mut() = Some(report);
    *world.sink.borrow_mut() = Some(sink);
}

#[when("the executor runs against an empty store")]
fn run_against_empty_store(#[from(world)] world: &ExecutorWorld) {
    assert!(world.preloaded.borrow().is_empty());
    run_executor(world);
}

#[when("the executor runs against the prepared store")]
fn run_against_prepared_store(#[from(world)] world: &ExecutorWorld) {
    run_executor(world);
}

#[then("the store holds {count} records")]
fn store_holds_count(#[from(world)] world: &ExecutorWorld, count: usize) {
    world.with_sink(|sink| assert_eq!(sink.stored().len(), count));
}

#[then("{count} batches were reported")]
fn batches_reported(#[from(world)] world: &ExecutorWorld, count: usize) {
    let completed = world
        .observer
        .events()
        .iter()
        .filter(|event| matches!(event, RecordedEvent::BatchCompleted { .. }))
        .count();
    assert_eq!(completed, count);
}

#[then("no failures were collected")]
fn no_failures(#[from(world)] world: &ExecutorWorld) {
    world.with_report(|report| assert!(report.failures.is_empty(), "{:?}", report.failures));
}

#[then("record {id} is reported as failed")]
fn record_failed(#[from(world)] world: &ExecutorWorld, id: i64) {
    world.with_report(|report| {
        let ids: Vec<&RecordId> = report.failures.iter().map(|f| &f.item.id).collect();
        assert_eq!(ids, vec![&RecordId::Number(id)]);
    });
}

#[then("record {id} is reported as a duplicate")]
fn record_duplicate(#[from(world)] world: &ExecutorWorld, id: i64) {
    world.with_report(|report| {
        let [failure] = report.failures.as_slice() else {
            panic!("expected exactly one failure, got {:?}", report.failures);
        };
        assert_eq!(failure.item.id, RecordId::Number(id));
        assert!(failure.error.is_duplicate(), "unexpected error: {}", failure.error);
    });
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/batch_executor.feature");
    let contents = match fs::read_to_string(&feature_path) {
        Ok(data) => data,
        Err(err) => panic!("failed to read feature file {feature_path:?}: {err}"),
    };
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "creating every item across batches",
            "collecting failures without stopping",
            "reporting stored identities as duplicates",
        ]
    );
}

macro_rules! register_scenario {
    ($name:ident, $index:literal) => {
        #[scenario(path = "tests/features/batch_executor.feature", index = $index)]
        fn $name(#[from(world)] world: ExecutorWorld) {
            let _ = world;
        }
    };
}

register_scenario!(creating_every_item_across_batches, 0);
register_scenario!(collecting_failures_without_stopping, 1);
register_scenario!(reporting_stored_identities_as_duplicates, 2);
