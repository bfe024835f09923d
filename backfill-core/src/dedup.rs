//! Filtering candidates against identities that are already stored.

use std::{collections::HashSet, hash::BuildHasher};

use crate::Identified;

/// Return the candidates whose identity is absent from `existing`.
///
/// Relative order is preserved. When the candidate set repeats an identity,
/// only its first occurrence is kept, so the result never holds two items
/// with the same identity. Neither input is modified.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use backfill_core::{Record, RecordId, dedup};
///
/// let candidates = vec![
///     Record::with_empty_payload(1),
///     Record::with_empty_payload(2),
///     Record::with_empty_payload(3),
/// ];
/// let existing = HashSet::from([RecordId::Number(2)]);
///
/// let fresh = dedup(&candidates, &existing);
/// let ids: Vec<_> = fresh.iter().map(|record| record.id.clone()).collect();
/// assert_eq!(ids, vec![RecordId::Number(1), RecordId::Number(3)]);
/// ```
#[must_use]
pub fn dedup<T, S>(candidates: &[T], existing: &HashSet<T::Id, S>) -> Vec<T>
where
    T: Identified + Clone,
    S: BuildHasher,
{
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut fresh = Vec::new();
    for candidate in candidates {
        let id = candidate.id();
        if !existing.contains(id) && seen.insert(id) {
            fresh.push(candidate.clone());
        }
    }
    fresh
}
