use std::collections::HashMap;

/// Facet counting over an already-visibility-scoped record set.
///
/// Hard invariant: the input to `count_by_group` must be the requester's
/// visible set, produced by `VisibilityPolicy::filter_visible`. Counts
/// computed from anything wider would leak the existence or magnitude of
/// records the requester cannot see. The handlers uphold this by running
/// the policy filter first in every pipeline; nothing here re-checks it.
///
/// Counts are recomputed on every request. They are requester-dependent, so
/// caching them would need requester-scoped keys and perfect invalidation;
/// the faceted responses instead carry the computation timestamp.

/// Groups `records` by the values `key_fn` yields and counts one increment
/// per record per value. A record yielding no values contributes to no
/// group, and a many-to-many key (e.g. keywords) contributes once to each
/// of its groups.
pub fn count_by_group<T, F>(records: &[T], key_fn: F) -> HashMap<String, i64>
where
    F: Fn(&T) -> Vec<String>,
{
    let mut counts: HashMap<String, i64> = HashMap::new();
    for record in records {
        for key in key_fn(record) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

/// Looks up one facet item's count by its own identity, defaulting to 0.
/// A zero-count group is a normal answer, never an error.
pub fn count_for(counts: &HashMap<String, i64>, key: &str) -> i64 {
    counts.get(key).copied().unwrap_or(0)
}
