//! In-run cache of first-seen captures.

use super::types::{DuplicateKey, DuplicateReference};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Maps each [`DuplicateKey`] to the first non-duplicate capture seen with it.
///
/// Insert is first-write-wins and nothing is ever evicted, so a revisit
/// always points at the earliest occurrence in the file. Memory grows with
/// the number of distinct keys in one input, which is bounded by that
/// input's size.
///
/// # Example
///
/// ```rust
/// use warcdedup::services::deduplication::{DuplicateKey, DuplicateReference, LocalDuplicateCache};
///
/// let mut cache = LocalDuplicateCache::new();
/// let key = DuplicateKey::new("sha1:ABC", "http://example.com/");
/// let first = DuplicateReference::local(
///     Some("<urn:uuid:1>".to_string()),
///     "2020-01-01T00:00:00Z".to_string(),
///     "http://example.com/".to_string(),
/// );
///
/// assert!(cache.insert(key.clone(), first.clone()));
/// assert_eq!(cache.lookup(&key), Some(&first));
/// ```
#[derive(Debug, Default)]
pub struct LocalDuplicateCache {
    entries: HashMap<DuplicateKey, DuplicateReference>,
}

impl LocalDuplicateCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reference registered for `key`.
    #[must_use]
    pub fn lookup(&self, key: &DuplicateKey) -> Option<&DuplicateReference> {
        self.entries.get(key)
    }

    /// Registers `reference` under `key` unless the key is already present.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn insert(&mut self, key: DuplicateKey, reference: DuplicateReference) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(reference);
                #[allow(clippy::cast_precision_loss)] // Gauge precision is not critical
                metrics::gauge!("warcdedup_local_cache_size").set(self.entries.len() as f64);
                true
            },
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(id: &str, date: &str) -> DuplicateReference {
        DuplicateReference::local(
            Some(id.to_string()),
            date.to_string(),
            "http://example.com/".to_string(),
        )
    }

    #[test]
    fn test_first_write_wins() {
        let mut cache = LocalDuplicateCache::new();
        let key = DuplicateKey::new("sha1:A", "http://example.com/");

        assert!(cache.insert(key.clone(), reference("<urn:uuid:1>", "2020-01-01T00:00:00Z")));
        assert!(!cache.insert(key.clone(), reference("<urn:uuid:2>", "2020-01-02T00:00:00Z")));

        let hit = cache.lookup(&key).unwrap();
        assert_eq!(hit.record_id.as_deref(), Some("<urn:uuid:1>"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_same_digest_different_uri_misses() {
        let mut cache = LocalDuplicateCache::new();
        cache.insert(
            DuplicateKey::new("sha1:A", "http://example.com/"),
            reference("<urn:uuid:1>", "2020-01-01T00:00:00Z"),
        );

        assert!(cache
            .lookup(&DuplicateKey::new("sha1:A", "http://example.org/"))
            .is_none());
        assert!(cache
            .lookup(&DuplicateKey::new("sha1:B", "http://example.com/"))
            .is_none());
    }

    #[test]
    fn test_empty() {
        let cache = LocalDuplicateCache::new();
        assert!(cache.is_empty());
        assert!(cache
            .lookup(&DuplicateKey::new("sha1:A", "http://example.com/"))
            .is_none());
    }
}
