//! Property-based tests for header and cache invariants.
//!
//! Uses proptest to verify invariants across random inputs:
//! - `HeaderMap::set` leaves exactly one entry and keeps its position
//! - Header lookup is case-insensitive
//! - The local cache keeps the first reference for a key
//! - Target path derivation always inserts the marker before the suffix

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use std::path::Path;
use warcdedup::HeaderMap;
use warcdedup::services::derive_target_path;
use warcdedup::services::deduplication::{DuplicateKey, DuplicateReference, LocalDuplicateCache};

fn header_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9-]{0,15}"
}

fn header_value() -> impl Strategy<Value = String> {
    "[ -~]{0,30}".prop_map(|s| s.trim().to_string())
}

// ============================================================================
// HeaderMap
// ============================================================================

proptest! {
    /// Property: after `set`, the name occurs once and holds the new value.
    #[test]
    fn prop_set_leaves_single_entry(
        entries in prop::collection::vec((header_name(), header_value()), 0..12),
        name in header_name(),
        value in header_value(),
    ) {
        let mut headers = HeaderMap::new();
        for (k, v) in &entries {
            headers.append(k.clone(), v.clone());
        }
        headers.set(name.clone(), value.clone());

        let matching = headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(&name))
            .count();
        prop_assert_eq!(matching, 1);
        prop_assert_eq!(headers.get(&name), Some(value.as_str()));
    }

    /// Property: `set` on an existing name keeps its first position.
    #[test]
    fn prop_set_keeps_position(
        before in prop::collection::vec(("[a-z]{1,6}", header_value()), 0..6),
        after in prop::collection::vec(("[a-z]{1,6}", header_value()), 0..6),
        value in header_value(),
    ) {
        let mut headers = HeaderMap::new();
        for (k, v) in &before {
            headers.append(format!("x-before-{k}"), v.clone());
        }
        headers.append("WARC-Type", "response");
        for (k, v) in &after {
            headers.append(format!("x-after-{k}"), v.clone());
        }

        let position = headers.iter().position(|(k, _)| k == "WARC-Type");
        headers.set("warc-type", value);
        prop_assert_eq!(headers.iter().position(|(k, _)| k == "WARC-Type"), position);
        prop_assert_eq!(headers.len(), before.len() + after.len() + 1);
    }

    /// Property: lookup ignores ASCII case.
    #[test]
    fn prop_lookup_case_insensitive(name in header_name(), value in header_value()) {
        let mut headers = HeaderMap::new();
        headers.set(name.clone(), value.clone());
        prop_assert_eq!(headers.get(&name.to_ascii_uppercase()), Some(value.as_str()));
        prop_assert_eq!(headers.get(&name.to_ascii_lowercase()), Some(value.as_str()));
    }

    /// Property: `remove` deletes every occurrence.
    #[test]
    fn prop_remove_deletes_all(count in 1usize..5, name in header_name()) {
        let mut headers = HeaderMap::new();
        for i in 0..count {
            headers.append(name.clone(), i.to_string());
        }
        prop_assert!(headers.remove(&name));
        prop_assert!(!headers.contains(&name));
        prop_assert!(headers.is_empty());
    }
}

// ============================================================================
// Local cache
// ============================================================================

proptest! {
    /// Property: the first reference inserted for a key is never replaced.
    #[test]
    fn prop_cache_first_write_wins(
        digest in "sha1:[A-Z2-7]{8}",
        uri in "http://[a-z]{1,10}\\.com/[a-z]{0,8}",
        ids in prop::collection::vec("[a-f0-9]{8}", 1..8),
    ) {
        let mut cache = LocalDuplicateCache::new();
        let key = DuplicateKey::new(digest, uri.clone());
        for id in &ids {
            cache.insert(
                key.clone(),
                DuplicateReference::local(Some(id.clone()), String::new(), uri.clone()),
            );
        }

        prop_assert_eq!(cache.len(), 1);
        let first = cache.lookup(&key).unwrap();
        prop_assert_eq!(first.record_id.as_deref(), Some(ids[0].as_str()));
    }

    /// Property: equal digests at different URIs never collide.
    #[test]
    fn prop_cache_separates_addresses(
        digest in "sha1:[A-Z2-7]{8}",
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
    ) {
        prop_assume!(a != b);
        let uri_a = format!("http://example.com/{a}");
        let uri_b = format!("http://example.com/{b}");

        let mut cache = LocalDuplicateCache::new();
        cache.insert(
            DuplicateKey::new(digest.clone(), uri_a.clone()),
            DuplicateReference::local(None, String::new(), uri_a),
        );
        prop_assert!(cache.lookup(&DuplicateKey::new(digest, uri_b)).is_none());
    }
}

// ============================================================================
// Target path
// ============================================================================

proptest! {
    /// Property: derived names keep the stem and suffix around the marker.
    #[test]
    fn prop_target_path_marker(stem in "[a-zA-Z0-9_-]{1,20}", gz in any::<bool>()) {
        let suffix = if gz { ".warc.gz" } else { ".warc" };
        let source = format!("{stem}{suffix}");
        let target = derive_target_path(Path::new(&source)).unwrap();
        prop_assert_eq!(
            target.to_str().unwrap().to_string(),
            format!("{stem}.deduplicated{suffix}")
        );
    }
}
