//! Duplicate resolution: local cache first, CDX index second.

use super::cache::LocalDuplicateCache;
use super::types::{DuplicateKey, DuplicateReference, IndeterminateReason, Resolution};
use crate::index::{IndexClient, IndexOutcome};
use crate::warc::{WarcRecord, format_warc_date, names};
use chrono::{DateTime, Utc};
use tracing::instrument;

/// Decides whether a `response` record duplicates an earlier capture.
///
/// # How it works
///
/// 1. Builds the `(digest, URI)` key; a hit in the local cache wins
/// 2. Otherwise asks the index for captures strictly before this one,
///    excluding revisits so chains always end at real content
/// 3. Maps the index outcome to a [`Resolution`]
///
/// With no index client configured, a cache miss is `NotDuplicate`.
pub struct DuplicateResolver {
    index: Option<IndexClient>,
}

impl DuplicateResolver {
    /// Creates a resolver. `None` disables external lookups.
    #[must_use]
    pub const fn new(index: Option<IndexClient>) -> Self {
        Self { index }
    }

    /// Returns `true` if external lookups are enabled.
    #[must_use]
    pub const fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Resolves `record` against `cache` and the index.
    #[instrument(
        skip(self, cache, record),
        fields(
            operation = "resolve_duplicate",
            target_uri = record.target_uri().unwrap_or_default(),
            outcome = tracing::field::Empty
        )
    )]
    pub fn resolve(&self, cache: &LocalDuplicateCache, record: &WarcRecord) -> Resolution {
        let resolution = self.resolve_inner(cache, record);
        tracing::Span::current().record("outcome", resolution.label());
        metrics::counter!(
            "warcdedup_resolutions_total",
            "outcome" => resolution.label()
        )
        .increment(1);
        resolution
    }

    fn resolve_inner(&self, cache: &LocalDuplicateCache, record: &WarcRecord) -> Resolution {
        let key = match DuplicateKey::from_record(record) {
            Ok(key) => key,
            Err(missing) => {
                return Resolution::Indeterminate(IndeterminateReason::MissingHeader(missing));
            },
        };

        if let Some(reference) = cache.lookup(&key) {
            tracing::debug!(key = %key, "Local duplicate found");
            return Resolution::Duplicate(reference.clone());
        }

        let Some(index) = self.index.as_ref() else {
            return Resolution::NotDuplicate;
        };

        let Some(raw_date) = record.date() else {
            return Resolution::Indeterminate(IndeterminateReason::MissingHeader(names::DATE));
        };
        let Some(captured_at) = parse_warc_date(raw_date) else {
            return Resolution::Indeterminate(IndeterminateReason::InvalidDate(
                raw_date.to_string(),
            ));
        };

        let response = index.query(&key.target_uri, &key.digest, captured_at);
        tracing::debug!(
            url = %response.final_url,
            attempts = response.attempts,
            success = response.success,
            "Index lookup finished"
        );

        match response.interpret() {
            IndexOutcome::Match(hit) => Resolution::Duplicate(DuplicateReference::external(
                format_warc_date(&hit.timestamp),
                hit.original,
            )),
            IndexOutcome::NoMatch => Resolution::NotDuplicate,
            IndexOutcome::Failed(failure) => {
                Resolution::Indeterminate(IndeterminateReason::Lookup(failure))
            },
        }
    }
}

/// Parses a `WARC-Date` (RFC 3339, any sub-second precision) to UTC.
#[must_use]
pub fn parse_warc_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexFailure, MockTransport, RetryPolicy, TransportResponse};
    use crate::warc::HeaderMap;
    use chrono::TimeZone;
    use std::time::Duration;

    fn response_record(digest: &str, uri: &str, date: &str) -> WarcRecord {
        let headers: HeaderMap = [
            (names::TYPE, "response"),
            (names::RECORD_ID, "<urn:uuid:rec>"),
            (names::DATE, date),
            (names::TARGET_URI, uri),
            (names::PAYLOAD_DIGEST, digest),
        ]
        .into_iter()
        .collect();
        WarcRecord::new("WARC/1.0", headers, Vec::new())
    }

    fn resolver_with(
        responses: Vec<Result<TransportResponse, crate::index::TransportError>>,
    ) -> DuplicateResolver {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let client = IndexClient::new(
            "http://index.test/cdx/search",
            policy,
            Box::new(MockTransport::new(responses)),
        )
        .unwrap();
        DuplicateResolver::new(Some(client))
    }

    #[test]
    fn test_cache_hit_skips_index() {
        let resolver = resolver_with(vec![]);
        let mut cache = LocalDuplicateCache::new();
        let reference = DuplicateReference::local(
            Some("<urn:uuid:first>".to_string()),
            "2020-01-01T00:00:00Z".to_string(),
            "http://example.com/".to_string(),
        );
        cache.insert(
            DuplicateKey::new("sha256:abc", "http://example.com/"),
            reference.clone(),
        );

        let record = response_record("sha256:abc", "http://example.com/", "2020-01-01T00:05:00Z");
        assert_eq!(resolver.resolve(&cache, &record), Resolution::Duplicate(reference));
    }

    #[test]
    fn test_external_match() {
        let resolver = resolver_with(vec![MockTransport::ok("20190101000000 http://example.com/")]);
        let record = response_record("sha1:X", "http://example.com/", "2020-01-01T00:00:00Z");

        let resolution = resolver.resolve(&LocalDuplicateCache::new(), &record);
        assert_eq!(
            resolution,
            Resolution::Duplicate(DuplicateReference::external(
                "2019-01-01T00:00:00Z".to_string(),
                "http://example.com/".to_string(),
            ))
        );
    }

    #[test]
    fn test_external_no_match() {
        let resolver = resolver_with(vec![MockTransport::ok("")]);
        let record = response_record("sha1:X", "http://example.com/", "2020-01-01T00:00:00Z");
        assert_eq!(
            resolver.resolve(&LocalDuplicateCache::new(), &record),
            Resolution::NotDuplicate
        );
    }

    #[test]
    fn test_robots_blocked_is_indeterminate() {
        let resolver = resolver_with(vec![Ok(TransportResponse {
            status: 403,
            body: "RobotAccessControlException".to_string(),
            final_url: String::new(),
        })]);
        let record = response_record("sha1:X", "http://example.com/", "2020-01-01T00:00:00Z");
        assert_eq!(
            resolver.resolve(&LocalDuplicateCache::new(), &record),
            Resolution::Indeterminate(IndeterminateReason::Lookup(IndexFailure::RobotsBlocked))
        );
    }

    #[test]
    fn test_missing_digest() {
        let resolver = DuplicateResolver::new(None);
        let mut record = response_record("sha1:X", "http://example.com/", "2020-01-01T00:00:00Z");
        record.headers.remove(names::PAYLOAD_DIGEST);
        assert_eq!(
            resolver.resolve(&LocalDuplicateCache::new(), &record),
            Resolution::Indeterminate(IndeterminateReason::MissingHeader(names::PAYLOAD_DIGEST))
        );
    }

    #[test]
    fn test_invalid_date() {
        let resolver = resolver_with(vec![]);
        let record = response_record("sha1:X", "http://example.com/", "yesterday");
        assert_eq!(
            resolver.resolve(&LocalDuplicateCache::new(), &record),
            Resolution::Indeterminate(IndeterminateReason::InvalidDate("yesterday".to_string()))
        );
    }

    #[test]
    fn test_no_index_means_not_duplicate() {
        let resolver = DuplicateResolver::new(None);
        assert!(!resolver.has_index());
        let record = response_record("sha1:X", "http://example.com/", "2020-01-01T00:00:00Z");
        assert_eq!(
            resolver.resolve(&LocalDuplicateCache::new(), &record),
            Resolution::NotDuplicate
        );
    }

    #[test]
    fn test_parse_warc_date() {
        assert_eq!(
            parse_warc_date("2020-01-01T00:05:00Z"),
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 5, 0).unwrap())
        );
        assert!(parse_warc_date("2020-01-01T00:05:00.123456Z").is_some());
        assert!(parse_warc_date("not a date").is_none());
    }
}
