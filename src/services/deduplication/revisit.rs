//! Rewrites a duplicate `response` into a `revisit` record.

use super::types::DuplicateReference;
use crate::warc::{RecordKind, WarcRecord, names};

/// Revisit profile for WARC/1.0 files.
pub const PROFILE_IDENTICAL_PAYLOAD_1_0: &str =
    "http://netpreserve.org/warc/1.0/revisit/identical-payload-digest";
/// Revisit profile for WARC/1.1 files.
pub const PROFILE_IDENTICAL_PAYLOAD_1_1: &str =
    "http://netpreserve.org/warc/1.1/revisit/identical-payload-digest";

/// Builds the revisit record that replaces `record`.
///
/// Headers are rewritten in place and in this order: `WARC-Refers-To`
/// (only when the original's record ID is known), `WARC-Refers-To-Date`,
/// `WARC-Refers-To-Target-URI`, `WARC-Type`, `WARC-Truncated`,
/// `WARC-Profile`; then `WARC-Block-Digest` and `Content-Length` are
/// dropped since the block no longer matches them. The block keeps only
/// the HTTP status line and headers of the original response.
#[must_use]
pub fn build_revisit(mut record: WarcRecord, reference: &DuplicateReference) -> WarcRecord {
    let headers = &mut record.headers;
    if let Some(ref record_id) = reference.record_id {
        headers.set(names::REFERS_TO, record_id.as_str());
    }
    headers.set(names::REFERS_TO_DATE, reference.date.as_str());
    headers.set(names::REFERS_TO_TARGET_URI, reference.target_uri.as_str());
    headers.set(names::TYPE, RecordKind::Revisit.as_str());
    headers.set(names::TRUNCATED, "length");
    headers.set(names::PROFILE, profile_for(&record.version));
    headers.remove(names::BLOCK_DIGEST);
    headers.remove(names::CONTENT_LENGTH);

    record.block = record.http_head().map(<[u8]>::to_vec).unwrap_or_default();
    record
}

fn profile_for(version: &str) -> &'static str {
    if version.trim() == "WARC/1.1" {
        PROFILE_IDENTICAL_PAYLOAD_1_1
    } else {
        PROFILE_IDENTICAL_PAYLOAD_1_0
    }
}
