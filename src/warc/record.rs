//! WARC record model.

use super::headers::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Well-known WARC header names.
pub mod names {
    /// `WARC-Type`.
    pub const TYPE: &str = "WARC-Type";
    /// `WARC-Record-ID`.
    pub const RECORD_ID: &str = "WARC-Record-ID";
    /// `WARC-Date`.
    pub const DATE: &str = "WARC-Date";
    /// `WARC-Target-URI`.
    pub const TARGET_URI: &str = "WARC-Target-URI";
    /// `WARC-Payload-Digest`.
    pub const PAYLOAD_DIGEST: &str = "WARC-Payload-Digest";
    /// `WARC-Block-Digest`.
    pub const BLOCK_DIGEST: &str = "WARC-Block-Digest";
    /// `WARC-Filename`.
    pub const FILENAME: &str = "WARC-Filename";
    /// `WARC-Warcinfo-ID`.
    pub const WARCINFO_ID: &str = "WARC-Warcinfo-ID";
    /// `WARC-Refers-To`.
    pub const REFERS_TO: &str = "WARC-Refers-To";
    /// `WARC-Refers-To-Date`.
    pub const REFERS_TO_DATE: &str = "WARC-Refers-To-Date";
    /// `WARC-Refers-To-Target-URI`.
    pub const REFERS_TO_TARGET_URI: &str = "WARC-Refers-To-Target-URI";
    /// `WARC-Truncated`.
    pub const TRUNCATED: &str = "WARC-Truncated";
    /// `WARC-Profile`.
    pub const PROFILE: &str = "WARC-Profile";
    /// `Content-Type`.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// `Content-Length`.
    pub const CONTENT_LENGTH: &str = "Content-Length";
}

/// Default version line for records this crate creates.
pub const WARC_VERSION: &str = "WARC/1.0";

/// Role of a record, derived from its `WARC-Type` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `warcinfo`: run-level metadata.
    Warcinfo,
    /// `response`: a captured HTTP response.
    Response,
    /// `revisit`: a reference to an earlier capture.
    Revisit,
    /// Any other type (`request`, `metadata`, `resource`, ...), passed through.
    Other(String),
}

impl RecordKind {
    /// Parses a `WARC-Type` value. Matching is case-insensitive.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "warcinfo" => Self::Warcinfo,
            "response" => Self::Response,
            "revisit" => Self::Revisit,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the `WARC-Type` spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Warcinfo => "warcinfo",
            Self::Response => "response",
            Self::Revisit => "revisit",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single WARC record: version line, header block, and content block.
///
/// The block is kept as raw bytes. The engine never decodes payloads; it
/// only slices off the HTTP header section when building revisits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    /// Version line without the trailing CRLF, e.g. `WARC/1.0`.
    pub version: String,
    /// Named fields of the record header.
    pub headers: HeaderMap,
    /// Content block exactly as it appears after the header.
    pub block: Vec<u8>,
}

impl WarcRecord {
    /// Creates a record from parts.
    #[must_use]
    pub fn new(version: impl Into<String>, headers: HeaderMap, block: Vec<u8>) -> Self {
        Self {
            version: version.into(),
            headers,
            block,
        }
    }

    /// Creates a fresh record of `kind` with a new record ID and current date.
    ///
    /// `extra` headers are applied after the generated ones, so they may
    /// override them.
    #[must_use]
    pub fn create(
        kind: &RecordKind,
        target_uri: Option<&str>,
        extra: HeaderMap,
        block: Vec<u8>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.set(names::TYPE, kind.as_str());
        headers.set(names::RECORD_ID, new_record_id());
        headers.set(names::DATE, format_warc_date(&Utc::now()));
        if let Some(uri) = target_uri {
            headers.set(names::TARGET_URI, uri);
        }
        for (key, value) in extra.iter() {
            headers.set(key, value);
        }
        Self::new(WARC_VERSION, headers, block)
    }

    /// Role of this record. Missing `WARC-Type` counts as `Other("")`.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.headers
            .get(names::TYPE)
            .map_or_else(|| RecordKind::Other(String::new()), RecordKind::parse)
    }

    /// `WARC-Target-URI`, if present.
    #[must_use]
    pub fn target_uri(&self) -> Option<&str> {
        self.headers.get(names::TARGET_URI)
    }

    /// `WARC-Payload-Digest`, if present.
    #[must_use]
    pub fn payload_digest(&self) -> Option<&str> {
        self.headers.get(names::PAYLOAD_DIGEST)
    }

    /// `WARC-Date`, if present.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get(names::DATE)
    }

    /// `WARC-Record-ID`, if present.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.headers.get(names::RECORD_ID)
    }

    /// Returns `true` when the block is an HTTP message.
    #[must_use]
    pub fn is_http(&self) -> bool {
        self.headers
            .get(names::CONTENT_TYPE)
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("application/http"))
    }

    /// HTTP status line and headers, including the terminating blank line.
    ///
    /// Returns `None` for non-HTTP blocks. A block with no blank line has no
    /// parseable head, so the result is empty rather than the whole block.
    #[must_use]
    pub fn http_head(&self) -> Option<&[u8]> {
        if !self.is_http() {
            return None;
        }
        let end = find_subsequence(&self.block, b"\r\n\r\n")
            .map(|pos| pos + 4)
            .or_else(|| find_subsequence(&self.block, b"\n\n").map(|pos| pos + 2))
            .unwrap_or(0);
        Some(&self.block[..end])
    }
}

/// Generates a `<urn:uuid:...>` record identifier.
#[must_use]
pub fn new_record_id() -> String {
    format!("<urn:uuid:{}>", uuid::Uuid::new_v4())
}

/// Formats a timestamp the way `WARC-Date` expects (second precision, `Z`).
#[must_use]
pub fn format_warc_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
