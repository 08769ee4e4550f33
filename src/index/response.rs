//! Interpretation of CDX index responses.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// A CDX line: 14-digit timestamp, whitespace, URI with a scheme.
static CDX_LINE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(\d{14})\s+([A-Za-z][A-Za-z0-9+.\-]*:\S*)").ok());

/// Body marker for robots.txt exclusion.
pub const ROBOTS_MARKER: &str = "RobotAccessControlException";
/// Body marker for administrative exclusion.
pub const ADMIN_MARKER: &str = "AdministrativeAccessControlException";
/// Body markers for an oversized query line.
pub const TOO_LONG_MARKERS: [&str; 3] = ["URI Too Long", "UriTooLong", "Request-URI Too Large"];
/// HTTP status for an oversized query line.
pub const STATUS_URI_TOO_LONG: u16 = 414;

/// CDX timestamp format.
pub const CDX_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Raw result of an index query after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResponse {
    /// Whether the final attempt landed in the accepted status set.
    pub success: bool,
    /// Final HTTP status, if any response was received.
    pub status: Option<u16>,
    /// Body text of the final response (empty if none was received).
    pub text: String,
    /// URL of the final response, or the request URL if none arrived.
    pub final_url: String,
    /// Attempts made.
    pub attempts: u32,
}

impl IndexResponse {
    /// A response that never arrived.
    #[must_use]
    pub fn no_response(url: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            status: None,
            text: String::new(),
            final_url: url.into(),
            attempts,
        }
    }

    /// Interprets the response into a lookup outcome.
    ///
    /// Exclusion markers are checked before the success flag so a policy
    /// refusal is never reported as a generic bad response.
    #[must_use]
    pub fn interpret(&self) -> IndexOutcome {
        if self.text.contains(ROBOTS_MARKER) {
            return IndexOutcome::Failed(IndexFailure::RobotsBlocked);
        }
        if self.text.contains(ADMIN_MARKER) {
            return IndexOutcome::Failed(IndexFailure::AdministrativelyExcluded);
        }
        if self.status == Some(STATUS_URI_TOO_LONG)
            || TOO_LONG_MARKERS.iter().any(|m| self.text.contains(m))
        {
            return IndexOutcome::Failed(IndexFailure::QueryTooLong);
        }
        if !self.success {
            return IndexOutcome::Failed(IndexFailure::BadResponse {
                status: self.status,
            });
        }

        let text = self.text.trim();
        if text.is_empty() {
            return IndexOutcome::NoMatch;
        }

        text.lines()
            .find_map(parse_cdx_line)
            .map_or(IndexOutcome::Failed(IndexFailure::InvalidResponse), |hit| {
                IndexOutcome::Match(hit)
            })
    }
}

/// A capture found in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHit {
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Original URI as recorded by the index.
    pub original: String,
}

/// Interpreted index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// First matching capture, in service order.
    Match(IndexHit),
    /// Successful response with no entries.
    NoMatch,
    /// Lookup could not be completed.
    Failed(IndexFailure),
}

/// Why an index lookup was inconclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFailure {
    /// The site's robots.txt denies access.
    RobotsBlocked,
    /// The URI is administratively excluded from the index.
    AdministrativelyExcluded,
    /// The query URL exceeded the service's limit.
    QueryTooLong,
    /// Non-success response after retries.
    BadResponse {
        /// Final status, if any response arrived.
        status: Option<u16>,
    },
    /// Body had text but no parseable CDX line.
    InvalidResponse,
}

impl IndexFailure {
    /// Metric label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RobotsBlocked => "robots_blocked",
            Self::AdministrativelyExcluded => "administratively_excluded",
            Self::QueryTooLong => "query_too_long",
            Self::BadResponse { .. } => "bad_response",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for IndexFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RobotsBlocked => f.write_str("blocked by robots.txt"),
            Self::AdministrativelyExcluded => f.write_str("administratively excluded"),
            Self::QueryTooLong => f.write_str("query URL too long"),
            Self::BadResponse { status: Some(s) } => write!(f, "bad response (status {s})"),
            Self::BadResponse { status: None } => f.write_str("bad response (no response)"),
            Self::InvalidResponse => f.write_str("invalid response"),
        }
    }
}

/// Parses one CDX line into a hit.
#[must_use]
pub fn parse_cdx_line(line: &str) -> Option<IndexHit> {
    let regex = CDX_LINE.as_ref()?;
    let captures = regex.captures(line.trim())?;
    let timestamp = NaiveDateTime::parse_from_str(&captures[1], CDX_TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    Some(IndexHit {
        timestamp,
        original: captures[2].to_string(),
    })
}
