//! Deduplication key, reference, and resolution types.

use crate::index::IndexFailure;
use crate::warc::WarcRecord;
use std::fmt;

/// Identifies equivalent content at a location: `(payload digest, target URI)`.
///
/// The same digest at a different URI is a different key; the local cache
/// never merges across addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    /// Algorithm-tagged payload digest, e.g. `sha1:ABC...`.
    pub digest: String,
    /// Normalized target URI.
    pub target_uri: String,
}

impl DuplicateKey {
    /// Creates a key.
    #[must_use]
    pub fn new(digest: impl Into<String>, target_uri: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            target_uri: target_uri.into(),
        }
    }

    /// Derives the key from a record's headers.
    ///
    /// Returns the name of the first missing header on failure.
    pub fn from_record(record: &WarcRecord) -> Result<Self, &'static str> {
        let digest = record
            .payload_digest()
            .ok_or(crate::warc::names::PAYLOAD_DIGEST)?;
        let target_uri = record
            .target_uri()
            .ok_or(crate::warc::names::TARGET_URI)?;
        Ok(Self::new(digest, target_uri))
    }
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.digest, self.target_uri)
    }
}

/// Where a duplicate's original was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    /// Earlier in the same input file.
    Local,
    /// In the external CDX index.
    External,
}

impl ReferenceSource {
    /// Metric label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
        }
    }
}

/// What a revisit points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateReference {
    /// `WARC-Record-ID` of the original; only known for local originals.
    pub record_id: Option<String>,
    /// `WARC-Date` of the original.
    pub date: String,
    /// Target URI of the original.
    pub target_uri: String,
    /// Where the original was found.
    pub source: ReferenceSource,
}

impl DuplicateReference {
    /// Reference to a record seen earlier in this run.
    #[must_use]
    pub fn local(record_id: Option<String>, date: String, target_uri: String) -> Self {
        Self {
            record_id,
            date,
            target_uri,
            source: ReferenceSource::Local,
        }
    }

    /// Reference to a capture known to the index.
    #[must_use]
    pub const fn external(date: String, target_uri: String) -> Self {
        Self {
            record_id: None,
            date,
            target_uri,
            source: ReferenceSource::External,
        }
    }
}

/// Why a capture could not be checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndeterminateReason {
    /// The external lookup was inconclusive.
    Lookup(IndexFailure),
    /// A header needed to build the key or query is absent.
    MissingHeader(&'static str),
    /// `WARC-Date` could not be parsed.
    InvalidDate(String),
}

impl IndeterminateReason {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Lookup(failure) => failure.label(),
            Self::MissingHeader(_) => "missing_header",
            Self::InvalidDate(_) => "invalid_date",
        }
    }
}

impl fmt::Display for IndeterminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup(failure) => write!(f, "{failure}"),
            Self::MissingHeader(name) => write!(f, "missing {name} header"),
            Self::InvalidDate(value) => write!(f, "unparseable WARC-Date {value:?}"),
        }
    }
}

/// Outcome of resolving one `response` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First occurrence as far as anyone knows.
    NotDuplicate,
    /// Identical payload already archived.
    Duplicate(DuplicateReference),
    /// Could not tell; keep the capture.
    Indeterminate(IndeterminateReason),
}

impl Resolution {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotDuplicate => "not_duplicate",
            Self::Duplicate(reference) => match reference.source {
                ReferenceSource::Local => "duplicate_local",
                ReferenceSource::External => "duplicate_external",
            },
            Self::Indeterminate(_) => "indeterminate",
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Input records processed.
    pub records: u64,
    /// `response` records among them.
    pub responses: u64,
    /// Responses rewritten against an earlier record in the file.
    pub revisits_local: u64,
    /// Responses rewritten against an index capture.
    pub revisits_external: u64,
    /// Responses kept because the check was inconclusive.
    pub indeterminate: u64,
    /// Responses added to the local cache.
    pub registered: u64,
}

impl RunStats {
    /// Total revisits written.
    #[must_use]
    pub const fn revisits(&self) -> u64 {
        self.revisits_local + self.revisits_external
    }
}
