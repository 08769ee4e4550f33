//! # warcdedup
//!
//! Single-pass deduplication of WARC web-archive files.
//!
//! Every `response` record whose payload is a byte-identical duplicate of an
//! earlier capture is rewritten as a `revisit` record pointing at the original.
//! Originals are found either earlier in the same file or in a remote CDX
//! index of archived captures.
//!
//! ## Features
//!
//! - Streaming, one record in memory at a time
//! - Local duplicate cache keyed by `(payload digest, target URI)`
//! - CDX index lookups with bounded retry and exponential backoff
//! - Audit trail appended to the output as a trailing `resource` record
//! - Transparent gzip input, per-record gzip members on output
//!
//! ## Example
//!
//! ```rust,ignore
//! use warcdedup::config::DedupConfig;
//! use warcdedup::services::deduplication::DeduplicationEngine;
//!
//! let config = DedupConfig::load_default()?.with_env_overrides()?;
//! let engine = DeduplicationEngine::from_config(&config)?;
//! let stats = engine.deduplicate_file("crawl.warc.gz".as_ref(), None)?;
//! println!("{} revisits written", stats.revisits());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod index;
pub mod observability;
pub mod services;
pub mod warc;

// Re-exports for convenience
pub use config::DedupConfig;
pub use index::{IndexClient, IndexResponse, RetryPolicy};
pub use services::deduplication::{
    DeduplicationEngine, DuplicateKey, DuplicateReference, Resolution, RunStats,
};
pub use warc::{HeaderMap, RecordKind, WarcReader, WarcRecord, WarcWriter};

/// Error type for warcdedup operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | No source path, unrecognized archive suffix, bad config values |
/// | `TargetExists` | The destination archive is already on disk |
/// | `Archive` | The source is not a well-formed WARC stream |
/// | `Io` | Reading the source or writing the destination fails |
/// | `OperationFailed` | Config parsing, HTTP client construction, logging setup |
///
/// Index lookups never surface here: every per-record failure degrades to
/// "keep the capture" and is recorded in the run log instead.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The destination archive already exists.
    ///
    /// Checked once before the source is opened; never re-checked mid-run.
    #[error("file {path} already exists")]
    TargetExists {
        /// The destination path that was found on disk.
        path: String,
    },

    /// The input could not be parsed as a WARC record stream.
    #[error("malformed archive: {cause}")]
    Archive {
        /// Description of the framing problem.
        cause: String,
    },

    /// An I/O operation failed.
    #[error("i/o during '{operation}' failed: {cause}")]
    Io {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Wraps an [`std::io::Error`] with the name of the operation that hit it.
    pub fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            cause: err.to_string(),
        }
    }

    /// Builds an [`Error::Archive`] from any displayable cause.
    pub fn archive(cause: impl Into<String>) -> Self {
        Self::Archive {
            cause: cause.into(),
        }
    }
}

/// Result type alias for warcdedup operations.
pub type Result<T> = std::result::Result<T, Error>;
