//! Business logic services.
//!
//! The deduplication engine and the file-level plumbing around it.

pub mod deduplication;
mod target_path;

pub use deduplication::{DeduplicationEngine, RunStats};
pub use target_path::{DEDUPLICATED_MARKER, derive_target_path, ensure_target_absent, wants_gzip};
