//! Single-pass WARC deduplication.
//!
//! Each `response` record is checked in two tiers:
//! 1. **Local cache**: earlier captures in the same file, keyed by
//!    `(payload digest, target URI)`
//! 2. **CDX index**: prior captures known to the external index, strictly
//!    older than the record and never themselves revisits
//!
//! A hit in either tier turns the record into a `revisit`. Anything else is
//! kept byte-for-byte and registered in the local cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    DeduplicationEngine                       │
//! │  ┌────────────────────┐  ┌────────────┐  ┌────────────────┐  │
//! │  │ DuplicateResolver  │  │ Revisit    │  │ RunLog         │  │
//! │  │  ├ LocalCache      │─▶│ builder    │  │ (trailing      │  │
//! │  │  └ IndexClient     │  │            │  │  resource)     │  │
//! │  └────────────────────┘  └────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use warcdedup::services::deduplication::DeduplicationEngine;
//!
//! let engine = DeduplicationEngine::from_config(&config)?;
//! let stats = engine.deduplicate_file(Path::new("crawl.warc.gz"), None)?;
//! println!("{} revisits written", stats.revisits());
//! ```

mod cache;
mod engine;
mod resolver;
mod revisit;
mod run_log;
mod types;

pub use cache::LocalDuplicateCache;
pub use engine::DeduplicationEngine;
pub use resolver::{DuplicateResolver, parse_warc_date};
pub use revisit::{PROFILE_IDENTICAL_PAYLOAD_1_0, PROFILE_IDENTICAL_PAYLOAD_1_1, build_revisit};
pub use run_log::{LOG_RECORD_URI, RunLog};
pub use types::{
    DuplicateKey, DuplicateReference, IndeterminateReason, ReferenceSource, Resolution, RunStats,
};
