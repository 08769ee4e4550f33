//! WARC container format.
//!
//! Just enough of ISO 28500 to stream records through the deduplicator
//! without altering bytes it does not mean to change:
//!
//! - [`HeaderMap`]: ordered, case-insensitive named fields
//! - [`WarcRecord`]: version line, headers, raw content block
//! - [`WarcReader`]: record iterator over plain or gzip input
//! - [`WarcWriter`]: serializer with optional per-record gzip members

mod headers;
mod reader;
mod record;
mod writer;

pub use headers::HeaderMap;
pub use reader::WarcReader;
pub use record::{
    RecordKind, WARC_VERSION, WarcRecord, format_warc_date, names, new_record_id,
};
pub use writer::{WarcWriter, serialize};
