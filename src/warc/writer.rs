//! WARC serializer.

use super::record::{WarcRecord, names};
use crate::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

/// Writes records to a byte sink in call order.
///
/// `Content-Length` is always recomputed from the block, so callers may
/// remove it (as the revisit builder does) without producing a broken
/// frame. With compression enabled each record becomes its own gzip
/// member, which keeps the output seekable by offset.
pub struct WarcWriter<W: Write> {
    inner: W,
    gzip: bool,
    records_written: u64,
}

impl<W: Write> WarcWriter<W> {
    /// Creates a writer. `gzip` selects per-record gzip members.
    pub const fn new(inner: W, gzip: bool) -> Self {
        Self {
            inner,
            gzip,
            records_written: 0,
        }
    }

    /// Serializes one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the bytes.
    pub fn write_record(&mut self, record: &WarcRecord) -> Result<()> {
        let bytes = serialize(record);
        if self.gzip {
            let mut encoder =
                GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
            encoder
                .write_all(&bytes)
                .map_err(|e| Error::io("compress_record", &e))?;
            let member = encoder
                .finish()
                .map_err(|e| Error::io("compress_record", &e))?;
            self.inner
                .write_all(&member)
                .map_err(|e| Error::io("write_record", &e))?;
        } else {
            self.inner
                .write_all(&bytes)
                .map_err(|e| Error::io("write_record", &e))?;
        }
        self.records_written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub const fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flushes and returns the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.inner
            .flush()
            .map_err(|e| Error::io("flush_archive", &e))?;
        Ok(self.inner)
    }
}

/// Serializes a record to its uncompressed wire form.
#[must_use]
pub fn serialize(record: &WarcRecord) -> Vec<u8> {
    let mut headers = record.headers.clone();
    headers.set(names::CONTENT_LENGTH, record.block.len().to_string());

    let head = format!("{}\r\n{headers}\r\n", record.version);
    let mut out = Vec::with_capacity(head.len() + record.block.len() + 4);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(&record.block);
    out.extend_from_slice(b"\r\n\r\n");
    out
}
