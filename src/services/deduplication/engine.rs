//! Stream driver: one pass over the input, one output record per input record.

use super::cache::LocalDuplicateCache;
use super::resolver::DuplicateResolver;
use super::revisit::build_revisit;
use super::run_log::RunLog;
use super::types::{DuplicateKey, DuplicateReference, ReferenceSource, Resolution, RunStats};
use crate::config::DedupConfig;
use crate::index::IndexClient;
use crate::services::target_path::{derive_target_path, ensure_target_absent, wants_gzip};
use crate::warc::{RecordKind, WarcReader, WarcRecord, WarcWriter, names};
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::time::Instant;
use tracing::instrument;

/// Deduplicates one archive.
///
/// Owns the run state: the local cache, the run log, and the counters. An
/// engine is consumed by [`run`](Self::run), so state never leaks from one
/// input file into the next.
///
/// Records are handled strictly in input order:
///
/// - `warcinfo`: linked to the run log, `WARC-Filename` set to the destination
/// - `response`: resolved; duplicates become revisits, everything else is
///   registered in the cache and written unchanged
/// - anything else: written unchanged
///
/// Every record first has an angle-bracket-wrapped `WARC-Target-URI`
/// unwrapped. After the last record a `resource` record carrying the run
/// log is appended.
///
/// # Example
///
/// ```rust
/// use warcdedup::services::deduplication::DeduplicationEngine;
/// use warcdedup::warc::{WarcReader, WarcWriter};
///
/// let input = b"WARC/1.0\r\nWARC-Type: request\r\nContent-Length: 0\r\n\r\n\r\n\r\n";
/// let records = WarcReader::new(&input[..]).unwrap();
/// let mut writer = WarcWriter::new(Vec::new(), false);
///
/// let stats = DeduplicationEngine::new(None)
///     .run(records, &mut writer, "out.warc")
///     .unwrap();
///
/// assert_eq!(stats.records, 1);
/// assert_eq!(writer.records_written(), 2);
/// ```
pub struct DeduplicationEngine {
    resolver: DuplicateResolver,
    cache: LocalDuplicateCache,
    log: RunLog,
    stats: RunStats,
}

impl DeduplicationEngine {
    /// Creates an engine. `None` restricts deduplication to the input file.
    #[must_use]
    pub fn new(index: Option<IndexClient>) -> Self {
        Self {
            resolver: DuplicateResolver::new(index),
            cache: LocalDuplicateCache::new(),
            log: RunLog::new(),
            stats: RunStats::default(),
        }
    }

    /// Creates an engine from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the index endpoint is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &DedupConfig) -> Result<Self> {
        let index = if config.index.enabled {
            Some(IndexClient::http(
                &config.index.endpoint,
                config.index.retry.clone(),
            )?)
        } else {
            tracing::info!("Index lookups disabled, deduplicating within the file only");
            None
        };
        Ok(Self::new(index))
    }

    /// Deduplicates `source` into `target` (or the derived destination).
    ///
    /// The destination is checked before the source is opened. If the run
    /// fails after the destination was created, the partial file is removed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if no destination can be derived
    /// - [`Error::TargetExists`] if the destination is already on disk
    /// - [`Error::Archive`] if the source is not a valid WARC stream
    /// - [`Error::Io`] on read or write failures
    #[instrument(
        skip(self, source, target),
        fields(operation = "deduplicate_file", source = %source.display())
    )]
    pub fn deduplicate_file(self, source: &Path, target: Option<&Path>) -> Result<RunStats> {
        let target = match target {
            Some(path) => path.to_path_buf(),
            None => derive_target_path(source)?,
        };
        ensure_target_absent(&target)?;

        let input = File::open(source).map_err(|e| Error::io("open_source", &e))?;
        let records = WarcReader::new(BufReader::new(input))?;

        let output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    Error::TargetExists {
                        path: target.display().to_string(),
                    }
                } else {
                    Error::io("create_target", &e)
                }
            })?;

        let filename = target
            .file_name()
            .map_or_else(
                || target.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            );

        let start = Instant::now();
        let mut writer = WarcWriter::new(BufWriter::new(output), wants_gzip(&target));
        let result = self
            .run(records, &mut writer, &filename)
            .and_then(|stats| {
                writer
                    .finish()?
                    .flush()
                    .map_err(|e| Error::io("flush_target", &e))?;
                Ok(stats)
            });

        match result {
            Ok(stats) => {
                tracing::info!(
                    path = %target.display(),
                    records = stats.records,
                    revisits = stats.revisits(),
                    duration_ms = start.elapsed().as_millis(),
                    "Deduplication finished"
                );
                Ok(stats)
            },
            Err(e) => {
                tracing::error!(
                    path = %target.display(),
                    error = %e,
                    "Deduplication failed, removing partial output"
                );
                if let Err(remove_err) = std::fs::remove_file(&target) {
                    tracing::warn!(error = %remove_err, "Failed to remove partial output");
                }
                Err(e)
            },
        }
    }

    /// Runs the pass over `records`, writing to `writer`.
    ///
    /// `target_filename` is written into `warcinfo` records as
    /// `WARC-Filename`. The writer is not finished; the caller owns it.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error. Index failures never abort
    /// the run.
    pub fn run<I, W>(
        mut self,
        records: I,
        writer: &mut WarcWriter<W>,
        target_filename: &str,
    ) -> Result<RunStats>
    where
        I: IntoIterator<Item = Result<WarcRecord>>,
        W: Write,
    {
        self.log.log(format!(
            "Deduplicating into {target_filename} ({})",
            if self.resolver.has_index() {
                "local and index lookups"
            } else {
                "local lookups only"
            }
        ));

        for record in records {
            let output = self.process(record?, target_filename);
            writer.write_record(&output)?;
        }

        let stats = self.stats;
        self.log.log(format!(
            "Processed {} records: {} responses, {} local revisits, {} index revisits, \
             {} indeterminate.",
            stats.records,
            stats.responses,
            stats.revisits_local,
            stats.revisits_external,
            stats.indeterminate
        ));
        writer.write_record(&self.log.to_record())?;
        Ok(stats)
    }

    fn process(&mut self, mut record: WarcRecord, target_filename: &str) -> WarcRecord {
        self.stats.records += 1;
        unwrap_target_uri(&mut record);

        let kind = record.kind();
        metrics::counter!("warcdedup_records_total", "kind" => kind_label(&kind)).increment(1);

        match kind {
            RecordKind::Warcinfo => {
                if let Some(id) = record.record_id().map(str::to_string) {
                    self.log.set_warcinfo(id);
                }
                record.headers.set(names::FILENAME, target_filename);
                record
            },
            RecordKind::Response => self.process_response(record),
            RecordKind::Revisit | RecordKind::Other(_) => record,
        }
    }

    fn process_response(&mut self, record: WarcRecord) -> WarcRecord {
        self.stats.responses += 1;
        let uri = record.target_uri().unwrap_or("-").to_string();

        match self.resolver.resolve(&self.cache, &record) {
            Resolution::Duplicate(reference) => {
                match reference.source {
                    ReferenceSource::Local => self.stats.revisits_local += 1,
                    ReferenceSource::External => self.stats.revisits_external += 1,
                }
                self.log.log(format!(
                    "Duplicate of {uri} found ({} capture from {}), writing revisit record.",
                    reference.source.label(),
                    reference.date
                ));
                build_revisit(record, &reference)
            },
            Resolution::NotDuplicate => {
                self.log.log(format!("No duplicate found for {uri}."));
                self.register(&record);
                record
            },
            Resolution::Indeterminate(reason) => {
                self.stats.indeterminate += 1;
                self.log.log(format!(
                    "Could not check {uri} for duplicates: {reason}. Keeping the capture."
                ));
                self.register(&record);
                record
            },
        }
    }

    /// Adds `record` to the cache. Records without a key are skipped.
    fn register(&mut self, record: &WarcRecord) {
        let Ok(key) = DuplicateKey::from_record(record) else {
            return;
        };
        let Some(date) = record.date() else {
            self.log.log(format!("Not registering {key}: missing WARC-Date."));
            return;
        };
        let reference = DuplicateReference::local(
            record.record_id().map(str::to_string),
            date.to_string(),
            key.target_uri.clone(),
        );
        let message = format!("Registered {key}.");
        if self.cache.insert(key, reference) {
            self.stats.registered += 1;
            self.log.log(message);
        }
    }
}

/// Strips one layer of `<...>` from `WARC-Target-URI`.
fn unwrap_target_uri(record: &mut WarcRecord) {
    let unwrapped = record.target_uri().and_then(|uri| {
        uri.trim()
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .map(str::to_string)
    });
    if let Some(uri) = unwrapped {
        record.headers.set(names::TARGET_URI, uri);
    }
}

const fn kind_label(kind: &RecordKind) -> &'static str {
    match kind {
        RecordKind::Warcinfo => "warcinfo",
        RecordKind::Response => "response",
        RecordKind::Revisit => "revisit",
        RecordKind::Other(_) => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MockTransport, RetryPolicy};
    use crate::services::deduplication::{LOG_RECORD_URI, PROFILE_IDENTICAL_PAYLOAD_1_0};
    use crate::warc::HeaderMap;
    use std::time::Duration;

    fn response(id: &str, digest: &str, uri: &str, date: &str) -> WarcRecord {
        let headers: HeaderMap = [
            (names::TYPE, "response"),
            (names::RECORD_ID, id),
            (names::DATE, date),
            (names::TARGET_URI, uri),
            (names::CONTENT_TYPE, "application/http; msgtype=response"),
            (names::PAYLOAD_DIGEST, digest),
            (names::BLOCK_DIGEST, "sha1:BLOCK"),
        ]
        .into_iter()
        .collect();
        WarcRecord::new(
            "WARC/1.0",
            headers,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html></html>".to_vec(),
        )
    }

    fn warcinfo() -> WarcRecord {
        let headers: HeaderMap = [
            (names::TYPE, "warcinfo"),
            (names::RECORD_ID, "<urn:uuid:info>"),
            (names::FILENAME, "input.warc"),
        ]
        .into_iter()
        .collect();
        WarcRecord::new("WARC/1.0", headers, b"software: test".to_vec())
    }

    fn run(engine: DeduplicationEngine, input: Vec<WarcRecord>) -> (RunStats, Vec<WarcRecord>) {
        let mut writer = WarcWriter::new(Vec::new(), false);
        let stats = engine
            .run(input.into_iter().map(Ok), &mut writer, "out.warc")
            .unwrap();
        let bytes = writer.finish().unwrap();
        let output = WarcReader::new(std::io::Cursor::new(bytes))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        (stats, output)
    }

    fn indexed(
        responses: Vec<
            std::result::Result<crate::index::TransportResponse, crate::index::TransportError>,
        >,
    ) -> DeduplicationEngine {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let client = IndexClient::new(
            "http://index.test/cdx/search",
            policy,
            Box::new(MockTransport::new(responses)),
        )
        .unwrap();
        DeduplicationEngine::new(Some(client))
    }

    #[test]
    fn test_in_document_duplicate() {
        let input = vec![
            response("<urn:uuid:1>", "sha256:abc", "http://example.com/", "2020-01-01T00:00:00Z"),
            response("<urn:uuid:2>", "sha256:abc", "http://example.com/", "2020-01-01T00:05:00Z"),
        ];
        let (stats, output) = run(DeduplicationEngine::new(None), input.clone());

        assert_eq!(output.len(), 3);
        assert_eq!(output[0].headers, {
            let mut h = input[0].headers.clone();
            h.set(names::CONTENT_LENGTH, input[0].block.len().to_string());
            h
        });
        assert_eq!(output[0].block, input[0].block);

        let revisit = &output[1];
        assert_eq!(revisit.kind(), RecordKind::Revisit);
        assert_eq!(revisit.headers.get(names::REFERS_TO), Some("<urn:uuid:1>"));
        assert_eq!(
            revisit.headers.get(names::REFERS_TO_DATE),
            Some("2020-01-01T00:00:00Z")
        );
        assert_eq!(
            revisit.headers.get(names::REFERS_TO_TARGET_URI),
            Some("http://example.com/")
        );
        assert_eq!(
            revisit.headers.get(names::PROFILE),
            Some(PROFILE_IDENTICAL_PAYLOAD_1_0)
        );
        assert!(!revisit.headers.contains(names::BLOCK_DIGEST));

        assert_eq!(stats.responses, 2);
        assert_eq!(stats.revisits_local, 1);
        assert_eq!(stats.registered, 1);
    }

    #[test]
    fn test_external_duplicate() {
        let engine = indexed(vec![MockTransport::ok("20190101000000 http://example.com/\n")]);
        let input = vec![response(
            "<urn:uuid:1>",
            "sha1:XYZ",
            "http://example.com/",
            "2020-01-01T00:00:00Z",
        )];
        let (stats, output) = run(engine, input);

        let revisit = &output[0];
        assert_eq!(revisit.kind(), RecordKind::Revisit);
        assert!(!revisit.headers.contains(names::REFERS_TO));
        assert_eq!(
            revisit.headers.get(names::REFERS_TO_DATE),
            Some("2019-01-01T00:00:00Z")
        );
        assert_eq!(stats.revisits_external, 1);
        assert_eq!(stats.registered, 0);
    }

    #[test]
    fn test_indeterminate_is_registered() {
        let engine = indexed(vec![MockTransport::ok(
            "org.archive.wayback.exception.RobotAccessControlException: Blocked By Robots",
        )]);
        let input = vec![
            response("<urn:uuid:1>", "sha1:XYZ", "http://example.com/", "2020-01-01T00:00:00Z"),
            response("<urn:uuid:2>", "sha1:XYZ", "http://example.com/", "2020-01-01T00:01:00Z"),
        ];
        let (stats, output) = run(engine, input);

        assert_eq!(output[0].kind(), RecordKind::Response);
        assert_eq!(output[1].kind(), RecordKind::Revisit);
        assert_eq!(output[1].headers.get(names::REFERS_TO), Some("<urn:uuid:1>"));
        assert_eq!(stats.indeterminate, 1);

        let log = String::from_utf8(output[2].block.clone()).unwrap();
        assert!(log.contains("blocked by robots.txt"));
    }

    #[test]
    fn test_record_without_date_is_not_registered() {
        let mut first = response("<urn:uuid:1>", "sha1:XYZ", "http://example.com/", "");
        first.headers.remove(names::DATE);
        let mut second = first.clone();
        second.headers.set(names::RECORD_ID, "<urn:uuid:2>");

        let (stats, output) = run(DeduplicationEngine::new(None), vec![first, second]);

        assert_eq!(output[0].kind(), RecordKind::Response);
        assert_eq!(output[1].kind(), RecordKind::Response);
        assert_eq!(stats.registered, 0);
        assert_eq!(stats.revisits_local, 0);

        let log = String::from_utf8(output[2].block.clone()).unwrap();
        assert!(log.contains("missing WARC-Date"));
    }

    #[test]
    fn test_warcinfo_and_target_uri_normalization() {
        let mut request_headers = HeaderMap::new();
        request_headers.set(names::TYPE, "request");
        request_headers.set(names::TARGET_URI, "<http://example.com/>");
        let request =
            WarcRecord::new("WARC/1.0", request_headers, b"GET / HTTP/1.1\r\n\r\n".to_vec());

        let (_, output) = run(DeduplicationEngine::new(None), vec![warcinfo(), request]);

        assert_eq!(output[0].headers.get(names::FILENAME), Some("out.warc"));
        assert_eq!(output[1].target_uri(), Some("http://example.com/"));
        assert_eq!(output[1].kind().as_str(), "request");

        let log = &output[2];
        assert_eq!(log.target_uri(), Some(LOG_RECORD_URI));
        assert_eq!(log.headers.get(names::WARCINFO_ID), Some("<urn:uuid:info>"));
    }

    #[test]
    fn test_same_digest_different_uri_is_not_merged() {
        let input = vec![
            response("<urn:uuid:1>", "sha1:A", "http://example.com/a", "2020-01-01T00:00:00Z"),
            response("<urn:uuid:2>", "sha1:A", "http://example.com/b", "2020-01-01T00:00:01Z"),
        ];
        let (stats, output) = run(DeduplicationEngine::new(None), input);
        assert_eq!(output[0].kind(), RecordKind::Response);
        assert_eq!(output[1].kind(), RecordKind::Response);
        assert_eq!(stats.registered, 2);
    }

    #[test]
    fn test_read_error_aborts() {
        let records = vec![Err(Error::archive("bad frame"))];
        let mut writer = WarcWriter::new(Vec::new(), false);
        let result = DeduplicationEngine::new(None).run(records, &mut writer, "out.warc");
        assert!(matches!(result, Err(Error::Archive { .. })));
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn test_existing_revisit_passes_through() {
        let mut revisit = response(
            "<urn:uuid:1>",
            "sha1:A",
            "http://example.com/",
            "2020-01-01T00:00:00Z",
        );
        revisit.headers.set(names::TYPE, "revisit");
        let (stats, output) = run(DeduplicationEngine::new(None), vec![revisit.clone()]);
        assert_eq!(output[0].block, revisit.block);
        assert_eq!(stats.responses, 0);
    }
}
