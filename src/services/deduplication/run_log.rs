//! Audit trail written as the last record of the output archive.

use crate::warc::{HeaderMap, RecordKind, WarcRecord, names};
use chrono::{DateTime, Utc};

/// Target URI of the trailing log record.
pub const LOG_RECORD_URI: &str = "urn:X-warc-dedup:log";

/// Timestamp format for log lines.
const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Append-only list of timestamped messages for one run.
///
/// Every message is also emitted through `tracing` at info level, so the
/// same trail shows up in the process log and in the archive.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<(DateTime<Utc>, String)>,
    warcinfo_id: Option<String>,
}

impl RunLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message`, one entry per non-empty line, all stamped now.
    pub fn log(&mut self, message: impl AsRef<str>) {
        self.log_at(Utc::now(), message.as_ref());
    }

    fn log_at(&mut self, at: DateTime<Utc>, message: &str) {
        for line in message.lines().map(str::trim).filter(|l| !l.is_empty()) {
            tracing::info!(target: "warcdedup::run_log", "{line}");
            self.entries.push((at, line.to_string()));
        }
    }

    /// Links the log record to the run's `warcinfo`. The first ID wins.
    pub fn set_warcinfo(&mut self, record_id: impl Into<String>) {
        if self.warcinfo_id.is_none() {
            self.warcinfo_id = Some(record_id.into());
        }
    }

    /// The linked `warcinfo` record ID, if any.
    #[must_use]
    pub fn warcinfo_id(&self) -> Option<&str> {
        self.warcinfo_id.as_deref()
    }

    /// Logged entries in order.
    #[must_use]
    pub fn entries(&self) -> &[(DateTime<Utc>, String)] {
        &self.entries
    }

    /// Renders the payload: one `timestamp message` line per entry.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(at, message)| format!("{} {message}", at.format(LINE_TIMESTAMP_FORMAT)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Builds the trailing `resource` record.
    #[must_use]
    pub fn to_record(&self) -> WarcRecord {
        let mut extra = HeaderMap::new();
        extra.set(names::CONTENT_TYPE, "text/plain");
        if let Some(ref id) = self.warcinfo_id {
            extra.set(names::WARCINFO_ID, id.as_str());
        }
        WarcRecord::create(
            &RecordKind::Other("resource".to_string()),
            Some(LOG_RECORD_URI),
            extra,
            self.render().into_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_multiline_messages_are_split_and_trimmed() {
        let mut log = RunLog::new();
        let at = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        log.log_at(at, "  first  \n\nsecond\n");

        assert_eq!(log.entries().len(), 2);
        assert_eq!(
            log.render(),
            "2021-03-04 05:06:07.000000 first\n2021-03-04 05:06:07.000000 second"
        );
    }

    #[test]
    fn test_record_links_warcinfo() {
        let mut log = RunLog::new();
        log.set_warcinfo("<urn:uuid:info>");
        log.set_warcinfo("<urn:uuid:other>");
        log.log("hello");

        let record = log.to_record();
        assert_eq!(record.kind().as_str(), "resource");
        assert_eq!(record.target_uri(), Some(LOG_RECORD_URI));
        assert_eq!(record.headers.get(names::CONTENT_TYPE), Some("text/plain"));
        assert_eq!(
            record.headers.get(names::WARCINFO_ID),
            Some("<urn:uuid:info>")
        );
        assert!(String::from_utf8(record.block).unwrap().ends_with(" hello"));
    }

    #[test]
    fn test_record_without_warcinfo() {
        let record = RunLog::new().to_record();
        assert!(!record.headers.contains(names::WARCINFO_ID));
        assert!(record.block.is_empty());
    }
}
