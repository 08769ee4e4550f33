//! Streaming WARC reader.

use super::headers::HeaderMap;
use super::record::{WarcRecord, names};
use crate::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Iterates the records of a WARC stream in file order.
///
/// Gzip input is detected from the magic bytes and decoded as a
/// multi-member stream, so both whole-file and per-record compression work.
/// After the first framing error the iterator yields that error once and
/// then ends.
///
/// # Example
///
/// ```rust
/// use warcdedup::warc::WarcReader;
///
/// let raw = b"WARC/1.0\r\nWARC-Type: warcinfo\r\nContent-Length: 2\r\n\r\nok\r\n\r\n";
/// let records: Vec<_> = WarcReader::new(&raw[..])
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
///
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].block, b"ok");
/// ```
pub struct WarcReader {
    inner: Box<dyn BufRead>,
    offset: u64,
    done: bool,
}

impl WarcReader {
    /// Wraps a byte source, sniffing for gzip.
    ///
    /// # Errors
    ///
    /// Returns an error if the first bytes cannot be read.
    pub fn new<R: Read + 'static>(source: R) -> Result<Self> {
        let mut buffered = BufReader::new(source);
        let head = buffered
            .fill_buf()
            .map_err(|e| Error::io("read_archive_header", &e))?;
        let inner: Box<dyn BufRead> = if head.starts_with(&GZIP_MAGIC) {
            tracing::debug!("Detected gzip-compressed archive");
            Box::new(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };

        Ok(Self {
            inner,
            offset: 0,
            done: false,
        })
    }

    /// Reads one line including its terminator. Empty vec means EOF.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let read = self
            .inner
            .read_until(b'\n', &mut line)
            .map_err(|e| Error::io("read_archive", &e))?;
        self.offset += read as u64;
        Ok(line)
    }

    fn skip_blank_lines(&mut self) -> Result<()> {
        loop {
            let buf = self
                .inner
                .fill_buf()
                .map_err(|e| Error::io("read_archive", &e))?;
            match buf.first() {
                Some(b'\r' | b'\n') => {
                    self.inner.consume(1);
                    self.offset += 1;
                },
                _ => return Ok(()),
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<WarcRecord>> {
        self.skip_blank_lines()?;
        let start = self.offset;

        let version_line = self.read_line()?;
        if version_line.is_empty() {
            return Ok(None);
        }
        let version = decode_line(&version_line);
        if !version.starts_with("WARC/") {
            return Err(Error::archive(format!(
                "expected WARC version line at offset {start}, found {version:?}"
            )));
        }

        let headers = self.read_headers(start)?;
        let length = content_length(&headers, start)?;

        let mut block = Vec::new();
        let read = (&mut self.inner)
            .take(length)
            .read_to_end(&mut block)
            .map_err(|e| Error::io("read_archive", &e))?;
        if read as u64 != length {
            return Err(Error::archive(format!(
                "record at offset {start} truncated: expected {length} block bytes, found {read}"
            )));
        }
        self.offset += length;

        Ok(Some(WarcRecord::new(version, headers, block)))
    }

    fn read_headers(&mut self, start: u64) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        loop {
            let raw = self.read_line()?;
            if raw.is_empty() {
                return Err(Error::archive(format!(
                    "unexpected end of archive in header block at offset {start}"
                )));
            }
            let line = decode_line(&raw);
            if line.is_empty() {
                return Ok(headers);
            }

            if line.starts_with([' ', '\t']) {
                let Some(last) = headers.last_mut() else {
                    return Err(Error::archive(format!(
                        "continuation line before any header at offset {start}"
                    )));
                };
                last.1.push(' ');
                last.1.push_str(line.trim());
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::archive(format!(
                    "header line without ':' at offset {start}: {line:?}"
                )));
            };
            headers.append(name.trim(), value.trim());
        }
    }
}

impl Iterator for WarcReader {
    type Item = Result<WarcRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

/// Decodes a header line as UTF-8, falling back to ISO-8859-1.
fn decode_line(raw: &[u8]) -> String {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&b| char::from(b)).collect(),
    };
    text.trim_end_matches(['\r', '\n']).to_string()
}

fn content_length(headers: &HeaderMap, start: u64) -> Result<u64> {
    let raw = headers.get(names::CONTENT_LENGTH).ok_or_else(|| {
        Error::archive(format!("record at offset {start} has no Content-Length"))
    })?;
    raw.trim().parse().map_err(|e| {
        Error::archive(format!(
            "record at offset {start} has invalid Content-Length {raw:?}: {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const TWO_RECORDS: &[u8] = b"WARC/1.0\r\n\
WARC-Type: warcinfo\r\n\
WARC-Record-ID: <urn:uuid:1>\r\n\
Content-Length: 5\r\n\
\r\n\
hello\r\n\r\n\
WARC/1.0\r\n\
WARC-Type: response\r\n\
WARC-Target-URI: http://example.com/\r\n\
Content-Length: 4\r\n\
\r\n\
body\r\n\r\n";

    #[test]
    fn test_reads_plain_records() {
        let records: Vec<WarcRecord> = WarcReader::new(TWO_RECORDS)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].version, "WARC/1.0");
        assert_eq!(records[0].record_id(), Some("<urn:uuid:1>"));
        assert_eq!(records[0].block, b"hello");
        assert_eq!(records[1].target_uri(), Some("http://example.com/"));
        assert_eq!(records[1].block, b"body");
    }

    #[test]
    fn test_reads_gzip_members() {
        let mut compressed = Vec::new();
        for chunk in [&TWO_RECORDS[..55], &TWO_RECORDS[55..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(chunk).unwrap();
            compressed.extend(encoder.finish().unwrap());
        }

        let records: Vec<WarcRecord> = WarcReader::new(std::io::Cursor::new(compressed))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].block, b"body");
    }

    #[test]
    fn test_folds_continuation_lines() {
        let raw: &[u8] = b"WARC/1.0\r\nWARC-Type: metadata\r\n\
X-Long: first\r\n  second\r\n\
Content-Length: 0\r\n\r\n\r\n\r\n";
        let record = WarcReader::new(raw).unwrap().next().unwrap().unwrap();
        assert_eq!(record.headers.get("X-Long"), Some("first second"));
    }

    #[test]
    fn test_truncated_block_is_error() {
        let raw: &[u8] = b"WARC/1.0\r\nContent-Length: 50\r\n\r\nshort";
        let mut reader = WarcReader::new(raw).unwrap();
        assert!(matches!(reader.next(), Some(Err(Error::Archive { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_huge_content_length_is_error() {
        let raw: &[u8] = b"WARC/1.0\r\nWARC-Type: response\r\n\
Content-Length: 18446744073709551615\r\n\r\nshort";
        let mut reader = WarcReader::new(raw).unwrap();
        match reader.next() {
            Some(Err(Error::Archive { cause })) => assert!(cause.contains("truncated"), "{cause}"),
            other => panic!("expected truncation error, got {other:?}"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_latin1_header_falls_back() {
        let raw: &[u8] = b"WARC/1.0\r\nWARC-Type: response\r\n\
WARC-Target-URI: http://example.com/caf\xe9\r\nContent-Length: 4\r\n\r\nbody\r\n\r\n";
        let record = WarcReader::new(raw).unwrap().next().unwrap().unwrap();
        assert_eq!(record.target_uri(), Some("http://example.com/caf\u{e9}"));
        assert_eq!(record.block, b"body");
    }

    #[test]
    fn test_missing_version_is_error() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";
        let mut reader = WarcReader::new(raw).unwrap();
        assert!(matches!(reader.next(), Some(Err(Error::Archive { .. }))));
    }

    #[test]
    fn test_empty_input() {
        let mut reader = WarcReader::new(&b""[..]).unwrap();
        assert!(reader.next().is_none());
    }
}
