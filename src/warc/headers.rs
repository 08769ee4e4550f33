//! Ordered, case-insensitive WARC header block.

use std::fmt;

/// Ordered header block with case-insensitive names.
///
/// Insertion order is preserved so a record that is only touched by
/// [`HeaderMap::set`] serializes back in the same order it was read.
/// Setting an existing name replaces its value in place rather than
/// appending a second line.
///
/// # Example
///
/// ```rust
/// use warcdedup::warc::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.set("WARC-Type", "response");
/// headers.set("warc-type", "revisit");
///
/// assert_eq!(headers.len(), 1);
/// assert_eq!(headers.get("WARC-TYPE"), Some("revisit"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty header map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the value of the first header matching `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if a header named `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the value of `name`, or appends it if absent.
    ///
    /// The first occurrence keeps its position and original spelling; any
    /// later occurrences of the same name are dropped.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        let Some(first) = self.position(&name) else {
            self.entries.push((name, value));
            return;
        };

        self.entries[first].1 = value;
        let mut index = 0;
        self.entries.retain(|(key, _)| {
            let keep = index <= first || !key.eq_ignore_ascii_case(&name);
            index += 1;
            keep
        });
    }

    /// Appends a header without checking for an existing one.
    ///
    /// Used by the parser, which must preserve the block exactly as read.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes every header named `name`. Returns `true` if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    /// Iterates headers in block order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutable access to the last header, for folding continuation lines.
    pub(crate) fn last_mut(&mut self) -> Option<&mut (String, String)> {
        self.entries.last_mut()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            write!(f, "{key}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.set(key, value);
        }
        map
    }
}
