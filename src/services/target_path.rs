//! Destination path derivation and the pre-run existence check.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Marker inserted before the archive suffix.
pub const DEDUPLICATED_MARKER: &str = "deduplicated";

/// Archive suffixes the destination can be derived from, longest first.
const ARCHIVE_SUFFIXES: [&str; 2] = [".warc.gz", ".warc"];

/// Derives the default destination for `source`.
///
/// `crawl.warc.gz` becomes `crawl.deduplicated.warc.gz` and `crawl.warc`
/// becomes `crawl.deduplicated.warc`, in the same directory.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `source` has neither suffix.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use warcdedup::services::derive_target_path;
///
/// let target = derive_target_path(Path::new("/data/crawl-01.warc.gz")).unwrap();
/// assert_eq!(target, Path::new("/data/crawl-01.deduplicated.warc.gz"));
/// ```
pub fn derive_target_path(source: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", source.display())))?;

    let (stem, suffix) = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| {
            file_name
                .strip_suffix(suffix)
                .filter(|stem| !stem.is_empty())
                .map(|stem| (stem, *suffix))
        })
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "cannot derive a destination for {}: expected a .warc or .warc.gz file",
                source.display()
            ))
        })?;

    Ok(source.with_file_name(format!("{stem}.{DEDUPLICATED_MARKER}{suffix}")))
}

/// Fails with [`Error::TargetExists`] if `target` is already on disk.
///
/// # Errors
///
/// Returns [`Error::TargetExists`] when the path exists.
pub fn ensure_target_absent(target: &Path) -> Result<()> {
    if target.exists() {
        return Err(Error::TargetExists {
            path: target.display().to_string(),
        });
    }
    Ok(())
}

/// Returns `true` if output to `target` should be gzip-compressed.
#[must_use]
pub fn wants_gzip(target: &Path) -> bool {
    target
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}
