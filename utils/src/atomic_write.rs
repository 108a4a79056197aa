//! Atomic file write helpers.
//!
//! Uses a temp file + rename pattern so readers never observe a half-written
//! export.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileSyncPolicy {
    #[default]
    SyncAll,
    SkipSync,
}

pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with_policy(path, bytes, FileSyncPolicy::default())
}

/// Write `bytes` to `path`, creating missing parent directories.
pub fn atomic_write_with_policy(
    path: impl AsRef<Path>,
    bytes: &[u8],
    sync: FileSyncPolicy,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    if sync == FileSyncPolicy::SyncAll {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|err| err.error)?;

    debug!(path = %path.display(), bytes = bytes.len(), "atomic write complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("quotes.csv");

        atomic_write(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        atomic_write_with_policy(&path, b"", FileSyncPolicy::SkipSync).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");
    }
}
