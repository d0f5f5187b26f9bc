//! Atomic file writes (tempfile → fsync → rename).
//!
//! Raw trees, curated artifacts, and manifests are write-once; a
//! crashed run must never leave a torn file where a complete one is
//! expected. All artifact writes in the workspace go through here.

use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use camino::Utf8Path;
use tempfile::NamedTempFile;

/// Atomically write text content to `path`.
///
/// Line endings are normalized to LF and the temp file lives in the
/// target's directory so the final rename stays on one filesystem.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    write_bytes_atomic(path, normalized.as_bytes())
}

/// Atomically write raw bytes to `path`.
pub fn write_bytes_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(bytes)
        .with_context(|| "Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .with_context(|| format!("Failed to atomically rename into place: {path}"))?;
    Ok(())
}

/// Create a directory tree, tolerating races with concurrent creators.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {path}"))
}
