//! The single-line "latest status" file.
//!
//! The file doubles as the scheduler sentinel: its mtime marks the last
//! successful run, or a run still in progress. Every write replaces the whole
//! file through a randomly named sibling temp file and a rename, so a
//! concurrent `--status` reader sees either the previous line or the new one,
//! never a torn write.

use anyhow::{Context, Result};
use std::fs::Permissions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Appended after a non-empty status so status bars can concatenate widgets.
pub const STATUS_SEPARATOR: &str = " | ";

/// Status bars usually read the file as an unprivileged user.
const STATUS_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file content with exactly `line`.
    pub async fn write(&self, line: &str) -> Result<()> {
        self.replace(line.as_bytes()).await
    }

    /// Empty the file. This also refreshes its mtime, restarting the 24h window.
    pub async fn clear(&self) -> Result<()> {
        self.replace(b"").await
    }

    async fn replace(&self, contents: &[u8]) -> Result<()> {
        let path = self.path.clone();
        let contents = contents.to_vec();

        tokio::task::spawn_blocking(move || replace_file(&path, &contents))
            .await
            .context("Status write task panicked")?
    }
}

/// Write `contents` to a fresh, exclusively created temp file in the target's
/// directory and rename it over `path`. The temp name is random, so a
/// pre-planted file or symlink is never opened.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".mirrorgate-status")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.as_file()
        .set_permissions(Permissions::from_mode(STATUS_MODE))
        .with_context(|| format!("Failed to set mode on {}", tmp.path().display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.flush()?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

/// Read the current status for display.
///
/// Returns the line followed by [`STATUS_SEPARATOR`], or an empty string when
/// the file is absent or empty (both mean idle).
pub async fn read_status(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.is_empty() => Ok(String::new()),
        Ok(content) => Ok(format!("{}{}", content, STATUS_SEPARATOR)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
