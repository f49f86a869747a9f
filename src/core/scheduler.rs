use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use filetime::{FileTime, set_file_mtime};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Minimum spacing between two successful runs.
pub const RUN_INTERVAL: Duration = Duration::from_secs(86_400);

/// Once-per-day throttle keyed on the sentinel file's mtime.
///
/// Progress writes touch the sentinel while a run is underway, which keeps a
/// second trigger from starting alongside it. A failed run rewinds the mtime
/// with [`RunScheduler::restore`], so only successful runs count.
pub struct RunScheduler {
    sentinel: PathBuf,
}

impl RunScheduler {
    pub fn new(sentinel: impl Into<PathBuf>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub async fn should_skip_as_already_run(&self) -> bool {
        self.should_skip_at(SystemTime::now()).await
    }

    /// True iff the sentinel exists and was modified at or after `now - 24h`.
    pub async fn should_skip_at(&self, now: SystemTime) -> bool {
        let modified = match tokio::fs::metadata(&self.sentinel)
            .await
            .and_then(|m| m.modified())
        {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(sentinel = %self.sentinel.display(), "No sentinel, run is due");
                return false;
            }
            Err(e) => {
                warn!(
                    sentinel = %self.sentinel.display(),
                    error = %e,
                    "Could not read sentinel mtime, treating run as due"
                );
                return false;
            }
        };

        let window_start = now.checked_sub(RUN_INTERVAL).unwrap_or(UNIX_EPOCH);
        let skip = modified >= window_start;

        let last_run: DateTime<Local> = modified.into();
        debug!(
            last_run = %last_run.format("%Y-%m-%d %H:%M:%S"),
            skip,
            "Checked sentinel"
        );

        skip
    }

    /// Sentinel mtime before any job touches it.
    pub async fn snapshot(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.sentinel)
            .await
            .and_then(|m| m.modified())
            .ok()
    }

    /// Rewind the sentinel to a [`snapshot`](Self::snapshot). A sentinel that
    /// did not exist before is aged to the epoch so the next trigger is due.
    pub async fn restore(&self, snapshot: Option<SystemTime>) -> Result<()> {
        let path = self.sentinel.clone();
        let mtime = FileTime::from_system_time(snapshot.unwrap_or(UNIX_EPOCH));

        let result = tokio::task::spawn_blocking(move || set_file_mtime(&path, mtime))
            .await
            .context("Sentinel restore task panicked")?;

        match result {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to restore mtime of {}", self.sentinel.display())
                });
            }
        }
        debug!(sentinel = %self.sentinel.display(), "Sentinel rewound after failed run");
        Ok(())
    }
}
