//! Classification of rsync output lines into progress events.
//!
//! rsync run with `--info=progress2 --no-inc-recursive` emits two shapes of
//! interest: a file-list enumeration counter (`1234 files...`) and periodic
//! whole-transfer samples (`34.25M   0%    5.19MB/s    0:00:06 (xfr#1186, ...)`).
//! Everything else is noise as far as the status line is concerned.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static FILE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d+) files\.\.\.$").expect("valid file count regex"));

/// Magnitude suffixes, largest first, with the decimals each one is rendered with.
const COUNT_UNITS: [(&str, u64, usize); 4] = [
    ("G", 1_000_000_000, 1),
    ("M", 1_000_000, 1),
    ("k", 1_000, 1),
    ("", 1, 0),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Pre-transfer enumeration count
    FileCount(u64),
    /// Mid-transfer sample, fields kept verbatim as rsync printed them
    TransferProgress {
        transferred: String,
        percent: String,
        rate: String,
        eta: String,
    },
}

impl ProgressEvent {
    /// Classify one line of rsync output. Unrecognised lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();

        if line.ends_with("files...") {
            return FILE_COUNT
                .captures(line)
                .and_then(|caps| caps[1].parse().ok())
                .map(ProgressEvent::FileCount);
        }

        let mut fields = line.split_whitespace();
        let (transferred, percent, rate, eta) =
            (fields.next()?, fields.next()?, fields.next()?, fields.next()?);

        if !is_percentage(percent) {
            return None;
        }

        Some(ProgressEvent::TransferProgress {
            transferred: transferred.to_string(),
            percent: percent.to_string(),
            rate: rate.to_string(),
            eta: eta.to_string(),
        })
    }

    /// Compact rendering used in the status line.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::FileCount(count) => f.write_str(&format_count(*count)),
            ProgressEvent::TransferProgress {
                transferred,
                percent,
                rate,
                eta,
            } => write!(f, "{} {} {} {}", transferred, percent, rate, eta),
        }
    }
}

/// Render a count with the largest suffix whose divisor it exceeds.
pub fn format_count(count: u64) -> String {
    for (unit, divider, precision) in COUNT_UNITS {
        if count > divider {
            return format!(
                "{:.*}{}",
                precision,
                count as f64 / divider as f64,
                unit
            );
        }
    }
    count.to_string()
}

/// Full status line written to the status log for one event.
pub fn status_line(icon: &str, event: &ProgressEvent) -> String {
    format!("🔁{} {}", icon, event)
}

fn is_percentage(token: &str) -> bool {
    token
        .strip_suffix('%')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
