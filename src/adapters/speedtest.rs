use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::process::Command;

use crate::core::{MissingTool, SpeedMeasurement, SpeedTester};

/// Zero-based CSV column holding the upload figure in `speedtest --csv` output.
const UPLOAD_COLUMN: usize = 7;

/// One-shot upload measurement through speedtest-cli.
pub struct SpeedtestCli {
    binary: String,
}

impl SpeedtestCli {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl SpeedTester for SpeedtestCli {
    async fn measure_upload(&self) -> SpeedMeasurement {
        let output = match Command::new(&self.binary)
            .args(["--no-download", "--secure", "--single", "--csv"])
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return SpeedMeasurement::Unavailable(MissingTool::new(
                    "speedtest",
                    "Run 'sudo apt install speedtest-cli'.",
                ));
            }
            Err(e) => return SpeedMeasurement::Failed(e.to_string()),
        };

        if !output.status.success() {
            return SpeedMeasurement::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            );
        }

        match parse_upload(&String::from_utf8_lossy(&output.stdout)) {
            Some(upload_bytes_per_sec) => SpeedMeasurement::Measured {
                upload_bytes_per_sec,
            },
            None => SpeedMeasurement::Failed("Unrecognised speedtest output".to_string()),
        }
    }
}

/// Extract the upload figure from the first non-empty CSV row.
pub fn parse_upload(csv: &str) -> Option<f64> {
    let row = csv.lines().find(|line| !line.trim().is_empty())?;
    split_csv_row(row).get(UPLOAD_COLUMN)?.trim().parse().ok()
}

/// Split one CSV row, honouring double-quoted fields (sponsor names contain commas).
fn split_csv_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = row.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
