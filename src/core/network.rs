use async_trait::async_trait;

use super::models::MissingTool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
    /// The probing mechanism itself is missing; fatal for the whole run
    Unavailable(MissingTool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteredState {
    Metered,
    Unmetered,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeedMeasurement {
    Measured { upload_bytes_per_sec: f64 },
    Failed(String),
    Unavailable(MissingTool),
}

/// Bounded-time reachability check for a single host.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome;
}

/// Reports whether the active uplink is flagged as data-limited.
#[async_trait]
pub trait MeteredConnection: Send + Sync {
    async fn check(&self) -> MeteredState;
}

/// One-shot upload bandwidth measurement.
#[async_trait]
pub trait SpeedTester: Send + Sync {
    async fn measure_upload(&self) -> SpeedMeasurement;
}
