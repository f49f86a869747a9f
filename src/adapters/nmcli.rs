//! Metered-connection detection through NetworkManager.
//!
//! A device counts as live only if NetworkManager reports it connected *and*
//! it can reach the internet on its own (`ping -I <device>`), so a stale
//! wifi association does not mask a metered tether.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::{MeteredConnection, MeteredState};

const NMCLI_ARGS: [&str; 7] = [
    "-t",
    "-m",
    "multiline",
    "-f",
    "GENERAL.DEVICE,GENERAL.TYPE,GENERAL.STATE,GENERAL.METERED",
    "dev",
    "show",
];

const PING_TARGET: &str = "1.1.1.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDevice {
    pub name: String,
    pub kind: String,
    pub state: String,
    pub metered: String,
}

impl NetworkDevice {
    fn is_connected(&self) -> bool {
        self.state.contains("connected") && !self.state.contains("disconnected")
    }

    /// NetworkManager reports `yes`, `yes (guessed)`, `no`, `no (guessed)` or `unknown`.
    fn is_metered(&self) -> bool {
        self.metered.starts_with("yes")
    }
}

pub struct NmcliDetector {
    interface_types: Vec<String>,
}

impl Default for NmcliDetector {
    fn default() -> Self {
        Self {
            interface_types: vec!["wifi".to_string(), "ethernet".to_string()],
        }
    }
}

#[async_trait]
impl MeteredConnection for NmcliDetector {
    async fn check(&self) -> MeteredState {
        let output = match Command::new("nmcli").args(NMCLI_ARGS).output().await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(status = %output.status, "nmcli failed, metered state unknown");
                return MeteredState::Unknown;
            }
            Err(e) => {
                warn!(error = %e, "Failed to run nmcli, metered state unknown");
                return MeteredState::Unknown;
            }
        };

        let devices = parse_devices(&String::from_utf8_lossy(&output.stdout));

        let mut live = Vec::new();
        for device in devices
            .iter()
            .filter(|d| self.interface_types.contains(&d.kind) && d.is_connected())
        {
            if ping_interface(&device.name).await {
                live.push(device);
            } else {
                debug!(device = %device.name, "Device connected but cannot reach the internet");
            }
        }

        classify(live)
    }
}

/// Parse `nmcli -t -m multiline` output into one entry per device block.
pub fn parse_devices(stdout: &str) -> Vec<NetworkDevice> {
    stdout
        .trim()
        .split("\n\n")
        .filter_map(|block| {
            let fields: HashMap<&str, &str> = block
                .lines()
                .filter_map(|line| line.split_once(':'))
                .map(|(key, value)| (key.trim(), value.trim()))
                .collect();

            Some(NetworkDevice {
                name: fields.get("GENERAL.DEVICE")?.to_string(),
                kind: fields.get("GENERAL.TYPE").unwrap_or(&"").to_string(),
                state: fields.get("GENERAL.STATE").unwrap_or(&"").to_string(),
                metered: fields.get("GENERAL.METERED").unwrap_or(&"").to_string(),
            })
        })
        .collect()
}

/// Metered if any live device is metered, unmetered if at least one is live.
pub fn classify<'a>(live_devices: impl IntoIterator<Item = &'a NetworkDevice>) -> MeteredState {
    let mut state = MeteredState::Unknown;
    for device in live_devices {
        if device.is_metered() {
            return MeteredState::Metered;
        }
        state = MeteredState::Unmetered;
    }
    state
}

async fn ping_interface(interface: &str) -> bool {
    Command::new("ping")
        .args(["-I", interface, "-q", "-c", "1", "-w", "3", PING_TARGET])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}
