use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::{MissingTool, NetworkProbe, ProbeOutcome};

/// Extra time granted to nping on top of the probe timeout for its own startup.
const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Probes reachability with `nping --tcp-connect` from the nmap suite.
pub struct NpingProbe {
    binary: String,
    timeout: Duration,
}

impl NpingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_binary("nping", timeout)
    }

    pub fn with_binary(binary: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl NetworkProbe for NpingProbe {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome {
        let port_arg = port.to_string();
        let mut command = Command::new(&self.binary);
        command
            .args(["--tcp-connect", "-c", "1", "-p", &port_arg, "-q", host])
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout + STARTUP_GRACE, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return ProbeOutcome::Unavailable(MissingTool::new(
                    "nmap",
                    "Run 'sudo apt install nmap'.",
                ));
            }
            Ok(Err(e)) => {
                warn!(host, error = %e, "Failed to run nping");
                return ProbeOutcome::Unreachable;
            }
            Err(_) => {
                debug!(host, "nping timed out");
                return ProbeOutcome::Unreachable;
            }
        };

        if output.status.success() && reports_success(&String::from_utf8_lossy(&output.stdout)) {
            ProbeOutcome::Reachable
        } else {
            ProbeOutcome::Unreachable
        }
    }
}

/// Whether nping's summary reports the single connect attempt as successful.
pub fn reports_success(stdout: &str) -> bool {
    stdout.contains("Successful connections: 1")
}
