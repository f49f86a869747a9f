use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

use super::network::{MeteredConnection, MeteredState, SpeedMeasurement, SpeedTester};
use super::notifications::Notifier;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Decides whether the uplink to the selected server is good enough to mirror.
pub struct LinkQualityGate {
    min_upload_speed_in_mb: f64,
    metered: Arc<dyn MeteredConnection>,
    speed_test: Arc<dyn SpeedTester>,
    notifier: Notifier,
}

impl LinkQualityGate {
    pub fn new(
        min_upload_speed_in_mb: f64,
        metered: Arc<dyn MeteredConnection>,
        speed_test: Arc<dyn SpeedTester>,
        notifier: Notifier,
    ) -> Self {
        Self {
            min_upload_speed_in_mb,
            metered,
            speed_test,
            notifier,
        }
    }

    pub async fn should_run(&self, selected: Option<&str>) -> bool {
        let Some(server) = selected else {
            return false;
        };

        if is_private_address(server) {
            debug!(server, "Server on private network, skipping link checks");
            return true;
        }

        match self.metered.check().await {
            MeteredState::Metered => {
                self.notifier
                    .network_error("Skipping backup: On a metered connection")
                    .await;
                return false;
            }
            MeteredState::Unmetered => debug!("Connection is not metered"),
            MeteredState::Unknown => debug!("Metered state unknown, proceeding"),
        }

        self.fast_upload().await
    }

    async fn fast_upload(&self) -> bool {
        let upload_bytes_per_sec = match self.speed_test.measure_upload().await {
            SpeedMeasurement::Measured {
                upload_bytes_per_sec,
            } => upload_bytes_per_sec,
            SpeedMeasurement::Unavailable(tool) => {
                self.notifier
                    .critical(
                        format!("Skipping backup: {} is not installed.", tool.name),
                        Some(tool.install_hint),
                    )
                    .await;
                return false;
            }
            SpeedMeasurement::Failed(reason) => {
                self.notifier
                    .error("Skipping backup: Speed test failed.", Some(reason))
                    .await;
                return false;
            }
        };

        let upload_speed_in_mb = upload_bytes_per_sec / BYTES_PER_MB;
        if upload_speed_in_mb < self.min_upload_speed_in_mb {
            self.notifier
                .network_error(format!(
                    "Skipping backup: Upload speed is {:.2} MB/s. Required minimum is {} MB/s.",
                    upload_speed_in_mb, self.min_upload_speed_in_mb
                ))
                .await;
            return false;
        }

        info!(
            upload_mb_per_sec = format!("{:.2}", upload_speed_in_mb),
            "Upload speed sufficient"
        );
        true
    }
}

/// Literal IPv4 addresses in private, loopback, or link-local ranges.
/// Hostnames and IPv6 literals are never considered private.
pub fn is_private_address(server: &str) -> bool {
    server
        .parse::<Ipv4Addr>()
        .is_ok_and(|ip| ip.is_private() || ip.is_loopback() || ip.is_link_local())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_addresses() {
        assert!(is_private_address("192.168.1.10"));
        assert!(is_private_address("10.0.0.2"));
        assert!(is_private_address("172.16.5.4"));
        assert!(is_private_address("127.0.0.1"));
        assert!(is_private_address("169.254.3.3"));
    }

    #[test]
    fn test_public_addresses_and_hostnames() {
        assert!(!is_private_address("8.8.8.8"));
        assert!(!is_private_address("172.32.0.1"));
        assert!(!is_private_address("nas.lan"));
        assert!(!is_private_address("fd00::1"));
    }
}
