//! External-tool implementations of the collaborator traits in `core::network`.

mod nmcli;
mod nping;
mod speedtest;
mod tcp;

use std::sync::Arc;

use crate::config::{AppConfig, ProbeMethod};
use crate::core::{MeteredConnection, NetworkProbe, SpeedTester};

pub use nmcli::{NetworkDevice, NmcliDetector, classify, parse_devices};
pub use nping::{NpingProbe, reports_success};
pub use speedtest::{SpeedtestCli, parse_upload};
pub use tcp::TcpConnectProbe;

pub fn create_probe(config: &AppConfig) -> Arc<dyn NetworkProbe> {
    match config.probe_method {
        ProbeMethod::Tcp => Arc::new(TcpConnectProbe::new(config.probe_timeout())),
        ProbeMethod::Nping => Arc::new(NpingProbe::new(config.probe_timeout())),
    }
}

pub fn create_metered_detector() -> Arc<dyn MeteredConnection> {
    Arc::new(NmcliDetector::default())
}

pub fn create_speed_tester(config: &AppConfig) -> Arc<dyn SpeedTester> {
    Arc::new(SpeedtestCli::new(&config.speedtest_binary))
}
