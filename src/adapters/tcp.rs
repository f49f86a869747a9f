use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::{NetworkProbe, ProbeOutcome};

/// Probes reachability with a plain TCP connect, bounded by `timeout`.
pub struct TcpConnectProbe {
    timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl NetworkProbe for TcpConnectProbe {
    async fn probe(&self, host: &str, port: u16) -> ProbeOutcome {
        match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => ProbeOutcome::Reachable,
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "TCP connect failed");
                ProbeOutcome::Unreachable
            }
            Err(_) => {
                debug!(host, port, "TCP connect timed out");
                ProbeOutcome::Unreachable
            }
        }
    }
}
