use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::network::{NetworkProbe, ProbeOutcome};
use super::notifications::Notifier;

/// Picks the first reachable backup server, once per run.
///
/// Candidate order is priority order. The result is fixed for the lifetime of
/// the selector: later callers read the cached value and never re-probe.
pub struct ServerSelector {
    candidates: Vec<String>,
    port: u16,
    probe: Arc<dyn NetworkProbe>,
    notifier: Notifier,
    selected: OnceCell<Option<String>>,
}

impl ServerSelector {
    pub fn new(
        candidates: Vec<String>,
        port: u16,
        probe: Arc<dyn NetworkProbe>,
        notifier: Notifier,
    ) -> Self {
        Self {
            candidates,
            port,
            probe,
            notifier,
            selected: OnceCell::new(),
        }
    }

    pub async fn select(&self) -> Option<&str> {
        self.selected
            .get_or_init(|| self.first_available())
            .await
            .as_deref()
    }

    async fn first_available(&self) -> Option<String> {
        for server in &self.candidates {
            match self.probe.probe(server, self.port).await {
                ProbeOutcome::Reachable => {
                    info!(server = %server, port = self.port, "Selected backup server");
                    return Some(server.clone());
                }
                ProbeOutcome::Unreachable => {
                    debug!(server = %server, port = self.port, "Server unreachable");
                }
                ProbeOutcome::Unavailable(tool) => {
                    self.notifier
                        .critical(
                            format!("Skipping backup: {} is not installed.", tool.name),
                            Some(tool.install_hint),
                        )
                        .await;
                    return None;
                }
            }
        }
        None
    }
}
