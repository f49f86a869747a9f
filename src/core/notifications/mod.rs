mod desktop;
mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{AppConfig, NotificationChannelType};

pub use desktop::{DesktopNotifier, notify_send_args, parse_logged_in_user};
pub use slack::SlackNotifier;

/// Upper bound on how long a run waits for one notification to be delivered.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest detail handed to a channel. Desktop notifications travel as a
/// single argv entry and Slack sections cap out at 3000 characters.
pub const MAX_DETAIL_BYTES: usize = 2048;

/// Prefixed to a detail whose head was cut by [`bounded_detail`].
pub const TRUNCATED_MARKER: &str = "…(truncated)\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
    Critical,
    NetworkError,
}

impl NotificationKind {
    /// Freedesktop icon name
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Info => "dialog-information",
            Self::Error | Self::Critical => "dialog-error",
            Self::NetworkError => "network-error",
        }
    }

    pub fn urgency(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            _ => "normal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Info => "Backup",
            Self::Error => "Backup Error",
            Self::Critical => "Backup Critical",
            Self::NetworkError => "Backup Skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub detail: Option<String>,
}

/// Trait for notification channel implementations (desktop, Slack, etc.)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Fire-and-forget front end used by every component.
///
/// Each message is logged, then handed to the configured channel. Delivery
/// failures and timeouts are logged and swallowed.
#[derive(Clone, Default)]
pub struct Notifier {
    channel: Option<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channel: Option<Arc<dyn NotificationChannel>>) -> Self {
        Self { channel }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.send(NotificationKind::Info, message.into(), None).await;
    }

    pub async fn error(&self, message: impl Into<String>, detail: Option<String>) {
        self.send(NotificationKind::Error, message.into(), detail)
            .await;
    }

    pub async fn critical(&self, message: impl Into<String>, detail: Option<String>) {
        self.send(NotificationKind::Critical, message.into(), detail)
            .await;
    }

    pub async fn network_error(&self, message: impl Into<String>) {
        self.send(NotificationKind::NetworkError, message.into(), None)
            .await;
    }

    async fn send(&self, kind: NotificationKind, message: String, detail: Option<String>) {
        let detail = detail.map(|d| bounded_detail(&d));
        let detail_text = detail.as_deref().unwrap_or("");
        match kind {
            NotificationKind::Info => info!(detail = detail_text, "{}", message),
            NotificationKind::NetworkError => warn!(detail = detail_text, "{}", message),
            NotificationKind::Error | NotificationKind::Critical => {
                error!(detail = detail_text, "{}", message)
            }
        }

        let Some(channel) = &self.channel else {
            return;
        };

        let notification = Notification {
            kind,
            message,
            detail,
        };

        match tokio::time::timeout(DELIVERY_TIMEOUT, channel.notify(&notification)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Notification delivery failed"),
            Err(_) => warn!("Notification delivery timed out"),
        }
    }
}

/// Keep the last [`MAX_DETAIL_BYTES`] of `detail`, starting on a line boundary
/// where one is available. The end of an error stream is where rsync puts
/// its summary.
pub fn bounded_detail(detail: &str) -> String {
    if detail.len() <= MAX_DETAIL_BYTES {
        return detail.to_string();
    }

    let mut start = detail.len() - MAX_DETAIL_BYTES;
    while !detail.is_char_boundary(start) {
        start += 1;
    }
    let tail = &detail[start..];
    let tail = match tail.find('\n') {
        Some(i) if i + 1 < tail.len() => &tail[i + 1..],
        _ => tail,
    };

    format!("{}{}", TRUNCATED_MARKER, tail)
}

/// Factory function to create a notification channel based on config
pub fn create_channel(config: &AppConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.notification_channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Desktop => Some(Arc::new(DesktopNotifier::new())),
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(SlackNotifier::new(webhook.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationChannel for Recorder {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationChannel for Broken {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            bail!("bus unavailable")
        }
    }

    #[tokio::test]
    async fn test_notifier_forwards_kind_and_detail() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::new(Some(recorder.clone()));

        notifier.info("Backup started: /home").await;
        notifier
            .critical("Skipping backup: nmap is not installed.", Some("hint".into()))
            .await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, NotificationKind::Info);
        assert_eq!(sent[0].detail, None);
        assert_eq!(sent[1].kind, NotificationKind::Critical);
        assert_eq!(sent[1].detail.as_deref(), Some("hint"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = Notifier::new(Some(Arc::new(Broken)));
        notifier.error("Backup failed: /home", None).await;
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        Notifier::default().network_error("On a metered connection").await;
    }

    #[test]
    fn test_kind_icons_and_urgency() {
        assert_eq!(NotificationKind::Critical.urgency(), "critical");
        assert_eq!(NotificationKind::Error.urgency(), "normal");
        assert_eq!(NotificationKind::NetworkError.icon(), "network-error");
        assert_eq!(NotificationKind::Info.icon(), "dialog-information");
    }

    #[test]
    fn test_short_detail_is_untouched() {
        assert_eq!(bounded_detail("rsync error (code 23)"), "rsync error (code 23)");
    }

    #[test]
    fn test_long_detail_keeps_whole_trailing_lines() {
        let detail: String = (0..20_000)
            .map(|i| format!("file has vanished: \"/home/user/file-{}.txt\"\n", i))
            .chain(std::iter::once("rsync error: some files vanished (code 24)".to_string()))
            .collect();

        let bounded = bounded_detail(&detail);

        assert!(bounded.len() <= MAX_DETAIL_BYTES + TRUNCATED_MARKER.len());
        assert!(bounded.starts_with(TRUNCATED_MARKER));
        assert!(bounded[TRUNCATED_MARKER.len()..].starts_with("file has vanished"));
        assert!(bounded.ends_with("(code 24)"));
    }

    #[test]
    fn test_bounded_detail_respects_char_boundaries() {
        let detail = "🔁".repeat(MAX_DETAIL_BYTES);
        let bounded = bounded_detail(&detail);
        assert!(bounded.len() <= MAX_DETAIL_BYTES + TRUNCATED_MARKER.len());
        assert!(bounded.ends_with('🔁'));
    }

    #[tokio::test]
    async fn test_notifier_bounds_detail_before_delivery() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::new(Some(recorder.clone()));
        let stderr = "warning: skipping file\n".repeat(20_000);

        notifier.error("Backup failed: /home", Some(stderr)).await;

        let sent = recorder.sent.lock().unwrap();
        let detail = sent[0].detail.as_deref().unwrap();
        assert!(detail.len() <= MAX_DETAIL_BYTES + TRUNCATED_MARKER.len());
        assert!(detail.starts_with(TRUNCATED_MARKER));
    }
}
