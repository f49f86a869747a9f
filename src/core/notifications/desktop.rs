use super::{Notification, NotificationChannel};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use nix::unistd::User;
use tokio::process::Command;

/// Milliseconds a desktop bubble stays on screen
const EXPIRE_MS: u32 = 5000;

/// Sends `notify-send` bubbles into the graphical session of the logged-in user.
///
/// The backup normally runs as root from a timer, so the notification has to be
/// delivered through `sudo -u <user>` with that user's display and session bus.
pub struct DesktopNotifier {
    display: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            display: std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string()),
        }
    }
}

#[async_trait]
impl NotificationChannel for DesktopNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let who = Command::new("who")
            .output()
            .await
            .context("Failed to run who")?;
        let user = parse_logged_in_user(&String::from_utf8_lossy(&who.stdout))
            .ok_or_else(|| anyhow!("No logged-in user found to send the notification"))?;

        let uid = User::from_name(&user)
            .with_context(|| format!("Failed to look up user {}", user))?
            .ok_or_else(|| anyhow!("Unknown user {}", user))?
            .uid;

        let args = notify_send_args(&user, uid.as_raw(), &self.display, notification);
        let status = Command::new("sudo")
            .args(&args)
            .status()
            .await
            .context("Failed to run notify-send")?;

        if !status.success() {
            bail!("notify-send exited with {}", status);
        }
        Ok(())
    }
}

/// First user with a graphical session according to `who`.
pub fn parse_logged_in_user(who_output: &str) -> Option<String> {
    who_output
        .lines()
        .find(|line| line.contains("(:0)") || line.contains("(:1)"))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}

/// Arguments passed to `sudo` to deliver one notification.
pub fn notify_send_args(
    user: &str,
    uid: u32,
    display: &str,
    notification: &Notification,
) -> Vec<String> {
    let mut args = vec![
        "-u".to_string(),
        user.to_string(),
        format!("DISPLAY={}", display),
        format!("DBUS_SESSION_BUS_ADDRESS=unix:path=/run/user/{}/bus", uid),
        "notify-send".to_string(),
        "-i".to_string(),
        notification.kind.icon().to_string(),
        "-u".to_string(),
        notification.kind.urgency().to_string(),
        "-t".to_string(),
        EXPIRE_MS.to_string(),
        notification.message.clone(),
    ];
    if let Some(detail) = &notification.detail {
        args.push(detail.replace('\n', " "));
    }
    args
}
