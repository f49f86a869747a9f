use crate::config::AppConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

const SERVICE_PATH: &str = "/etc/systemd/system/mirrorgate.service";
const TIMER_PATH: &str = "/etc/systemd/system/mirrorgate.timer";
const TIMER_UNIT: &str = "mirrorgate.timer";

const SERVICE_TEMPLATE: &str = r#"[Unit]
Description=Network-aware backup mirroring
Wants=network-online.target
After=network-online.target

[Service]
Type=oneshot
ExecStart={binary_path} --config {config_path}
Nice=10
IOSchedulingClass=idle
"#;

// Runs are throttled to once a day by the sentinel, not by the timer.
const TIMER_TEMPLATE: &str = r#"[Unit]
Description=Hourly mirrorgate backup check

[Timer]
OnCalendar=hourly
Persistent=true

[Install]
WantedBy=timers.target
"#;

/// Installs the systemd service and hourly timer that trigger runs.
pub struct ServiceManager {
    service_path: PathBuf,
    timer_path: PathBuf,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            service_path: PathBuf::from(SERVICE_PATH),
            timer_path: PathBuf::from(TIMER_PATH),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.service_path.exists() && self.timer_path.exists()
    }

    pub fn install(&self, config: &AppConfig, config_path: &Path) -> Result<()> {
        self.write_config(config, config_path)?;

        let binary_path = std::env::current_exe().context("Failed to determine binary path")?;
        std::fs::write(&self.service_path, render_service(&binary_path, config_path))
            .context("Failed to write service file")?;
        std::fs::write(&self.timer_path, TIMER_TEMPLATE).context("Failed to write timer file")?;

        systemctl(&["daemon-reload"])?;
        systemctl(&["enable", "--now", TIMER_UNIT])?;

        info!(
            service = %self.service_path.display(),
            timer = %self.timer_path.display(),
            "Installed hourly backup timer"
        );
        Ok(())
    }

    /// Persist the effective configuration (file plus environment) for
    /// timer-started runs.
    fn write_config(&self, config: &AppConfig, config_path: &Path) -> Result<()> {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }
}

pub fn render_service(binary_path: &Path, config_path: &Path) -> String {
    SERVICE_TEMPLATE
        .replace("{binary_path}", &binary_path.display().to_string())
        .replace("{config_path}", &config_path.display().to_string())
}

fn systemctl(args: &[&str]) -> Result<()> {
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .with_context(|| format!("Failed to run systemctl {}", args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("systemctl {} failed", args.join(" "));
    }
    Ok(())
}
