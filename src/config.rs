//! Layered configuration.
//!
//! Values come from an optional TOML file overridden by `RSYNC_*` environment
//! variables (`RSYNC_SSH_USER`, `RSYNC_PORT`, `RSYNC_SERVERS`,
//! `RSYNC_TARGET_FOLDER`, `RSYNC_LOG_FILE`, `RSYNC_MIN_UPLOAD_SPEED_IN_MB`, ...).

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::MirrorJob;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mirrorgate/config.toml";
pub const ENV_PREFIX: &str = "RSYNC_";
pub const DEFAULT_LOG_FILE: &str = "/tmp/rsync_timeshift.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("at least one candidate server is required")]
    NoServers,
    #[error("port must be positive")]
    InvalidPort,
    #[error("minimum upload speed must be positive, got {0}")]
    InvalidMinUploadSpeed(f64),
    #[error("at least one mirror job is required")]
    NoJobs,
    #[error("slack notifications selected but slack_webhook is not set")]
    MissingSlackWebhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// In-process TCP connect
    #[default]
    Tcp,
    /// `nping --tcp-connect` from nmap
    Nping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    #[default]
    Desktop,
    Slack,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub ssh_user: String,
    pub port: u16,
    /// Candidate hosts in priority order
    #[serde(deserialize_with = "string_or_list")]
    pub servers: Vec<String>,
    pub target_folder: String,

    /// Status log, also the once-a-day sentinel
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_min_upload_speed")]
    pub min_upload_speed_in_mb: f64,

    #[serde(default)]
    pub probe_method: ProbeMethod,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_rsync_binary")]
    pub rsync_binary: String,
    #[serde(default = "default_speedtest_binary")]
    pub speedtest_binary: String,

    #[serde(default)]
    pub notification_channel: NotificationChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,

    #[serde(default = "default_jobs")]
    pub jobs: Vec<MirrorJob>,
}

impl AppConfig {
    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate the full configuration.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment(config_path)
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve only the status log path, for the read-only `--status` mode.
    pub fn load_log_file(config_path: &Path) -> Result<PathBuf, ConfigError> {
        match Self::figment(config_path).extract_inner::<PathBuf>("log_file") {
            Ok(path) => Ok(path),
            Err(e) if e.missing() => Ok(default_log_file()),
            Err(e) => Err(ConfigError::Load(Box::new(e))),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if !(self.min_upload_speed_in_mb > 0.0) {
            return Err(ConfigError::InvalidMinUploadSpeed(self.min_upload_speed_in_mb));
        }
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        if self.notification_channel == NotificationChannelType::Slack
            && self.slack_webhook.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingSlackWebhook);
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

fn default_min_upload_speed() -> f64 {
    5.0
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_rsync_binary() -> String {
    "rsync".to_string()
}

fn default_speedtest_binary() -> String {
    "speedtest".to_string()
}

/// The home directory mirror and the Timeshift snapshot mirror.
pub fn default_jobs() -> Vec<MirrorJob> {
    vec![
        MirrorJob::new("home", "🏡", "/home").with_exclude([
            "SynologyDrive",
            ".SynologyDrive",
            "*/.git",
            "*/.venv",
            "*/__pycache__",
            "*/.mypy_cache",
            "*/.pytest_cache",
            "*/.ruff_cache",
            ".cache/pypoetry",
            ".cache/pre-commit",
            ".cache/google-chrome",
            ".config/Signal",
            ".config/Franz",
            ".config/google-chrome",
            ".local/share/JetBrains/Toolbox",
            ".local/share/Trash",
            ".local/share/virtualenv",
            ".local/lib",
            ".pyenv",
            ".npm",
            ".nvm",
        ]),
        MirrorJob::new("timeshift", "⏳️", "/timeshift"),
    ]
}

/// Accepts either a list or a comma-separated string, so
/// `RSYNC_SERVERS=a,b` and `RSYNC_SERVERS=["a","b"]` both work.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        List(Vec<String>),
        String(String),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::List(list) => list,
        StringOrList::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn set_required(jail: &mut Jail) {
        jail.set_env("RSYNC_SSH_USER", "backup");
        jail.set_env("RSYNC_PORT", "2222");
        jail.set_env("RSYNC_SERVERS", r#"["192.168.1.10", "backup.example.com"]"#);
        jail.set_env("RSYNC_TARGET_FOLDER", "mirror");
    }

    #[test]
    fn test_load_from_env_with_defaults() {
        Jail::expect_with(|jail| {
            set_required(jail);

            let config = AppConfig::load(Path::new("missing.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.ssh_user, "backup");
            assert_eq!(config.port, 2222);
            assert_eq!(config.servers, vec!["192.168.1.10", "backup.example.com"]);
            assert_eq!(config.target_folder, "mirror");
            assert_eq!(config.log_file, PathBuf::from(DEFAULT_LOG_FILE));
            assert_eq!(config.min_upload_speed_in_mb, 5.0);
            assert_eq!(config.probe_method, ProbeMethod::Tcp);
            assert_eq!(config.jobs.len(), 2);
            assert_eq!(config.jobs[0].name, "home");
            Ok(())
        });
    }

    #[test]
    fn test_comma_separated_servers() {
        Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("RSYNC_SERVERS", "nas.lan, offsite.example.com");

            let config = AppConfig::load(Path::new("missing.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.servers, vec!["nas.lan", "offsite.example.com"]);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                ssh_user = "file-user"
                port = 873
                servers = ["10.0.0.2"]
                target_folder = "backups"
                min_upload_speed_in_mb = 2.5
                probe_method = "nping"

                [[jobs]]
                name = "docs"
                icon = "📄"
                source = "/srv/docs"
                exclude = ["*.tmp"]
                "#,
            )?;
            jail.set_env("RSYNC_SSH_USER", "env-user");

            let config = AppConfig::load(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.ssh_user, "env-user");
            assert_eq!(config.port, 873);
            assert_eq!(config.min_upload_speed_in_mb, 2.5);
            assert_eq!(config.probe_method, ProbeMethod::Nping);
            assert_eq!(config.jobs.len(), 1);
            assert_eq!(config.jobs[0].exclude, vec!["*.tmp"]);
            Ok(())
        });
    }

    #[test]
    fn test_missing_required_field_fails() {
        Jail::expect_with(|jail| {
            jail.set_env("RSYNC_SSH_USER", "backup");

            let result = AppConfig::load(Path::new("missing.toml"));
            assert!(matches!(result, Err(ConfigError::Load(_))));
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("RSYNC_SERVERS", "");
            assert!(matches!(
                AppConfig::load(Path::new("missing.toml")),
                Err(ConfigError::NoServers)
            ));

            set_required(jail);
            jail.set_env("RSYNC_MIN_UPLOAD_SPEED_IN_MB", "0");
            assert!(matches!(
                AppConfig::load(Path::new("missing.toml")),
                Err(ConfigError::InvalidMinUploadSpeed(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_slack_requires_webhook() {
        Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("RSYNC_NOTIFICATION_CHANNEL", "slack");
            assert!(matches!(
                AppConfig::load(Path::new("missing.toml")),
                Err(ConfigError::MissingSlackWebhook)
            ));
            Ok(())
        });
    }

    #[test]
    fn test_load_log_file_only() {
        Jail::expect_with(|jail| {
            assert_eq!(
                AppConfig::load_log_file(Path::new("missing.toml")).map_err(|e| e.to_string())?,
                PathBuf::from(DEFAULT_LOG_FILE)
            );

            jail.set_env("RSYNC_LOG_FILE", "/run/mirrorgate/status");
            assert_eq!(
                AppConfig::load_log_file(Path::new("missing.toml")).map_err(|e| e.to_string())?,
                PathBuf::from("/run/mirrorgate/status")
            );
            Ok(())
        });
    }
}
