#![allow(dead_code)]

use async_trait::async_trait;
use mirrorgate::config::AppConfig;
use mirrorgate::context::AppContext;
use mirrorgate::core::{
    MeteredConnection, MeteredState, MirrorJob, MissingTool, NetworkProbe, Notification,
    NotificationChannel, NotificationKind, Notifier, ProbeOutcome, SpeedMeasurement, SpeedTester,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Serializes tests that write and then exec scripts. A concurrent fork can
/// inherit the still-open write handle and make exec fail with ETXTBSY.
pub static PROCESS_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

pub const MB: f64 = 1024.0 * 1024.0;

pub struct StubProbe {
    reachable: Vec<String>,
    missing_tool: bool,
    calls: Mutex<Vec<String>>,
}

impl StubProbe {
    pub fn reachable(hosts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            reachable: hosts.iter().map(|h| h.to_string()).collect(),
            missing_tool: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn tool_missing() -> Arc<Self> {
        Arc::new(Self {
            reachable: Vec::new(),
            missing_tool: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkProbe for StubProbe {
    async fn probe(&self, host: &str, _port: u16) -> ProbeOutcome {
        self.calls.lock().unwrap().push(host.to_string());
        if self.missing_tool {
            ProbeOutcome::Unavailable(MissingTool::new("nmap", "Run 'sudo apt install nmap'."))
        } else if self.reachable.iter().any(|h| h == host) {
            ProbeOutcome::Reachable
        } else {
            ProbeOutcome::Unreachable
        }
    }
}

pub struct StubMetered {
    state: MeteredState,
    calls: AtomicUsize,
}

impl StubMetered {
    pub fn new(state: MeteredState) -> Arc<Self> {
        Arc::new(Self {
            state,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeteredConnection for StubMetered {
    async fn check(&self) -> MeteredState {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.state
    }
}

pub struct StubSpeed {
    measurement: SpeedMeasurement,
    calls: AtomicUsize,
}

impl StubSpeed {
    pub fn new(measurement: SpeedMeasurement) -> Arc<Self> {
        Arc::new(Self {
            measurement,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn mb_per_sec(mb: f64) -> Arc<Self> {
        Self::new(SpeedMeasurement::Measured {
            upload_bytes_per_sec: mb * MB,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeedTester for StubSpeed {
    async fn measure_upload(&self) -> SpeedMeasurement {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.measurement.clone()
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn notifier(channel: &Arc<RecordingChannel>) -> Notifier {
    Notifier::new(Some(channel.clone()))
}

/// Configuration rooted in `dir`, with a home and a timeshift job.
pub fn test_config(dir: &Path, rsync_binary: &Path) -> AppConfig {
    AppConfig {
        ssh_user: "backup".to_string(),
        port: 873,
        servers: vec!["192.168.1.10".to_string()],
        target_folder: "mirror".to_string(),
        log_file: dir.join("rsync_timeshift.log"),
        min_upload_speed_in_mb: 5.0,
        probe_method: Default::default(),
        probe_timeout_secs: 1,
        rsync_binary: rsync_binary.display().to_string(),
        speedtest_binary: "speedtest".to_string(),
        notification_channel: Default::default(),
        slack_webhook: None,
        jobs: vec![
            MirrorJob::new("home", "🏡", &dir.join("home").display().to_string())
                .with_exclude(["*.cache*"]),
            MirrorJob::new("timeshift", "⏳️", &dir.join("timeshift").display().to_string()),
        ],
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub probe: Arc<StubProbe>,
    pub metered: Arc<StubMetered>,
    pub speed: Arc<StubSpeed>,
    pub channel: Arc<RecordingChannel>,
}

impl Harness {
    pub fn new(
        config: AppConfig,
        probe: Arc<StubProbe>,
        metered: Arc<StubMetered>,
        speed: Arc<StubSpeed>,
    ) -> Self {
        let channel = RecordingChannel::new();
        let ctx = AppContext::with_collaborators(
            config,
            notifier(&channel),
            probe.clone(),
            metered.clone(),
            speed.clone(),
        );
        Self {
            ctx,
            probe,
            metered,
            speed,
            channel,
        }
    }

    /// Private server, unmetered, fast uplink.
    pub fn on_lan(config: AppConfig) -> Self {
        Self::new(
            config,
            StubProbe::reachable(&["192.168.1.10"]),
            StubMetered::new(MeteredState::Unmetered),
            StubSpeed::mb_per_sec(50.0),
        )
    }
}

/// Write an executable `/bin/sh` script standing in for rsync.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub fn set_age(path: &Path, age: Duration) -> SystemTime {
    let mtime = SystemTime::now() - age;
    filetime::set_file_mtime(path, filetime::FileTime::from_system_time(mtime)).unwrap();
    std::fs::metadata(path).unwrap().modified().unwrap()
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}
