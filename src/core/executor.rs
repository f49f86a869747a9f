use anyhow::{Context, Result, anyhow};
use std::io::{self, ErrorKind};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info, info_span, warn};

use super::models::{JobOutcome, MirrorJob};
use super::notifications::Notifier;
use super::progress::{ProgressEvent, status_line};
use super::status_log::StatusLog;
use crate::config::AppConfig;
use crate::logging::LogThrottle;

/// Parsed events buffered between the stdout reader and the status writer
const EVENT_BUFFER: usize = 64;

const READ_CHUNK: usize = 8 * 1024;

/// Largest stderr tail kept per job; the head of a long error stream is dropped
const STDERR_TAIL: usize = 64 * 1024;

/// Runs one rsync mirror job and keeps the status log in step with its output.
pub struct MirrorExecutor {
    config: Arc<AppConfig>,
    notifier: Notifier,
    status_log: StatusLog,
}

impl MirrorExecutor {
    pub fn new(config: Arc<AppConfig>, notifier: Notifier, status_log: StatusLog) -> Self {
        Self {
            config,
            notifier,
            status_log,
        }
    }

    /// Arguments passed to rsync for `job` against `server`.
    pub fn command_args(&self, job: &MirrorJob, server: &str) -> Vec<String> {
        let config = &self.config;
        let mut args = vec![
            "-e".to_string(),
            format!("ssh -l {} -p {}", config.ssh_user, config.port),
            "--info=name0,del0,progress2".to_string(),
            "--progress".to_string(),
            "--inplace".to_string(),
            "--links".to_string(),
            "--hard-links".to_string(),
            "--archive".to_string(),
            "--human-readable".to_string(),
            "--verbose".to_string(),
            "--no-inc-recursive".to_string(),
            "--delete".to_string(),
            "--delete-excluded".to_string(),
            "--prune-empty-dirs".to_string(),
        ];
        args.extend(job.exclude.iter().map(|pattern| format!("--exclude={}", pattern)));
        args.push(job.source.clone());
        args.push(format!(
            "{}@{}::{}",
            config.ssh_user, server, config.target_folder
        ));
        args
    }

    pub async fn run(&self, job: &MirrorJob, server: &str) -> JobOutcome {
        let span = info_span!("mirror_job", job = %job.name, source = %job.source, server);
        self.run_job(job, server).instrument(span).await
    }

    async fn run_job(&self, job: &MirrorJob, server: &str) -> JobOutcome {
        let args = self.command_args(job, server);

        self.notifier
            .info(format!("Backup started: {}", job.source))
            .await;

        let child = match Command::new(&self.config.rsync_binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.notifier
                    .critical(
                        format!(
                            "Skipping backup: {} is not installed.",
                            self.config.rsync_binary
                        ),
                        Some("Run 'sudo apt install rsync'.".to_string()),
                    )
                    .await;
                return JobOutcome::Failed {
                    exit_code: None,
                    stderr: e.to_string(),
                };
            }
            Err(e) => {
                let detail = format!("Failed to spawn {}: {}", self.config.rsync_binary, e);
                self.notifier
                    .error(format!("Backup failed: {}", job.source), Some(detail.clone()))
                    .await;
                return JobOutcome::Failed {
                    exit_code: None,
                    stderr: detail,
                };
            }
        };

        info!("rsync started");

        match self.drive(job, child).await {
            Ok((status, _)) if status.success() => {
                info!("Mirror job complete");
                JobOutcome::Succeeded
            }
            Ok((status, stderr)) => {
                let detail = stderr.trim();
                self.notifier
                    .error(
                        format!("Backup failed: {}", job.source),
                        (!detail.is_empty()).then(|| detail.to_string()),
                    )
                    .await;
                JobOutcome::Failed {
                    exit_code: status.code(),
                    stderr,
                }
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                self.notifier
                    .error(format!("Backup failed: {}", job.source), Some(detail.clone()))
                    .await;
                JobOutcome::Failed {
                    exit_code: None,
                    stderr: detail,
                }
            }
        }
    }

    /// Drain stdout and stderr while waiting for exit, each on its own task.
    ///
    /// The stdout reader feeds parsed events through a channel; this task
    /// writes each one to the status log. Nothing here waits on the child
    /// before its pipes are drained. If either pipe cannot be read the child
    /// is killed and reaped before returning, so no transfer outlives its job.
    async fn drive(
        &self,
        job: &MirrorJob,
        mut child: tokio::process::Child,
    ) -> Result<(ExitStatus, String)> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to get stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Failed to get stderr"))?;

        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(pump_progress(stdout, tx));
        let stderr_reader = tokio::spawn(collect_output(stderr));
        let stderr_abort = stderr_reader.abort_handle();
        let (kill_tx, waiter) = spawn_waiter(child);

        while let Some(event) = rx.recv().await {
            let line = status_line(&job.icon, &event);
            if let Err(e) = self.status_log.write(&line).await {
                warn!(error = %e, "Failed to update status log");
            }
        }

        let drained = async {
            let events = reader.await.context("stdout reader panicked")??;
            let stderr = stderr_reader.await.context("stderr reader panicked")??;
            Ok::<_, anyhow::Error>((events, stderr))
        }
        .await;

        let (events, stderr) = match drained {
            Ok(drained) => drained,
            Err(e) => {
                stderr_abort.abort();
                let _ = kill_tx.send(());
                match waiter.await {
                    Ok(Ok(status)) => warn!(%status, "rsync stopped after output failure"),
                    _ => warn!("Could not confirm rsync stopped"),
                }
                return Err(e);
            }
        };

        let status = waiter
            .await
            .context("process waiter panicked")?
            .context("Failed to wait for rsync")?;

        debug!(events, %status, "rsync exited");
        Ok((status, stderr))
    }
}

/// Await the child's exit on its own task. Sending on the returned channel
/// kills the child first; dropping the sender leaves it running.
fn spawn_waiter(
    mut child: Child,
) -> (oneshot::Sender<()>, JoinHandle<io::Result<ExitStatus>>) {
    let (kill_tx, kill_rx) = oneshot::channel();
    let waiter = tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => status,
            Ok(()) = kill_rx => {
                let _ = child.start_kill();
                child.wait().await
            }
        }
    });
    (kill_tx, waiter)
}

/// Split `reader` into lines on `\n` or `\r` and forward the recognised ones.
///
/// rsync redraws progress in place with carriage returns, so `\r` has to end a
/// line too. The reader keeps draining after the receiver goes away so the
/// child never blocks on a full pipe.
async fn pump_progress<R>(mut reader: R, tx: mpsc::Sender<ProgressEvent>) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let throttle = LogThrottle::new(Duration::from_secs(5));
    let mut line_buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut events = 0u64;
    let mut forwarding = true;

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .context("Failed to read rsync output")?;
        if n == 0 {
            break;
        }

        for &b in &chunk[..n] {
            if b != b'\r' && b != b'\n' {
                line_buffer.push(b);
                continue;
            }
            if line_buffer.is_empty() {
                continue;
            }
            if let Some(event) = take_line(&mut line_buffer, &throttle) {
                events += 1;
                if forwarding && tx.send(event).await.is_err() {
                    forwarding = false;
                }
            }
        }
    }

    if !line_buffer.is_empty() {
        if let Some(event) = take_line(&mut line_buffer, &throttle) {
            events += 1;
            if forwarding {
                let _ = tx.send(event).await;
            }
        }
    }

    Ok(events)
}

fn take_line(line_buffer: &mut Vec<u8>, throttle: &LogThrottle) -> Option<ProgressEvent> {
    let line = String::from_utf8_lossy(line_buffer).into_owned();
    line_buffer.clear();
    if throttle.should_log() {
        debug!(line = %line.trim(), "rsync output");
    }
    ProgressEvent::parse(&line)
}

async fn collect_output<R>(mut reader: R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .context("Failed to read rsync stderr")?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > 2 * STDERR_TAIL {
            buffer.drain(..buffer.len() - STDERR_TAIL);
        }
    }

    if buffer.len() > STDERR_TAIL {
        buffer.drain(..buffer.len() - STDERR_TAIL);
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
