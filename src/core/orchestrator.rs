use anyhow::Result;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::core::{
    LinkQualityGate, MirrorExecutor, RunOutcome, RunScheduler, ServerSelector, StatusLog,
};

/// One run: scheduler gate, server selection, link gate, then every job in order.
///
/// The orchestrator is run-scoped. Its selector memoizes the chosen server, so
/// the gate and every job see the same point-in-time decision.
pub struct Orchestrator {
    ctx: AppContext,
    scheduler: RunScheduler,
    selector: ServerSelector,
    gate: LinkQualityGate,
    executor: MirrorExecutor,
    status_log: StatusLog,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        let config = ctx.config.clone();
        let status_log = StatusLog::new(&config.log_file);

        Self {
            scheduler: RunScheduler::new(&config.log_file),
            selector: ServerSelector::new(
                config.servers.clone(),
                config.port,
                ctx.probe.clone(),
                ctx.notifier.clone(),
            ),
            gate: LinkQualityGate::new(
                config.min_upload_speed_in_mb,
                ctx.metered.clone(),
                ctx.speed_test.clone(),
                ctx.notifier.clone(),
            ),
            executor: MirrorExecutor::new(config, ctx.notifier.clone(), status_log.clone()),
            status_log,
            ctx,
        }
    }

    /// Server chosen for this run, probing on first use.
    pub async fn selected_server(&self) -> Option<&str> {
        self.selector.select().await
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        let span = info_span!("run", run_id = %Uuid::now_v7());
        self.run_once().instrument(span).await
    }

    async fn run_once(&self) -> Result<RunOutcome> {
        if self.scheduler.should_skip_as_already_run().await {
            info!("Backup has been executed today already. Skipping.");
            return Ok(RunOutcome::AlreadyRanToday);
        }

        let Some(server) = self.selected_server().await else {
            self.ctx
                .notifier
                .network_error("Skipping backup: No backup server available")
                .await;
            return Ok(RunOutcome::NoServerAvailable);
        };

        if !self.gate.should_run(Some(server)).await {
            return Ok(RunOutcome::LinkRejected);
        }

        let sentinel = self.scheduler.snapshot().await;

        // A failed job does not stop the remaining ones; it only keeps the
        // sentinel stale so the next trigger retries the whole run.
        let mut failed = Vec::new();
        for job in &self.ctx.config.jobs {
            if !self.executor.run(job, server).await.is_success() {
                failed.push(job.name.clone());
            }
        }

        if !failed.is_empty() {
            warn!(failed = ?failed, "Run finished with failed jobs");
            self.scheduler.restore(sentinel).await?;
            return Ok(RunOutcome::JobsFailed { failed });
        }

        self.status_log.clear().await?;
        info!(jobs = self.ctx.config.jobs.len(), "All mirror jobs complete");
        Ok(RunOutcome::Completed)
    }
}
