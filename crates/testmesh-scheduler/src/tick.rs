//! The scheduler tick loop (spec §4.8), grounded on the teacher's
//! `CronScheduler::check_and_execute` polling shape: load due schedules,
//! apply overlap policy, run the flow, apply retry policy on failure.

use crate::cron_expr::next_fire;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use testmesh_domain::{
    ExecutionRepository, ExecutionStatus, FlowRepository, OverlapPolicy, Schedule,
    ScheduleRepository, ScheduleRun, ScheduleRunId, ScheduleRunResult, ScheduleStatus,
};
use testmesh_foundation::{BuiltinSource, Error, Result};
use testmesh_runtime::FlowRuntime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Scheduler {
    schedules: Arc<dyn ScheduleRepository>,
    executions: Arc<dyn ExecutionRepository>,
    flows: Arc<dyn FlowRepository>,
    runtime: Arc<FlowRuntime>,
    builtins: Arc<dyn BuiltinSource>,
}

impl Scheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        executions: Arc<dyn ExecutionRepository>,
        flows: Arc<dyn FlowRepository>,
        runtime: Arc<FlowRuntime>,
        builtins: Arc<dyn BuiltinSource>,
    ) -> Self {
        Self { schedules, executions, flows, runtime, builtins }
    }

    /// Runs [`Self::tick`] on a fixed interval until `cancel` fires,
    /// mirroring the teacher's `CronScheduler` background loop.
    pub async fn run(&self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler loop cancelled");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// One pass: fire every due, enabled schedule, then advance its
    /// `next_run_at`. Each schedule's failure is isolated from the rest.
    pub async fn tick(&self) -> Result<()> {
        let now = self.builtins.now();
        let due = self.schedules.list_due(now).await?;
        for schedule in due {
            if schedule.status != ScheduleStatus::Active {
                continue;
            }
            if let Err(err) = self.fire(schedule).await {
                error!(error = %err, "schedule fire failed");
            }
        }
        Ok(())
    }

    async fn fire(&self, mut schedule: Schedule) -> Result<()> {
        let scheduled_for = schedule.next_run_at.unwrap_or_else(|| self.builtins.now());

        if schedule.overlap_policy == OverlapPolicy::Skip {
            if let Some(latest) = self.schedules.latest_run(schedule.id).await? {
                if matches!(latest.result, ScheduleRunResult::Pending) {
                    warn!(schedule_id = %schedule.id, "skipping fire: previous run still pending");
                    let skipped = ScheduleRun {
                        id: ScheduleRunId::new(),
                        schedule_id: schedule.id,
                        execution_id: None,
                        scheduled_for,
                        started_at: None,
                        finished_at: Some(self.builtins.now()),
                        result: ScheduleRunResult::Skipped,
                        retry_count: 0,
                    };
                    self.schedules.put_run(skipped).await?;
                    self.advance(&mut schedule, scheduled_for).await?;
                    return Ok(());
                }
            }
        }

        let result = self.run_with_retries(&schedule, scheduled_for).await?;
        schedule.last_run_at = Some(scheduled_for);
        schedule.last_run_result = Some(result);
        self.advance(&mut schedule, scheduled_for).await
    }

    async fn run_with_retries(
        &self,
        schedule: &Schedule,
        scheduled_for: chrono::DateTime<chrono::Utc>,
    ) -> Result<ScheduleRunResult> {
        let flow = self
            .flows
            .get(schedule.flow_id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown flow: {}", schedule.flow_id)))?;

        let mut run = ScheduleRun {
            id: ScheduleRunId::new(),
            schedule_id: schedule.id,
            execution_id: None,
            scheduled_for,
            started_at: Some(self.builtins.now()),
            finished_at: None,
            result: ScheduleRunResult::Pending,
            retry_count: 0,
        };
        self.schedules.put_run(run.clone()).await?;

        loop {
            let execution = self
                .runtime
                .execute(&flow, BTreeMap::new(), CancellationToken::new())
                .await?;
            run.execution_id = Some(execution.id);
            let succeeded = execution.status == ExecutionStatus::Succeeded;
            self.executions.put(execution).await?;

            if succeeded {
                run.result = ScheduleRunResult::Succeeded;
                run.finished_at = Some(self.builtins.now());
                self.schedules.put_run(run).await?;
                if schedule.notify_on_success {
                    info!(schedule_id = %schedule.id, "notify: schedule run succeeded");
                }
                return Ok(ScheduleRunResult::Succeeded);
            }

            if run.retry_count >= schedule.max_retries {
                run.result = ScheduleRunResult::Failed;
                run.finished_at = Some(self.builtins.now());
                self.schedules.put_run(run).await?;
                if schedule.notify_on_failure {
                    warn!(schedule_id = %schedule.id, "notify: schedule run failed");
                }
                return Ok(ScheduleRunResult::Failed);
            }

            run.retry_count += 1;
            self.schedules.put_run(run.clone()).await?;
            tokio::time::sleep(Duration::from_millis(schedule.retry_delay_ms)).await;
        }
    }

    /// `next_run_at` must land strictly after `max(now, last_run_at)` (spec
    /// §3, §8's invariant), not just after `fired_at` — a schedule whose
    /// fire was delayed past its next natural fire time must skip ahead
    /// rather than re-fire immediately.
    async fn advance(&self, schedule: &mut Schedule, fired_at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let now = self.builtins.now();
        let floor = schedule.last_run_at.map_or(now, |last_run_at| last_run_at.max(now)).max(fired_at);
        schedule.next_run_at = Some(next_fire(&schedule.cron_expr, &schedule.timezone, floor)?);
        self.schedules.put(schedule.clone()).await
    }
}
