//! Scheduler data model (spec §4.8): cron-driven flow triggers and the
//! history of their fires.

use crate::{ExecutionId, FlowId, ScheduleId, ScheduleRunId};
use chrono::{DateTime, Utc};

/// A cron-driven trigger binding a flow to a recurring fire time.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    pub flow_id: FlowId,
    pub cron_expr: String,
    /// IANA timezone name (e.g. `"America/New_York"`) the cron expression
    /// is interpreted in, per spec §4.8.
    pub timezone: String,
    pub status: ScheduleStatus,
    /// What to do if a fire time arrives while the previous run is still
    /// executing: skip this fire, or queue it to run immediately after.
    pub overlap_policy: OverlapPolicy,
    /// Invariant (spec §3, §8): when `status = Active`, always populated
    /// and the next fire time of `cron_expr` in `timezone` strictly after
    /// `max(now, last_run_at)`.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_result: Option<ScheduleRunResult>,
    /// Retries attempted on a terminal `failed` Execution before the
    /// ScheduleRun itself is marked `failed` (spec §4.8).
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub notify_on_success: bool,
    pub notify_on_failure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    Active,
    /// Holds `next_run_at` in place rather than clearing it, so resuming
    /// (flipping back to `Active`) doesn't need to recompute it unless a
    /// tick was missed in the meantime (spec §3).
    Paused,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    Skip,
    Queue,
}

/// One fire of a [`Schedule`], whether it ran, was skipped, or overlapped.
#[derive(Debug, Clone)]
pub struct ScheduleRun {
    pub id: ScheduleRunId,
    pub schedule_id: ScheduleId,
    pub execution_id: Option<ExecutionId>,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: ScheduleRunResult,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRunResult {
    Pending,
    Succeeded,
    Failed,
    Skipped,
    Overlapped,
}
