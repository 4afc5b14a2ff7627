//! Execution records: the runtime's account of one flow run (spec §3, §4.3).

use crate::{ExecutionId, FlowId, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One run of a [`crate::Flow`], including the per-step trace the runtime
/// accumulates as it walks the DAG.
#[derive(Debug, Clone)]
pub struct Execution {
    pub id: ExecutionId,
    pub flow_id: FlowId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<ExecutionStep>,
    /// Final snapshot of the flow-scoped variable tier, exposed for
    /// debugging and for `run_flow` actions that read a sub-flow's outputs.
    pub variables: BTreeMap<String, Value>,
    /// Outermost-step outcome counts (spec §3, §8: `total_steps =
    /// passed_steps + failed_steps + skipped_steps`, counting only
    /// outermost steps — nested control-flow children don't contribute).
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
}

impl Execution {
    pub fn new(flow_id: FlowId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: ExecutionId::new(),
            flow_id,
            status: ExecutionStatus::Running,
            started_at,
            finished_at: None,
            steps: Vec::new(),
            variables: BTreeMap::new(),
            total_steps: 0,
            passed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Folds one outermost step's terminal [`StepStatus`] into the
    /// counters (spec §3, §8). Cancelled steps never ran their body, so
    /// they're counted as skipped rather than failed.
    pub fn record_outermost_step(&mut self, status: StepStatus) {
        self.total_steps += 1;
        match status {
            StepStatus::Succeeded => self.passed_steps += 1,
            StepStatus::Skipped | StepStatus::Cancelled => self.skipped_steps += 1,
            StepStatus::Failed | StepStatus::Pending | StepStatus::Running => self.failed_steps += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

/// The record of one step's dispatch, including retry attempts (spec §4.3:
/// "the runtime records every attempt, not just the last").
#[derive(Debug, Clone)]
pub struct ExecutionStep {
    pub step_id: String,
    /// The step's `name`, carried alongside `step_id` so consumers like the
    /// Contract Generator (spec §4.5) don't need to look the Step back up
    /// in the Flow definition.
    pub name: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}
