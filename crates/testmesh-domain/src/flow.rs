//! Flow definitions (spec §3, §4.3): the DAG of steps a Flow Runtime
//! executes. Step dependency wiring follows the `depends_on: Vec<String>`
//! shape the teacher's `request_chaining::ChainRequest` and
//! `scenarios::executor` both use.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, versioned flow. The runtime executes `definition`; `id`/`name`
/// are addressing metadata a repository persists alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: crate::FlowId,
    pub name: String,
    pub definition: Definition,
}

/// The DAG body of a flow: an ordered list of steps, executed in
/// dependency order rather than list order (spec §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definition {
    /// Run once, in order, before `steps[]`. An unrecoverable failure here
    /// aborts the flow without running `steps[]` (spec §4.3).
    #[serde(default)]
    pub setup: Vec<Step>,
    pub steps: Vec<Step>,
    /// Always attempted after `steps[]`, even when setup or a step failed;
    /// its own failures are recorded but never change the flow's terminal
    /// status beyond `failed` (spec §4.3).
    #[serde(default)]
    pub teardown: Vec<Step>,
    /// Initial values seeded into the flow-scoped variable tier before the
    /// first step runs (spec §4.1).
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
}

/// A single unit of DAG scheduling. Plain steps invoke one registered
/// action; a step may instead wrap a [`ControlFlow`] construct that itself
/// contains nested steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Guard expression; when it evaluates false the step is recorded
    /// `skipped` without invoking its body (spec §4.3 step 1).
    #[serde(default)]
    pub when: Option<String>,
    #[serde(flatten)]
    pub body: StepBody,
    /// Expression strings evaluated against the step's output after its
    /// body runs; any false/erroring entry fails the step (spec §4.3 step 5).
    #[serde(default)]
    pub assert: Vec<String>,
    /// `variable_name -> expression` lifting values out of the step result
    /// into the Variable Store (spec §4.3 step 6).
    #[serde(default)]
    pub output: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: Option<Retry>,
    pub timeout_ms: Option<u64>,
}

/// What a step actually does: dispatch a registered action, or run one of
/// the control-flow constructs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepBody {
    Action {
        action: String,
        #[serde(default)]
        params: BTreeMap<String, Value>,
    },
    Control(ControlFlow),
}

/// The non-linear constructs spec §4.3 requires beyond a flat action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlFlow {
    Condition(Condition),
    Parallel(Parallel),
    ForEach(ForEach),
    WaitUntil(WaitUntil),
}

/// Branch on `expression`; outputs from whichever branch ran are visible to
/// subsequent siblings (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub expression: String,
    #[serde(default)]
    pub then: Vec<Step>,
    #[serde(default)]
    pub or_else: Vec<Step>,
}

/// Run each branch's steps concurrently; the step completes once every
/// branch completes (or one fails, per spec §4.3's fail-fast rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parallel {
    pub branches: Vec<Vec<Step>>,
    #[serde(default = "Parallel::default_true")]
    pub wait_for_all: bool,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "Parallel::default_concurrency")]
    pub max_concurrent: usize,
}

impl Parallel {
    fn default_true() -> bool {
        true
    }

    fn default_concurrency() -> usize {
        usize::MAX
    }
}

/// Iterate `items` (a variable-store expression evaluating to an array),
/// binding each element to `item_var` and running `body` once per element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEach {
    pub items: String,
    pub item_var: String,
    pub body: Vec<Step>,
    /// Upper bound on concurrently in-flight iterations (spec §5).
    #[serde(default = "ForEach::default_concurrency")]
    pub max_parallel: usize,
    #[serde(default = "ForEach::default_true")]
    pub fail_fast: bool,
}

impl ForEach {
    fn default_concurrency() -> usize {
        1
    }

    fn default_true() -> bool {
        true
    }
}

/// Poll `condition` (an expression) every `poll_interval_ms` until it
/// evaluates truthy or `timeout_ms` elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitUntil {
    pub condition: String,
    pub poll_interval_ms: u64,
    /// Named distinctly from the step-level `timeout_ms` it is flattened
    /// alongside, since that field bounds the step's cancellation scope
    /// while this one is the poll's own give-up deadline (spec §4.3).
    pub wait_timeout_ms: u64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Retry policy attached to a step (spec §7's retriable-error propagation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retry {
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed { delay_ms: 0 }
    }
}

impl Backoff {
    /// Delay before the given retry attempt (1-indexed: the delay taken
    /// before the *second* overall attempt is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let ms = match self {
            Self::Fixed { delay_ms } => *delay_ms,
            Self::Exponential { base_ms, max_ms } => {
                base_ms.saturating_mul(1u64 << attempt.min(32)).min(*max_ms)
            }
        };
        std::time::Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_caps_at_max() {
        let backoff = Backoff::Exponential {
            base_ms: 100,
            max_ms: 500,
        };
        assert_eq!(backoff.delay_for(0).as_millis(), 100);
        assert_eq!(backoff.delay_for(1).as_millis(), 200);
        assert_eq!(backoff.delay_for(10).as_millis(), 500);
    }

    #[test]
    fn step_body_deserializes_action_and_control_variants() {
        let action_json = serde_json::json!({
            "id": "s1",
            "name": "log hi",
            "type": "action",
            "action": "log",
            "params": {"message": "hi"}
        });
        let step: Step = serde_json::from_value(action_json).unwrap();
        assert!(matches!(step.body, StepBody::Action { .. }));

        let wait_json = serde_json::json!({
            "id": "s2",
            "name": "wait for ready",
            "type": "control",
            "kind": "wait_until",
            "condition": "true",
            "poll_interval_ms": 10,
            "wait_timeout_ms": 100
        });
        let step: Step = serde_json::from_value(wait_json).unwrap();
        assert!(matches!(step.body, StepBody::Control(ControlFlow::WaitUntil(_))));
    }
}
