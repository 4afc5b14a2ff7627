//! `FlowRuntime`: the public entry point (spec §4.3's "ExecuteFlow(flow,
//! overrides, cancellation) → ExecutionResult").

use crate::dag::{ready_steps, validate};
use crate::ports::Ports;
use crate::step::execute_step;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use testmesh_actions::{ActionRegistry, FlowRunner};
use testmesh_domain::{
    Execution, ExecutionStatus, Flow, FlowId, FlowRepository, StepStatus, Value,
};
use testmesh_expr::{ScopeKind, VariableStore};
use testmesh_foundation::{BuiltinSource, Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Drives a single [`Flow`] to completion: dependency-ordered top-level
/// step execution, `setup`/`teardown` handling, and Execution bookkeeping.
pub struct FlowRuntime {
    flows: Arc<dyn FlowRepository>,
    registry: Arc<ActionRegistry>,
    builtins: Arc<dyn BuiltinSource>,
    ports: Ports,
}

impl FlowRuntime {
    pub fn new(flows: Arc<dyn FlowRepository>, builtins: Arc<dyn BuiltinSource>, ports: Ports) -> Self {
        Self {
            flows,
            registry: Arc::new(ActionRegistry::with_builtins()),
            builtins,
            ports,
        }
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub async fn execute(
        &self,
        flow: &Flow,
        overrides: BTreeMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<Execution> {
        validate(&flow.definition.steps)?;

        let mut store = VariableStore::new(self.builtins.clone());
        store.seed(ScopeKind::FlowInitial, flow.definition.variables.clone());
        store.seed(ScopeKind::ExecutionOverride, overrides);

        let started_at = self.builtins.now();
        let mut execution = Execution::new(flow.id, started_at);

        if !flow.definition.setup.is_empty() {
            let mut setup_trace = Vec::new();
            for step in &flow.definition.setup {
                let status = execute_step(step, &mut store, &cancel, &self.registry, &self.ports, &mut setup_trace).await;
                execution.record_outermost_step(status);
                if status == StepStatus::Failed {
                    execution.steps.extend(setup_trace);
                    self.run_teardown(flow, &mut store, &cancel, &mut execution).await;
                    execution.status = ExecutionStatus::Failed;
                    execution.finished_at = Some(self.builtins.now());
                    execution.variables = store.snapshot().into_iter().collect();
                    return Ok(execution);
                }
            }
            execution.steps.extend(setup_trace);
        }

        let status = self.run_dag(&flow.definition.steps, &mut store, &cancel, &mut execution).await;
        self.run_teardown(flow, &mut store, &cancel, &mut execution).await;

        execution.status = if cancel.is_cancelled() {
            ExecutionStatus::Cancelled
        } else {
            status
        };
        execution.finished_at = Some(self.builtins.now());
        execution.variables = store.snapshot().into_iter().collect();
        Ok(execution)
    }

    async fn run_dag(
        &self,
        steps: &[testmesh_domain::Step],
        store: &mut VariableStore,
        cancel: &CancellationToken,
        execution: &mut Execution,
    ) -> ExecutionStatus {
        let mut completed = HashSet::new();
        let in_flight = HashSet::new();
        let mut overall_failed = false;

        while completed.len() < steps.len() {
            let ready = ready_steps(steps, &completed, &in_flight);
            if ready.is_empty() {
                warn!("flow DAG made no progress with {} steps remaining", steps.len() - completed.len());
                break;
            }
            // Sequential dispatch: concurrency within a level is expressed
            // by explicit `parallel`/`for_each` steps, not by the DAG
            // scheduler itself (spec §4.3 leaves inter-sibling ordering
            // unspecified only inside those constructs).
            for step in ready {
                if cancel.is_cancelled() {
                    overall_failed = true;
                    execution.record_outermost_step(StepStatus::Cancelled);
                    completed.insert(step.id.clone());
                    continue;
                }
                let status = execute_step(step, store, cancel, &self.registry, &self.ports, &mut execution.steps).await;
                execution.record_outermost_step(status);
                if status == StepStatus::Failed {
                    overall_failed = true;
                }
                completed.insert(step.id.clone());
            }
        }

        if overall_failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        }
    }

    async fn run_teardown(
        &self,
        flow: &Flow,
        store: &mut VariableStore,
        cancel: &CancellationToken,
        execution: &mut Execution,
    ) {
        if flow.definition.teardown.is_empty() {
            return;
        }
        // A fresh, shorter-lived scope: teardown must still run after the
        // parent was cancelled (spec §5).
        let teardown_cancel = CancellationToken::new();
        let _ = cancel;
        for step in &flow.definition.teardown {
            let status = execute_step(step, store, &teardown_cancel, &self.registry, &self.ports, &mut execution.steps).await;
            execution.record_outermost_step(status);
            if status == StepStatus::Failed {
                info!(step_id = %step.id, "teardown step failed; execution status unaffected beyond failed");
            }
        }
    }
}

/// Adapts `FlowRuntime` to the `run_flow` action's port, loading the
/// referenced flow from the repository and executing it in a child scope
/// (spec §4.3: "load the referenced Flow, execute it in a child Variable
/// Store seeded with inputs, merge its declared outputs back into the
/// caller").
#[async_trait]
impl FlowRunner for FlowRuntime {
    async fn run_flow(
        &self,
        flow_id: &str,
        inputs: BTreeMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<BTreeMap<String, Value>> {
        let id: FlowId = flow_id
            .parse()
            .map_err(|_| Error::config_invalid(format!("invalid flow id: {flow_id}")))?;
        let flow = self
            .flows
            .get(id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown flow: {flow_id}")))?;
        let execution = self.execute(&flow, inputs, cancel).await?;
        if execution.status != ExecutionStatus::Succeeded {
            return Err(Error::action_error(format!(
                "sub-flow {flow_id} did not succeed: {:?}",
                execution.status
            )));
        }
        Ok(execution.variables)
    }
}
