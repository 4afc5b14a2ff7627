//! Single-step execution protocol (spec §4.3's seven-step procedure) and
//! the recursive dispatch of control-flow constructs.

use crate::ports::Ports;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use testmesh_actions::{Action, ActionContext, ActionRegistry, StepResult};
use testmesh_domain::{
    Condition, ControlFlow, ExecutionStep, ForEach, Parallel, Step, StepBody, StepStatus, Value,
    WaitUntil,
};
use testmesh_expr::{Expr, ScopeKind, VariableStore};
use testmesh_foundation::{Error, Result};
use tokio_util::sync::CancellationToken;

static BARE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute one step end to end (guard, retries, timeout, assertions, output
/// mapping), recording every attempt into `trace` (spec §4.3: "the runtime
/// records every attempt, not just the last").
pub fn execute_step<'a>(
    step: &'a Step,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, StepStatus> {
    Box::pin(execute_step_inner(step, store, cancel, registry, ports, trace))
}

async fn execute_step_inner(
    step: &Step,
    store: &mut VariableStore,
    cancel: &CancellationToken,
    registry: &Arc<ActionRegistry>,
    ports: &Ports,
    trace: &mut Vec<ExecutionStep>,
) -> StepStatus {
    if let Some(when) = &step.when {
        match Expr::parse(when).and_then(|e| e.evaluate_bool(store)) {
            Ok(true) => {}
            Ok(false) => {
                trace.push(skipped_record(&step.id, &step.name));
                return StepStatus::Skipped;
            }
            Err(err) => {
                trace.push(failed_record(&step.id, &step.name, 1, &err));
                return StepStatus::Failed;
            }
        }
    }

    let max_attempts = step.retry.as_ref().map_or(1, |r| r.max_attempts.max(1));
    let backoff = step.retry.as_ref().map(|r| r.backoff.clone()).unwrap_or_default();

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            trace.push(failed_record(&step.id, &step.name, attempt, &Error::Cancelled));
            return StepStatus::Failed;
        }

        store.push_frame();
        let started_at = Utc::now();
        let outcome = run_attempt(step, store, cancel, registry, ports, trace).await;

        match outcome {
            Ok(named_outputs) => {
                // Output expressions may reference fields the attempt bound into
                // this frame (e.g. `response.body.id`), so map outputs before
                // popping it.
                apply_output_mapping(step, store, &named_outputs);
                store.pop_frame();
                trace.push(ExecutionStep {
                    step_id: step.id.clone(),
                    name: step.name.clone(),
                    status: StepStatus::Succeeded,
                    attempts: attempt,
                    started_at,
                    finished_at: Some(Utc::now()),
                    output: Some(Value::Object(named_outputs.into_iter().collect())),
                    error: None,
                });
                return StepStatus::Succeeded;
            }
            Err(err) => {
                store.pop_frame();
                let retriable = err.is_retriable() && attempt < max_attempts;
                if retriable {
                    trace.push(ExecutionStep {
                        step_id: step.id.clone(),
                        name: step.name.clone(),
                        status: StepStatus::Failed,
                        attempts: attempt,
                        started_at,
                        finished_at: Some(Utc::now()),
                        output: None,
                        error: Some(err.to_string()),
                    });
                    tokio::select! {
                        () = tokio::time::sleep(backoff.delay_for(attempt - 1)) => {}
                        () = cancel.cancelled() => {
                            trace.push(failed_record(&step.id, &step.name, attempt, &Error::Cancelled));
                            return StepStatus::Failed;
                        }
                    }
                    continue;
                }
                trace.push(ExecutionStep {
                    step_id: step.id.clone(),
                    name: step.name.clone(),
                    status: StepStatus::Failed,
                    attempts: attempt,
                    started_at,
                    finished_at: Some(Utc::now()),
                    output: None,
                    error: Some(err.to_string()),
                });
                return StepStatus::Failed;
            }
        }
    }
    unreachable!("retry loop always returns")
}

/// Run one attempt: dispatch the body, bind its output fields into the
/// current frame, then evaluate `assert[]` (spec §4.3 steps 4-5).
fn run_attempt<'a>(
    step: &'a Step,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<BTreeMap<String, Value>>> {
    Box::pin(async move {
        let result = match &step.body {
            StepBody::Action { action, params } => {
                let handler = registry.get(action)?;
                dispatch_action(handler.as_ref(), params, store, cancel, ports, step.timeout_ms).await?
            }
            StepBody::Control(control) => dispatch_control(control, store, cancel, registry, ports, trace).await?,
        };

        for (name, value) in &result.output {
            store.bind_in_current_frame(name.clone(), value.clone());
        }

        for assertion in &step.assert {
            let expr = Expr::parse(assertion)?;
            if !expr.evaluate_bool(store)? {
                return Err(Error::assertion_failed(assertion));
            }
        }

        Ok(result.output)
    })
}

async fn dispatch_action(
    action: &dyn Action,
    params: &BTreeMap<String, Value>,
    store: &mut VariableStore,
    cancel: &CancellationToken,
    ports: &Ports,
    timeout_ms: Option<u64>,
) -> Result<StepResult> {
    let config = Value::Object(params.clone().into_iter().collect());
    let mut ctx = ActionContext {
        store,
        cancel: cancel.child_token(),
        http_client: ports.http_client(),
        mock_control: ports.mock_control.clone(),
        contract_control: ports.contract_control.clone(),
        kafka_client: ports.kafka_client.clone(),
        database_client: ports.database_client.clone(),
        flow_runner: ports.flow_runner.clone(),
    };

    match timeout_ms {
        Some(ms) if ms > 0 => {
            tokio::time::timeout(std::time::Duration::from_millis(ms), action.execute(&config, &mut ctx))
                .await
                .map_err(|_| Error::Timeout { elapsed_ms: ms })?
        }
        _ => action.execute(&config, &mut ctx).await,
    }
}

fn dispatch_control<'a>(
    control: &'a ControlFlow,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<StepResult>> {
    Box::pin(async move {
        match control {
            ControlFlow::Condition(condition) => run_condition(condition, store, cancel, registry, ports, trace).await,
            ControlFlow::Parallel(parallel) => run_parallel(parallel, store, cancel, registry, ports, trace).await,
            ControlFlow::ForEach(for_each) => run_for_each(for_each, store, cancel, registry, ports, trace).await,
            ControlFlow::WaitUntil(wait_until) => run_wait_until(wait_until, store, cancel, registry, ports, trace).await,
        }
    })
}

fn run_condition<'a>(
    condition: &'a Condition,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<StepResult>> {
    Box::pin(async move {
        let branch_true = Expr::parse(&condition.expression)?.evaluate_bool(store)?;
        let branch = if branch_true { &condition.then } else { &condition.or_else };
        run_sequence(branch, store, cancel, registry, ports, trace).await?;
        Ok(StepResult::default())
    })
}

/// Run a nested step list in declaration order. Nested lists are not DAGs
/// (spec §3: the Step graph is a tree once control-flow steps are counted
/// as parents of their nested steps) — only the flow's top-level step list
/// honors `depends_on`. Attempts run under nested steps are appended to
/// `trace` alongside the flow's top-level steps, flattened (spec §4.3: "the
/// runtime records every attempt").
fn run_sequence<'a>(
    steps: &'a [Step],
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for step in steps {
            let status = execute_step(step, store, cancel, registry, ports, trace).await;
            if status == StepStatus::Failed {
                return Err(Error::action_error(format!("nested step {} failed", step.id)));
            }
        }
        Ok(())
    })
}

fn run_parallel<'a>(
    parallel: &'a Parallel,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<StepResult>> {
    Box::pin(async move {
        let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(parallel.max_concurrent.max(1)));
        let branch_cancel = cancel.child_token();
        let mut set = tokio::task::JoinSet::new();

        for branch in &parallel.branches {
            let permit = semaphore.clone();
            let mut branch_store = store.fork();
            let branch_cancel = branch_cancel.child_token();
            let steps = branch.clone();
            let registry = registry.clone();
            let ports = ports.clone();
            set.spawn(async move {
                let _permit = permit.acquire_owned().await;
                let mut branch_trace = Vec::new();
                let result = run_sequence(&steps, &mut branch_store, &branch_cancel, &registry, &ports, &mut branch_trace).await;
                (result, branch_trace)
            });
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((Ok(()), branch_trace)) => trace.extend(branch_trace),
                Ok((Err(err), branch_trace)) => {
                    trace.extend(branch_trace);
                    if parallel.fail_fast {
                        branch_cancel.cancel();
                    }
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(Error::action_error(format!("parallel branch panicked: {join_err}")));
                }
            }
            if !parallel.wait_for_all {
                break;
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(StepResult::default()),
        }
    })
}

fn run_for_each<'a>(
    for_each: &'a ForEach,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<StepResult>> {
    Box::pin(async move {
        let items = Expr::parse(&for_each.items)?.evaluate(store)?;
        let items = items
            .as_array()
            .ok_or_else(|| Error::config_invalid("for_each.items must evaluate to an array"))?
            .to_vec();

        if for_each.max_parallel <= 1 {
            for (index, item) in items.iter().enumerate() {
                store.push_frame();
                store.bind_in_current_frame(for_each.item_var.clone(), item.clone());
                store.bind_in_current_frame(format!("{}_index", for_each.item_var), Value::Num(index as f64));
                let result = run_sequence(&for_each.body, store, cancel, registry, ports, trace).await;
                store.pop_frame();
                if let Err(err) = result {
                    if for_each.fail_fast {
                        return Err(err);
                    }
                }
            }
            return Ok(StepResult::default());
        }

        let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(for_each.max_parallel));
        let mut set = tokio::task::JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let permit = semaphore.clone();
            let mut branch_store = store.fork();
            branch_store.push_frame();
            branch_store.bind_in_current_frame(for_each.item_var.clone(), item);
            branch_store.bind_in_current_frame(format!("{}_index", for_each.item_var), Value::Num(index as f64));
            let steps = for_each.body.clone();
            let cancel = cancel.child_token();
            let registry = registry.clone();
            let ports = ports.clone();
            set.spawn(async move {
                let _permit = permit.acquire_owned().await;
                let mut branch_trace = Vec::new();
                let result = run_sequence(&steps, &mut branch_store, &cancel, &registry, &ports, &mut branch_trace).await;
                (result, branch_trace)
            });
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            if let Ok((result, branch_trace)) = joined {
                trace.extend(branch_trace);
                if let Err(err) = result {
                    first_error.get_or_insert(err);
                    if for_each.fail_fast {
                        break;
                    }
                }
            }
        }
        match first_error {
            Some(err) if for_each.fail_fast => Err(err),
            _ => Ok(StepResult::default()),
        }
    })
}

fn run_wait_until<'a>(
    wait_until: &'a WaitUntil,
    store: &'a mut VariableStore,
    cancel: &'a CancellationToken,
    registry: &'a Arc<ActionRegistry>,
    ports: &'a Ports,
    trace: &'a mut Vec<ExecutionStep>,
) -> BoxFuture<'a, Result<StepResult>> {
    Box::pin(async move {
        let expr = Expr::parse(&wait_until.condition)?;
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(wait_until.wait_timeout_ms);

        loop {
            if expr.evaluate_bool(store)? {
                if !wait_until.steps.is_empty() {
                    run_sequence(&wait_until.steps, store, cancel, registry, ports, trace).await?;
                }
                return Ok(StepResult::default());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout {
                    elapsed_ms: wait_until.wait_timeout_ms,
                });
            }
            tokio::select! {
                () = tokio::time::sleep(std::time::Duration::from_millis(wait_until.poll_interval_ms)) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    })
}

/// Write the step's named outputs under `steps.<step_id>.*` and, for any
/// bare-identifier output expression, also as a top-level alias (spec §4.3
/// step 6).
fn apply_output_mapping(step: &Step, store: &mut VariableStore, named_outputs: &BTreeMap<String, Value>) {
    if step.output.is_empty() {
        return;
    }
    let mut produced = BTreeMap::new();
    for (name, expression) in &step.output {
        let value = match Expr::parse(expression).and_then(|e| e.evaluate(store)) {
            Ok(v) => v,
            Err(_) => named_outputs.get(expression).cloned().unwrap_or(Value::Null),
        };
        if BARE_IDENTIFIER.is_match(expression) {
            store.set(ScopeKind::StepOutput, name.clone(), value.clone());
        }
        produced.insert(name.clone(), value);
    }
    store.set(
        ScopeKind::StepOutput,
        step.id.clone(),
        Value::Object(produced.into_iter().collect()),
    );
}

fn skipped_record(step_id: &str, name: &str) -> ExecutionStep {
    ExecutionStep {
        step_id: step_id.to_string(),
        name: name.to_string(),
        status: StepStatus::Skipped,
        attempts: 0,
        started_at: Utc::now(),
        finished_at: Some(Utc::now()),
        output: None,
        error: None,
    }
}

fn failed_record(step_id: &str, name: &str, attempt: u32, err: &Error) -> ExecutionStep {
    ExecutionStep {
        step_id: step_id.to_string(),
        name: name.to_string(),
        status: StepStatus::Failed,
        attempts: attempt,
        started_at: Utc::now(),
        finished_at: Some(Utc::now()),
        output: None,
        error: Some(err.to_string()),
    }
}
