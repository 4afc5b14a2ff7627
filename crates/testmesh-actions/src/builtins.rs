//! Built-in Action kinds (spec §3's Action Registry row, §4.3's
//! control-flow/action list).

use crate::action::{Action, ActionContext, StepResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use testmesh_domain::Value;
use testmesh_expr::{Expr, VariableStore};
use testmesh_foundation::{Error, Result};

/// Recursively render `${...}`/`{{...}}` templates embedded in a config's
/// string leaves, leaving other value kinds untouched.
fn render_value(value: &Value, store: &VariableStore) -> Value {
    match value {
        Value::Str(s) => {
            let (rendered, _missing) = testmesh_expr::render(s, store);
            Value::Str(rendered)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, store)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, store)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn require_str<'a>(config: &'a Value, field: &str) -> Result<&'a str> {
    config
        .get_path(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid(format!("action config missing required field: {field}")))
}

fn str_map(config: &Value, field: &str) -> BTreeMap<String, String> {
    config
        .get_path(field)
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub struct HttpRequestAction;

#[async_trait]
impl Action for HttpRequestAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let method = require_str(&config, "method")?.to_uppercase();
        let url = require_str(&config, "url")?.to_string();
        let headers = str_map(&config, "headers");
        let query = str_map(&config, "query");
        let body = config.get_path("body").cloned();

        let http_method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| Error::config_invalid(format!("invalid HTTP method {method}: {e}")))?;
        let mut request = ctx.http_client.request(http_method, &url);
        for (k, v) in &headers {
            request = request.header(k, v);
        }
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = &body {
            request = request.json(&body.to_json());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::action_error_with_cause(format!("http_request to {url} failed"), e))?;

        let status = response.status().as_u16();
        let mut response_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers.insert(name.to_string(), v.to_string());
            }
        }
        let response_bytes = response
            .bytes()
            .await
            .map_err(|e| Error::action_error_with_cause("failed to read response body", e))?;
        let response_body: Value = serde_json::from_slice::<serde_json::Value>(&response_bytes)
            .map(Value::from)
            .unwrap_or_else(|_| Value::Str(String::from_utf8_lossy(&response_bytes).to_string()));

        let mut output = BTreeMap::new();
        output.insert("status".to_string(), Value::Num(status as f64));
        output.insert(
            "headers".to_string(),
            Value::Object(response_headers.into_iter().map(|(k, v)| (k, Value::Str(v))).collect()),
        );
        output.insert("body".to_string(), response_body.clone());
        // Recorded losslessly so the Contract Generator never has to guess
        // at request shape (spec.md's redesign note on `extractRequest`).
        output.insert("request_method".to_string(), Value::Str(method));
        output.insert("request_path".to_string(), Value::Str(url));
        output.insert(
            "request_headers".to_string(),
            Value::Object(headers.into_iter().map(|(k, v)| (k, Value::Str(v))).collect()),
        );
        if let Some(body) = body {
            output.insert("request_body".to_string(), body);
        }

        Ok(StepResult {
            output,
            raw: Some(response_body),
        })
    }
}

pub struct DatabaseQueryAction;

#[async_trait]
impl Action for DatabaseQueryAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let statement = require_str(&config, "statement")?;
        let params = config
            .get_path("params")
            .and_then(Value::as_array)
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        let client = ctx
            .database_client
            .as_ref()
            .ok_or_else(|| Error::action_error("no database client configured"))?;
        let rows = client.query(statement, &params).await?;
        let mut output = BTreeMap::new();
        output.insert("rows".to_string(), rows.clone());
        Ok(StepResult { output, raw: Some(rows) })
    }
}

pub struct DelayAction;

#[async_trait]
impl Action for DelayAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let duration_ms = config
            .get_path("duration_ms")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::config_invalid("delay action requires duration_ms"))?;
        tokio::select! {
            () = tokio::time::sleep(std::time::Duration::from_millis(duration_ms as u64)) => {
                Ok(StepResult::default())
            }
            () = ctx.cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let message = require_str(&config, "message")?;
        let level = config.get_path("level").and_then(Value::as_str).unwrap_or("info");
        match level {
            "warn" => tracing::warn!(target: "testmesh::flow", "{message}"),
            "error" => tracing::error!(target: "testmesh::flow", "{message}"),
            "debug" => tracing::debug!(target: "testmesh::flow", "{message}"),
            _ => tracing::info!(target: "testmesh::flow", "{message}"),
        }
        Ok(StepResult::default())
    }
}

pub struct AssertAction;

#[async_trait]
impl Action for AssertAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let expression = require_str(config, "expression")?;
        let expr = Expr::parse(expression)?;
        if expr.evaluate_bool(ctx.store)? {
            let mut output = BTreeMap::new();
            output.insert("result".to_string(), Value::Bool(true));
            Ok(StepResult::with_output(output))
        } else {
            Err(Error::assertion_failed(expression))
        }
    }
}

pub struct TransformAction;

#[async_trait]
impl Action for TransformAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let set = config
            .get_path("set")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::config_invalid("transform action requires a `set` mapping"))?;
        let mut output = BTreeMap::new();
        for (name, expression) in set {
            let expression = expression
                .as_str()
                .ok_or_else(|| Error::config_invalid(format!("transform.set.{name} must be a string expression")))?;
            let value = Expr::parse(expression)?.evaluate(ctx.store)?;
            output.insert(name.clone(), value);
        }
        Ok(StepResult::with_output(output))
    }
}

pub struct KafkaPublishAction;

#[async_trait]
impl Action for KafkaPublishAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let topic = require_str(&config, "topic")?;
        let key = config.get_path("key").and_then(Value::as_str).map(str::to_string);
        let payload = config
            .get_path("payload")
            .cloned()
            .ok_or_else(|| Error::config_invalid("kafka_publish action requires a payload"))?;
        let client = ctx
            .kafka_client
            .as_ref()
            .ok_or_else(|| Error::action_error("no kafka client configured"))?;
        client.publish(topic, key.as_deref(), &payload).await?;
        Ok(StepResult::default())
    }
}

pub struct KafkaConsumeAction;

#[async_trait]
impl Action for KafkaConsumeAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let topic = require_str(config, "topic")?;
        let timeout_ms = config.get_path("timeout_ms").and_then(Value::as_f64).unwrap_or(5000.0);
        let client = ctx
            .kafka_client
            .as_ref()
            .ok_or_else(|| Error::action_error("no kafka client configured"))?;
        let message = client.consume_one(topic, timeout_ms as u64).await?;
        let mut output = BTreeMap::new();
        output.insert("message".to_string(), message.clone().unwrap_or(Value::Null));
        output.insert("received".to_string(), Value::Bool(message.is_some()));
        Ok(StepResult { output, raw: message })
    }
}

pub struct MockServerStartAction;

#[async_trait]
impl Action for MockServerStartAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let name = require_str(&config, "name")?;
        let mock = ctx
            .mock_control
            .as_ref()
            .ok_or_else(|| Error::action_error("no mock server fabric configured"))?;
        let started = mock.start(name, &config).await?;
        let mut output = BTreeMap::new();
        output.insert("server".to_string(), started.clone());
        Ok(StepResult { output, raw: Some(started) })
    }
}

pub struct MockServerStopAction;

#[async_trait]
impl Action for MockServerStopAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let server_id = require_str(config, "server_id")?;
        let mock = ctx
            .mock_control
            .as_ref()
            .ok_or_else(|| Error::action_error("no mock server fabric configured"))?;
        mock.stop(server_id).await?;
        Ok(StepResult::default())
    }
}

pub struct MockServerConfigureAction;

#[async_trait]
impl Action for MockServerConfigureAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let server_id = require_str(&config, "server_id")?;
        let mock = ctx
            .mock_control
            .as_ref()
            .ok_or_else(|| Error::action_error("no mock server fabric configured"))?;
        mock.configure(server_id, &config).await?;
        Ok(StepResult::default())
    }
}

pub struct ContractGenerateAction;

#[async_trait]
impl Action for ContractGenerateAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let execution_id = require_str(config, "execution_id")?;
        let contracts = ctx
            .contract_control
            .as_ref()
            .ok_or_else(|| Error::action_error("no contract engine configured"))?;
        let contract = contracts.generate(execution_id, config).await?;
        let mut output = BTreeMap::new();
        output.insert("contract".to_string(), contract.clone());
        Ok(StepResult { output, raw: Some(contract) })
    }
}

pub struct ContractVerifyAction;

#[async_trait]
impl Action for ContractVerifyAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let contract_id = require_str(config, "contract_id")?;
        let base_url = require_str(config, "base_url")?;
        let state_setup_url = config.get_path("state_setup_url").and_then(Value::as_str);
        let contracts = ctx
            .contract_control
            .as_ref()
            .ok_or_else(|| Error::action_error("no contract engine configured"))?;
        let verification = contracts.verify(contract_id, base_url, state_setup_url).await?;
        let passed = verification
            .get_path("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s == "passed");
        let mut output = BTreeMap::new();
        output.insert("verification".to_string(), verification.clone());
        if !passed {
            return Err(Error::VerifyMismatch);
        }
        Ok(StepResult { output, raw: Some(verification) })
    }
}

pub struct ContractDiffAction;

#[async_trait]
impl Action for ContractDiffAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let old_contract_id = require_str(config, "old_contract_id")?;
        let new_contract_id = require_str(config, "new_contract_id")?;
        let contracts = ctx
            .contract_control
            .as_ref()
            .ok_or_else(|| Error::action_error("no contract engine configured"))?;
        let diff = contracts.diff(old_contract_id, new_contract_id).await?;
        let mut output = BTreeMap::new();
        output.insert("diff".to_string(), diff.clone());
        Ok(StepResult { output, raw: Some(diff) })
    }
}

pub struct RunFlowAction;

#[async_trait]
impl Action for RunFlowAction {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult> {
        let config = render_value(config, ctx.store);
        let flow_id = require_str(&config, "flow_id")?;
        let inputs = config
            .get_path("inputs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        let runner = ctx
            .flow_runner
            .as_ref()
            .ok_or_else(|| Error::action_error("no flow runner configured"))?;
        let outputs = runner.run_flow(flow_id, inputs, ctx.cancel.child_token()).await?;
        Ok(StepResult::with_output(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use testmesh_expr::VariableStore;
    use testmesh_foundation::SystemClock;
    use tokio_util::sync::CancellationToken;

    fn ctx(store: &mut VariableStore) -> ActionContext<'_> {
        ActionContext {
            store,
            cancel: CancellationToken::new(),
            http_client: reqwest::Client::new(),
            mock_control: None,
            contract_control: None,
            kafka_client: None,
            database_client: None,
            flow_runner: None,
        }
    }

    #[tokio::test]
    async fn delay_honors_cancellation() {
        let mut store = VariableStore::new(Arc::new(SystemClock));
        let token = CancellationToken::new();
        let mut context = ctx(&mut store);
        context.cancel = token.clone();
        token.cancel();
        let config = Value::Object([("duration_ms".to_string(), Value::Num(5000.0))].into_iter().collect());
        let err = DelayAction.execute(&config, &mut context).await.unwrap_err();
        assert_eq!(err.kind(), testmesh_foundation::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn assert_action_fails_closed() {
        let mut store = VariableStore::new(Arc::new(SystemClock));
        let mut context = ctx(&mut store);
        let config = Value::Object(
            [("expression".to_string(), Value::Str("1 == 2".to_string()))]
                .into_iter()
                .collect(),
        );
        let err = AssertAction.execute(&config, &mut context).await.unwrap_err();
        assert_eq!(err.kind(), testmesh_foundation::ErrorKind::AssertionFailed);
    }

    #[tokio::test]
    async fn transform_evaluates_each_expression() {
        let mut store = VariableStore::new(Arc::new(SystemClock));
        let mut context = ctx(&mut store);
        let config = Value::Object(
            [(
                "set".to_string(),
                Value::Object([("doubled".to_string(), Value::Str("2 * 3".to_string()))].into_iter().collect()),
            )]
            .into_iter()
            .collect(),
        );
        let result = TransformAction.execute(&config, &mut context).await.unwrap();
        assert_eq!(result.output.get("doubled").and_then(Value::as_f64), Some(6.0));
    }
}
