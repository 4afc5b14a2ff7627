//! Adapts [`MockFabric`] to the `mock_server_*` actions' port
//! (`testmesh_actions::MockControl`), translating the generic [`Value`]
//! configs those actions carry into the fabric's typed [`Endpoint`]/
//! [`StateConfig`] model.

use crate::registry::MockFabric;
use async_trait::async_trait;
use std::collections::BTreeMap;
use testmesh_actions::MockControl;
use testmesh_domain::{Endpoint, MatchConfig, MockServerId, ResponseConfig, StateConfig, StateOp, Value};
use testmesh_foundation::{Error, Result};

#[async_trait]
impl MockControl for MockFabric {
    async fn start(&self, name: &str, config: &Value) -> Result<Value> {
        let state = state_config_from(config.get_path("state"));
        let endpoints = endpoints_from(config.get_path("endpoints"))?;
        let server = self.start(name, state, endpoints).await?;
        Ok(Value::Str(server.id.to_string()))
    }

    async fn stop(&self, server_id: &str) -> Result<()> {
        self.stop(parse_id(server_id)?).await
    }

    async fn configure(&self, server_id: &str, config: &Value) -> Result<()> {
        let endpoints = endpoints_from(config.get_path("endpoints"))?;
        self.configure(parse_id(server_id)?, endpoints).await
    }
}

fn parse_id(raw: &str) -> Result<MockServerId> {
    raw.parse()
        .map_err(|_| Error::config_invalid(format!("invalid mock server id: {raw}")))
}

fn state_config_from(value: Option<&Value>) -> StateConfig {
    let initial = value
        .and_then(Value::as_object)
        .map(|m| m.clone().into_iter().collect())
        .unwrap_or_default();
    StateConfig { initial }
}

fn endpoints_from(value: Option<&Value>) -> Result<Vec<Endpoint>> {
    let Some(list) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    list.iter().map(endpoint_from).collect()
}

fn endpoint_from(value: &Value) -> Result<Endpoint> {
    let id = value
        .get_path("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("ep-{}", uuid::Uuid::new_v4()));
    let method = value
        .get_path("method")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid("endpoint missing required field: method"))?
        .to_uppercase();
    let path = value
        .get_path("path")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid("endpoint missing required field: path"))?
        .to_string();
    let priority = value.get_path("priority").and_then(Value::as_f64).unwrap_or(0.0) as i32;

    Ok(Endpoint {
        id,
        method,
        path,
        match_config: match_config_from(value.get_path("match_config")),
        response: response_config_from(value.get_path("response_config")),
        priority,
    })
}

fn match_config_from(value: Option<&Value>) -> MatchConfig {
    let Some(value) = value else {
        return MatchConfig::default();
    };
    MatchConfig {
        headers: str_map(value.get_path("headers")),
        query: str_map(value.get_path("query_params")),
        body_pattern: value.get_path("body_pattern").and_then(Value::as_str).map(str::to_string),
        body_json: value.get_path("body_json").cloned(),
    }
}

fn response_config_from(value: Option<&Value>) -> ResponseConfig {
    let Some(value) = value else {
        return ResponseConfig::default();
    };
    let status = value
        .get_path("status_code")
        .and_then(Value::as_f64)
        .map(|n| n as u16)
        .unwrap_or(200);
    let body = value
        .get_path("body_json")
        .or_else(|| value.get_path("body_text"))
        .or_else(|| value.get_path("body"))
        .cloned();
    let state_ops = value
        .get_path("state_config.ops")
        .and_then(Value::as_array)
        .map(|ops| ops.iter().filter_map(state_op_from).collect())
        .unwrap_or_default();

    ResponseConfig {
        status,
        headers: str_map(value.get_path("headers")),
        body,
        delay_ms: value.get_path("delay_ms").and_then(Value::as_f64).map(|n| n as u64),
        state_ops,
    }
}

fn state_op_from(value: &Value) -> Option<StateOp> {
    let op = value.get_path("op").and_then(Value::as_str)?;
    let key = value.get_path("key").and_then(Value::as_str)?.to_string();
    match op {
        "set" => Some(StateOp::Set {
            key,
            value: value.get_path("value").cloned().unwrap_or(Value::Null),
        }),
        "increment" => Some(StateOp::Increment {
            key,
            by: value.get_path("by").and_then(Value::as_f64).unwrap_or(1.0),
        }),
        "delete" => Some(StateOp::Delete { key }),
        _ => None,
    }
}

fn str_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_from_value_reads_nested_match_and_response_config() {
        let config: Value = serde_json::json!({
            "id": "e1",
            "method": "post",
            "path": "/pay",
            "priority": 5,
            "match_config": { "body_json": { "amount": 100 } },
            "response_config": { "status_code": 201, "body_json": { "ok": true } },
        })
        .into();
        let endpoint = endpoint_from(&config).unwrap();
        assert_eq!(endpoint.method, "POST");
        assert_eq!(endpoint.priority, 5);
        assert_eq!(endpoint.response.status, 201);
        assert!(endpoint.match_config.body_json.is_some());
    }
}
