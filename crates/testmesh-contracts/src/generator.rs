//! Contract Generator (spec §4.5): lifts recorded `http_request` steps out
//! of a finished Execution into a Pact-style `Contract`, and imports
//! externally authored Pact JSON documents.

use std::collections::BTreeMap;
use testmesh_domain::{Contract, ContractId, Execution, Flow, Interaction, Step, StepBody, StepStatus, Value};
use testmesh_foundation::{BuiltinSource, Error, Result};

/// Walks every step list a Flow owns (`setup`, top-level `steps`,
/// `teardown`) so generation sees interactions recorded anywhere in the
/// Flow, not just its main body.
fn all_steps(flow: &Flow) -> impl Iterator<Item = &Step> {
    flow.definition
        .setup
        .iter()
        .chain(flow.definition.steps.iter())
        .chain(flow.definition.teardown.iter())
}

/// Converts every successfully completed `http_request` step in `execution`
/// into an `Interaction`, using `step.name` as the description (spec §4.5:
/// "`step.name` as the description").
pub fn generate_from_execution(
    consumer: impl Into<String>,
    provider: impl Into<String>,
    version: impl Into<String>,
    flow: &Flow,
    execution: &Execution,
    builtins: &dyn BuiltinSource,
) -> Contract {
    let step_kinds: BTreeMap<&str, &str> = all_steps(flow)
        .filter_map(|step| match &step.body {
            StepBody::Action { action, .. } => Some((step.id.as_str(), action.as_str())),
            StepBody::Control(_) => None,
        })
        .collect();

    let interactions = execution
        .steps
        .iter()
        .filter(|es| es.status == StepStatus::Succeeded)
        .filter(|es| step_kinds.get(es.step_id.as_str()) == Some(&"http_request"))
        .filter_map(|es| interaction_from_output(&es.name, es.output.as_ref()?))
        .collect();

    Contract {
        id: ContractId::new(),
        consumer: consumer.into(),
        provider: provider.into(),
        version: version.into(),
        interactions,
        created_at: builtins.now(),
    }
}

fn interaction_from_output(name: &str, output: &Value) -> Option<Interaction> {
    Some(Interaction {
        description: name.to_string(),
        provider_state: output.get_path("provider_state").and_then(Value::as_str).map(str::to_string),
        request_method: output.get_path("request_method")?.as_str()?.to_string(),
        request_path: output.get_path("request_path")?.as_str()?.to_string(),
        request_headers: headers_from(output.get_path("request_headers")),
        request_body: output.get_path("request_body").cloned(),
        response_status: output.get_path("status")?.as_f64()? as u16,
        response_headers: headers_from(output.get_path("headers")),
        response_body: output.get_path("body").cloned(),
    })
}

fn headers_from(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Imports a Pact-shaped document (spec §4.5): `{ consumer:{name},
/// provider:{name}, interactions:[...], metadata:{...} }`. Missing
/// header/query maps default to empty; missing bodies remain absent.
pub fn import_pact(document: &Value, builtins: &dyn BuiltinSource) -> Result<Contract> {
    let consumer = document
        .get_path("consumer.name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid("pact document missing consumer.name"))?
        .to_string();
    let provider = document
        .get_path("provider.name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid("pact document missing provider.name"))?
        .to_string();

    let version = document
        .get_path("metadata.pactSpecification.version")
        .and_then(Value::as_str)
        .unwrap_or("1.0.0")
        .to_string();

    let interactions = document
        .get_path("interactions")
        .and_then(Value::as_array)
        .map(|list| list.iter().map(pact_interaction).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    Ok(Contract {
        id: ContractId::new(),
        consumer,
        provider,
        version,
        interactions,
        created_at: builtins.now(),
    })
}

fn pact_interaction(value: &Value) -> Result<Interaction> {
    let description = value
        .get_path("description")
        .and_then(Value::as_str)
        .unwrap_or("unnamed interaction")
        .to_string();
    let provider_state = value
        .get_path("providerState")
        .and_then(Value::as_str)
        .map(str::to_string);
    let request_method = value
        .get_path("request.method")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid("pact interaction missing request.method"))?
        .to_uppercase();
    let request_path = value
        .get_path("request.path")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config_invalid("pact interaction missing request.path"))?
        .to_string();
    let response_status = value
        .get_path("response.status")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::config_invalid("pact interaction missing response.status"))?
        as u16;

    Ok(Interaction {
        description,
        provider_state,
        request_method,
        request_path,
        request_headers: headers_from(value.get_path("request.headers")),
        request_body: value.get_path("request.body").cloned(),
        response_status,
        response_headers: headers_from(value.get_path("response.headers")),
        response_body: value.get_path("response.body").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;
    use testmesh_domain::{Definition, ExecutionId, ExecutionStatus, ExecutionStep, FlowId};
    use testmesh_foundation::SystemClock;

    fn step(id: &str, action: &str) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            depends_on: Vec::new(),
            when: None,
            body: StepBody::Action {
                action: action.to_string(),
                params: Map::new(),
            },
            assert: Vec::new(),
            output: Map::new(),
            retry: None,
            timeout_ms: None,
        }
    }

    fn output_value() -> Value {
        serde_json::json!({
            "status": 200,
            "headers": {"content-type": "application/json"},
            "body": {"ok": true},
            "request_method": "GET",
            "request_path": "http://upstream/users/1",
            "request_headers": {},
        })
        .into()
    }

    #[test]
    fn generate_lifts_only_succeeded_http_request_steps() {
        let flow = Flow {
            id: FlowId::new(),
            name: "demo".to_string(),
            definition: Definition {
                setup: Vec::new(),
                steps: vec![step("fetch", "http_request"), step("compute", "transform")],
                teardown: Vec::new(),
                variables: Map::new(),
            },
        };
        let mut execution = Execution::new(flow.id, Utc0());
        execution.steps.push(ExecutionStep {
            step_id: "fetch".to_string(),
            name: "fetch the user".to_string(),
            status: StepStatus::Succeeded,
            attempts: 1,
            started_at: Utc0(),
            finished_at: Some(Utc0()),
            output: Some(output_value()),
            error: None,
        });
        execution.steps.push(ExecutionStep {
            step_id: "compute".to_string(),
            name: "compute".to_string(),
            status: StepStatus::Succeeded,
            attempts: 1,
            started_at: Utc0(),
            finished_at: Some(Utc0()),
            output: Some(Value::Null),
            error: None,
        });
        execution.status = ExecutionStatus::Succeeded;
        let _ = ExecutionId::new();

        let contract =
            generate_from_execution("consumer", "provider", "1.0.0", &flow, &execution, &SystemClock);
        assert_eq!(contract.interactions.len(), 1);
        assert_eq!(contract.interactions[0].description, "fetch the user");
        assert_eq!(contract.interactions[0].response_status, 200);
    }

    #[allow(non_snake_case)]
    fn Utc0() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn import_pact_parses_minimal_document() {
        let doc: Value = serde_json::json!({
            "consumer": {"name": "web"},
            "provider": {"name": "users-api"},
            "interactions": [{
                "description": "get user",
                "request": {"method": "get", "path": "/users/1"},
                "response": {"status": 200, "body": {"id": 1}},
            }],
        })
        .into();
        let contract = import_pact(&doc, &SystemClock).unwrap();
        assert_eq!(contract.consumer, "web");
        assert_eq!(contract.interactions[0].request_method, "GET");
    }
}
