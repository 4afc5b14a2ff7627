//! Contract Differ (spec §4.7): classifies breaking changes between two
//! contract versions for the same consumer/provider pair, keyed by
//! interaction `description`.

use std::collections::HashMap;
use testmesh_domain::{BreakingChange, ChangeType, Contract, Interaction, Severity, Value};

pub struct Summary {
    pub critical: usize,
    pub major: usize,
    pub minor: usize,
    pub total: usize,
}

/// Computes every breaking change between `old` and `new` (spec §4.7's
/// table). Interactions are matched by `description`; an interaction
/// present only in `old` is `InteractionRemoved`, only in `new` is
/// `InteractionAdded`, and one present in both is compared field by field.
pub fn diff(old: &Contract, new: &Contract) -> Vec<BreakingChange> {
    let old_by_desc: HashMap<&str, &Interaction> =
        old.interactions.iter().map(|i| (i.description.as_str(), i)).collect();
    let new_by_desc: HashMap<&str, &Interaction> =
        new.interactions.iter().map(|i| (i.description.as_str(), i)).collect();

    let mut changes = Vec::new();

    for (desc, old_interaction) in &old_by_desc {
        match new_by_desc.get(desc) {
            None => changes.push(change(
                old,
                new,
                desc,
                ChangeType::InteractionRemoved,
                Severity::Breaking,
                "$",
                None,
                None,
                "interaction removed from new contract",
                "a consumer replaying this interaction against the new provider version will get a 404 or route miss",
            )),
            Some(new_interaction) => {
                changes.extend(diff_interaction(old, new, desc, old_interaction, new_interaction));
            }
        }
    }

    for desc in new_by_desc.keys() {
        if !old_by_desc.contains_key(desc) {
            changes.push(change(
                old,
                new,
                desc,
                ChangeType::InteractionAdded,
                Severity::Info,
                "$",
                None,
                None,
                "interaction added in new contract",
                "no action needed; existing consumers are unaffected by a new interaction",
            ));
        }
    }

    changes
}

#[allow(clippy::too_many_arguments)]
fn diff_interaction(
    old: &Contract,
    new: &Contract,
    desc: &str,
    old_i: &Interaction,
    new_i: &Interaction,
) -> Vec<BreakingChange> {
    let mut changes = Vec::new();

    if old_i.request_method != new_i.request_method {
        changes.push(change(
            old,
            new,
            desc,
            ChangeType::RequestMethodChanged,
            Severity::Breaking,
            "$.request.method",
            Some(old_i.request_method.clone()),
            Some(new_i.request_method.clone()),
            "request method changed",
            "update the consumer to issue the new method before upgrading the provider",
        ));
    }
    if old_i.request_path != new_i.request_path {
        changes.push(change(
            old,
            new,
            desc,
            ChangeType::RequestPathChanged,
            Severity::Breaking,
            "$.request.path",
            Some(old_i.request_path.clone()),
            Some(new_i.request_path.clone()),
            "request path changed",
            "update the consumer to call the new path before upgrading the provider",
        ));
    }
    for (header, _) in &old_i.request_headers {
        if !new_i.request_headers.contains_key(header) {
            changes.push(change(
                old,
                new,
                desc,
                ChangeType::RequiredRequestHeaderRemoved,
                Severity::Warning,
                &format!("$.request.headers.{header}"),
                Some("present".to_string()),
                None,
                "required request header removed",
                "confirm the provider no longer requires this header before relying on its absence",
            ));
        }
    }

    let status_boundary = |s: u16| s / 100;
    if old_i.response_status != new_i.response_status {
        let severity = if status_boundary(old_i.response_status) != status_boundary(new_i.response_status) {
            Severity::Breaking
        } else {
            Severity::Warning
        };
        changes.push(change(
            old,
            new,
            desc,
            ChangeType::StatusCodeChanged,
            severity,
            "$.response.status",
            Some(old_i.response_status.to_string()),
            Some(new_i.response_status.to_string()),
            "response status changed",
            "update the consumer's status code assertions before upgrading the provider",
        ));
    }

    match (&old_i.response_body, &new_i.response_body) {
        (Some(_), None) | (None, Some(_)) => {
            changes.push(change(
                old,
                new,
                desc,
                ChangeType::ResponseBodyExistenceChanged,
                Severity::Breaking,
                "$.response.body",
                old_i.response_body.as_ref().map(Value::to_string),
                new_i.response_body.as_ref().map(Value::to_string),
                "response body presence changed",
                "update the consumer to handle the new body presence before upgrading the provider",
            ));
        }
        (Some(old_body), Some(new_body)) => {
            diff_body(old, new, desc, old_body, new_body, "$", &mut changes);
        }
        (None, None) => {}
    }

    changes
}

fn diff_body(
    old: &Contract,
    new: &Contract,
    desc: &str,
    old_value: &Value,
    new_value: &Value,
    path: &str,
    out: &mut Vec<BreakingChange>,
) {
    match (old_value, new_value) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_field) in old_map {
                let field_path = format!("{path}.{key}");
                match new_map.get(key) {
                    None => out.push(change(
                        old,
                        new,
                        desc,
                        ChangeType::ResponseFieldRemoved,
                        Severity::Breaking,
                        &field_path,
                        Some(old_field.to_string()),
                        None,
                        "response field removed",
                        "a consumer reading this field will get a missing-field error; update it before upgrading",
                    )),
                    Some(new_field) => diff_body(old, new, desc, old_field, new_field, &field_path, out),
                }
            }
        }
        (old_value, new_value) if std::mem::discriminant(old_value) != std::mem::discriminant(new_value) => {
            out.push(change(
                old,
                new,
                desc,
                ChangeType::ResponseFieldTypeChanged,
                Severity::Breaking,
                path,
                Some(old_value.to_string()),
                Some(new_value.to_string()),
                "response field type changed",
                "update the consumer's deserialization for this field before upgrading the provider",
            ));
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn change(
    old: &Contract,
    new: &Contract,
    interaction: &str,
    change_type: ChangeType,
    severity: Severity,
    path: &str,
    old_value: Option<String>,
    new_value: Option<String>,
    impact: &str,
    suggestion: &str,
) -> BreakingChange {
    BreakingChange {
        old_contract_id: old.id,
        new_contract_id: new.id,
        interaction: interaction.to_string(),
        change_type,
        severity,
        path: path.to_string(),
        old_value,
        new_value,
        impact: impact.to_string(),
        suggestion: suggestion.to_string(),
    }
}

pub fn summarize(changes: &[BreakingChange]) -> Summary {
    let mut summary = Summary {
        critical: 0,
        major: 0,
        minor: 0,
        total: changes.len(),
    };
    for c in changes {
        match c.severity {
            Severity::Breaking => summary.critical += 1,
            Severity::Warning => summary.major += 1,
            Severity::Info => summary.minor += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use testmesh_domain::ContractId;

    fn interaction(description: &str, response_body: Option<Value>) -> Interaction {
        Interaction {
            description: description.to_string(),
            provider_state: None,
            request_method: "GET".to_string(),
            request_path: "/amount".to_string(),
            request_headers: Default::default(),
            request_body: None,
            response_status: 200,
            response_headers: Default::default(),
            response_body,
        }
    }

    fn contract(interactions: Vec<Interaction>) -> Contract {
        Contract {
            id: ContractId::new(),
            consumer: "c".to_string(),
            provider: "p".to_string(),
            version: "1.0.0".to_string(),
            interactions,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn removed_response_field_is_critical() {
        let old = contract(vec![interaction(
            "get amount",
            Some(serde_json::json!({"amount": 100, "currency": "USD"}).into()),
        )]);
        let new = contract(vec![interaction(
            "get amount",
            Some(serde_json::json!({"amount": 100}).into()),
        )]);

        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::ResponseFieldRemoved);
        assert_eq!(changes[0].severity, Severity::Breaking);
        assert_eq!(changes[0].path, "$.currency");
    }

    #[test]
    fn summary_counts_by_severity() {
        let old = contract(vec![interaction("a", None), interaction("b", None)]);
        let new = contract(vec![interaction("b", None)]);
        let changes = diff(&old, &new);
        let summary = summarize(&changes);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.total, 1);
    }
}
