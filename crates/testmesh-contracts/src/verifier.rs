//! Contract Verifier (spec §4.6): replays a contract's interactions
//! against a live provider and reports typed mismatches. Deep JSON
//! comparison follows the same structural-subset rules `Value` already
//! implements for mock endpoint matching, generalized here to also report
//! *where* a mismatch occurred — the teacher's `diff_analyzer::DiffAnalyzer`
//! takes the same "walk the structure, collect typed findings keyed by
//! path" shape.

use std::collections::BTreeMap;
use testmesh_domain::{Contract, Interaction, Mismatch, MismatchType, Value, Verification, VerificationStatus};
use testmesh_foundation::{BuiltinSource, Result};
use tracing::warn;

pub struct Verifier {
    client: reqwest::Client,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn verify(
        &self,
        contract: &Contract,
        base_url: &str,
        state_setup_url: Option<&str>,
        builtins: &dyn BuiltinSource,
    ) -> Result<Verification> {
        let mut mismatches = Vec::new();
        for interaction in &contract.interactions {
            if let Some(state) = &interaction.provider_state {
                if let Some(setup_url) = state_setup_url {
                    self.setup_provider_state(setup_url, state).await;
                }
            }
            mismatches.extend(self.verify_interaction(interaction, base_url).await);
        }
        let status = if mismatches.is_empty() {
            VerificationStatus::Passed
        } else {
            VerificationStatus::Failed
        };
        Ok(Verification {
            contract_id: contract.id,
            status,
            mismatches,
            verified_at: builtins.now(),
        })
    }

    /// POSTs `{ "state": "<name>" }` to the configured state-setup URL
    /// before an interaction carrying a `provider_state` is replayed. A
    /// non-200 response is logged and verification proceeds regardless
    /// (spec §4.6 step 1).
    async fn setup_provider_state(&self, setup_url: &str, state: &str) {
        match self.client.post(setup_url).json(&serde_json::json!({"state": state})).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), state, "provider state setup returned non-200");
            }
            Err(err) => warn!(%err, state, "provider state setup request failed"),
            Ok(_) => {}
        }
    }

    async fn verify_interaction(&self, interaction: &Interaction, base_url: &str) -> Vec<Mismatch> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), interaction.request_path);
        let method = match reqwest::Method::from_bytes(interaction.request_method.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return vec![mismatch(
                    &interaction.description,
                    MismatchType::Request,
                    "$",
                    &interaction.request_method,
                    "invalid method",
                    "could not construct request method",
                )]
            }
        };

        let mut request = self.client.request(method, &url);
        for (k, v) in &interaction.request_headers {
            request = request.header(k, v);
        }
        if let Some(body) = &interaction.request_body {
            request = request.json(&body.to_json());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(err) => {
                return vec![mismatch(
                    &interaction.description,
                    MismatchType::Request,
                    "$",
                    "a response",
                    "no response",
                    &format!("request failed: {err}"),
                )]
            }
        };

        let mut mismatches = Vec::new();
        let actual_status = response.status().as_u16();
        if actual_status != interaction.response_status {
            mismatches.push(mismatch(
                &interaction.description,
                MismatchType::StatusCode,
                "$.status",
                &interaction.response_status.to_string(),
                &actual_status.to_string(),
                "response status did not match",
            ));
        }

        let mut actual_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                actual_headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        for (name, expected) in &interaction.response_headers {
            match actual_headers.get(&name.to_ascii_lowercase()) {
                Some(actual) if actual == expected => {}
                Some(actual) => mismatches.push(mismatch(
                    &interaction.description,
                    MismatchType::Header,
                    &format!("$.headers.{name}"),
                    expected,
                    actual,
                    "response header did not match",
                )),
                None => mismatches.push(mismatch(
                    &interaction.description,
                    MismatchType::Header,
                    &format!("$.headers.{name}"),
                    expected,
                    "(absent)",
                    "expected response header was not present",
                )),
            }
        }

        if let Some(expected_body) = &interaction.response_body {
            let bytes = response.bytes().await.unwrap_or_default();
            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(json) => {
                    let actual_body = Value::from(json);
                    compare_json(expected_body, &actual_body, "$", &interaction.description, &mut mismatches);
                }
                Err(_) => {
                    let actual_str = String::from_utf8_lossy(&bytes);
                    let expected_str = expected_body.to_string();
                    if actual_str != expected_str {
                        mismatches.push(mismatch(
                            &interaction.description,
                            MismatchType::BodyType,
                            "$",
                            &expected_str,
                            &actual_str,
                            "response body did not match as plain text",
                        ));
                    }
                }
            }
        }

        mismatches
    }
}

/// Recursive structural comparison producing path-qualified mismatches
/// (spec §4.6's "Deep JSON comparison"): objects require every expected key
/// to exist and recurse, extra actual keys are ignored; arrays require
/// equal length and positional comparison; scalars use value equality with
/// no numeric coercion.
fn compare_json(expected: &Value, actual: &Value, path: &str, interaction: &str, out: &mut Vec<Mismatch>) {
    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => {
            for (key, expected_value) in expected_map {
                let field_path = format!("{path}.{key}");
                match actual_map.get(key) {
                    Some(actual_value) => compare_json(expected_value, actual_value, &field_path, interaction, out),
                    None => out.push(mismatch(
                        interaction,
                        MismatchType::MissingField,
                        &field_path,
                        &expected_value.to_string(),
                        "(absent)",
                        "expected field missing from response body",
                    )),
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.len() != actual_items.len() {
                out.push(mismatch(
                    interaction,
                    MismatchType::BodyField,
                    path,
                    &format!("array of length {}", expected_items.len()),
                    &format!("array of length {}", actual_items.len()),
                    "array length did not match",
                ));
                return;
            }
            for (i, (e, a)) in expected_items.iter().zip(actual_items.iter()).enumerate() {
                compare_json(e, a, &format!("{path}[{i}]"), interaction, out);
            }
        }
        (expected, actual) if std::mem::discriminant(expected) != std::mem::discriminant(actual) => {
            out.push(mismatch(
                interaction,
                MismatchType::BodyType,
                path,
                &expected.to_string(),
                &actual.to_string(),
                "value type did not match",
            ));
        }
        (expected, actual) if expected != actual => {
            out.push(mismatch(
                interaction,
                MismatchType::BodyField,
                path,
                &expected.to_string(),
                &actual.to_string(),
                "value did not match",
            ));
        }
        _ => {}
    }
}

fn mismatch(
    interaction: &str,
    mismatch_type: MismatchType,
    path: &str,
    expected: &str,
    actual: &str,
    message: &str,
) -> Mismatch {
    Mismatch {
        interaction: interaction.to_string(),
        mismatch_type,
        path: path.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_json_flags_missing_field_with_path() {
        let expected: Value = serde_json::json!({"amount": 100, "currency": "USD"}).into();
        let actual: Value = serde_json::json!({"amount": 100}).into();
        let mut out = Vec::new();
        compare_json(&expected, &actual, "$", "pay", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "$.currency");
        assert_eq!(out[0].mismatch_type, MismatchType::MissingField);
    }

    #[test]
    fn compare_json_ignores_extra_actual_keys() {
        let expected: Value = serde_json::json!({"amount": 100}).into();
        let actual: Value = serde_json::json!({"amount": 100, "currency": "USD"}).into();
        let mut out = Vec::new();
        compare_json(&expected, &actual, "$", "pay", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn compare_json_requires_exact_numeric_equality() {
        let expected: Value = serde_json::json!({"n": 1}).into();
        let actual: Value = serde_json::json!({"n": 1.0}).into();
        let mut out = Vec::new();
        compare_json(&expected, &actual, "$", "x", &mut out);
        assert!(out.is_empty(), "1 and 1.0 serialize to the same f64");
    }
}
