//! Backs the `Validate(cron, timezone, count)` operation (spec §4.8): lets
//! a caller preview a schedule's upcoming fires before saving it.

use crate::cron_expr::preview;
use chrono::{DateTime, Utc};
use testmesh_domain::Value;

pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    pub next_runs: Vec<DateTime<Utc>>,
}

pub fn validate(cron_expr: &str, timezone: &str, after: DateTime<Utc>, count: usize) -> ValidationResult {
    match preview(cron_expr, timezone, after, count) {
        Ok(next_runs) => ValidationResult { valid: true, error: None, next_runs },
        Err(err) => ValidationResult { valid: false, error: Some(err.to_string()), next_runs: Vec::new() },
    }
}

impl ValidationResult {
    pub fn into_value(self) -> Value {
        let next_runs = self
            .next_runs
            .into_iter()
            .map(|t| Value::Str(t.to_rfc3339()))
            .collect();
        Value::Object(
            [
                ("valid".to_string(), Value::Bool(self.valid)),
                (
                    "error".to_string(),
                    self.error.map(Value::Str).unwrap_or(Value::Null),
                ),
                ("next_runs".to_string(), Value::Array(next_runs)),
            ]
            .into_iter()
            .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn valid_expression_reports_next_runs() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let result = validate("@daily", "UTC", after, 2);
        assert!(result.valid);
        assert_eq!(result.next_runs.len(), 2);
    }

    #[test]
    fn invalid_expression_reports_error() {
        let after = Utc::now();
        let result = validate("garbage", "UTC", after, 2);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
