//! The recursive dynamic-value type shared by the Variable Store, Mock
//! Server Fabric, and Contract Engine (spec §9: "do not rely on the target
//! language's own dynamic value type").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A JSON-shaped value with structural equality, used everywhere the spec
/// calls for comparing "any" bodies: assertions, endpoint `body_json`
/// matching, Pact interaction bodies, and contract diffing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Walk a dotted path (`user.id`, `items.0.name`) into this value,
    /// indexing arrays by numeric segments. Mirrors the navigation the
    /// teacher's `ChainTemplatingContext::navigate_json_path` performs over
    /// `serde_json::Value`, generalized to our own `Value`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Self::Object(map) => map.get(segment)?,
                Self::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// `self` is a structural subset of `other`: every key/value in `self`
    /// must exist and match in `other`; extra keys in `other` are ignored.
    /// Arrays are compared positionally with equal length required. Used by
    /// endpoint `match_config.body_json` matching (spec §4.4) and the
    /// Contract Verifier's deep JSON comparison (spec §4.6).
    pub fn is_structural_subset_of(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Object(expected), Self::Object(actual)) => expected
                .iter()
                .all(|(k, v)| actual.get(k).is_some_and(|av| v.is_structural_subset_of(av))),
            (Self::Array(expected), Self::Array(actual)) => {
                expected.len() == actual.len()
                    && expected
                        .iter()
                        .zip(actual.iter())
                        .all(|(e, a)| e.is_structural_subset_of(a))
            }
            (expected, actual) => expected == actual,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Array(a) => serde_json::Value::Array(a.iter().map(Value::to_json).collect()),
            Self::Object(o) => serde_json::Value::Object(
                o.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(a) => Self::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Self::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        v.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Array(_) | Self::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_serde_json() {
        let original = json!({"a": 1, "b": [1, 2.5, "x", null, true]});
        let value: Value = original.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(original, back);
    }

    #[test]
    fn path_walks_objects_and_arrays() {
        let value: Value = json!({"items": [{"name": "a"}, {"name": "b"}]}).into();
        assert_eq!(value.get_path("items.1.name").and_then(Value::as_str), Some("b"));
        assert_eq!(value.get_path("missing"), None);
    }

    #[test]
    fn structural_subset_ignores_extra_actual_keys() {
        let expected: Value = json!({"amount": 100}).into();
        let actual: Value = json!({"amount": 100, "currency": "USD"}).into();
        assert!(expected.is_structural_subset_of(&actual));
        assert!(!actual.is_structural_subset_of(&expected));
    }

    #[test]
    fn structural_subset_requires_equal_array_length() {
        let expected: Value = json!([1, 2]).into();
        let actual: Value = json!([1, 2, 3]).into();
        assert!(!expected.is_structural_subset_of(&actual));
    }

    #[test]
    fn numeric_equality_does_not_coerce_int_and_float() {
        // 1 != 1.0 is only meaningful at the serialization boundary; internally
        // both collapse to f64, matching spec.md's allowance that coercion
        // happens only when "the serialization produces the same JSON number".
        let a: Value = json!(1).into();
        let b: Value = json!(1.0).into();
        assert_eq!(a, b);
    }
}
