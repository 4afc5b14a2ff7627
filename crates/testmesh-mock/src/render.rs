//! Renders a matched endpoint's [`ResponseConfig`] into a concrete status,
//! header map, and body, substituting `${...}`/`{{...}}` templates against
//! path params, query, and server state (spec §4.4).

use std::collections::BTreeMap;
use std::sync::Arc;
use testmesh_domain::{ResponseConfig, Value};
use testmesh_expr::{ScopeKind, VariableStore};
use testmesh_foundation::BuiltinSource;

pub fn render_response(
    response: &ResponseConfig,
    path_params: &BTreeMap<String, String>,
    query: &BTreeMap<String, String>,
    state: &BTreeMap<String, Value>,
    builtins: Arc<dyn BuiltinSource>,
) -> (u16, BTreeMap<String, String>, Option<Value>) {
    let mut store = VariableStore::new(builtins);
    let path_object = path_params.iter().map(|(k, v)| (k.clone(), Value::Str(v.clone()))).collect();
    let query_object = query.iter().map(|(k, v)| (k.clone(), Value::Str(v.clone()))).collect();
    store.set(ScopeKind::WorkspaceEnv, "path", Value::Object(path_object));
    store.set(ScopeKind::WorkspaceEnv, "query", Value::Object(query_object));
    store.set(ScopeKind::WorkspaceEnv, "state", Value::Object(state.clone().into_iter().collect()));

    let headers = response
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), testmesh_expr::render(v, &store).0))
        .collect();

    let body = response.body.as_ref().map(|b| render_value(b, &store));
    (response.status, headers, body)
}

fn render_value(value: &Value, store: &VariableStore) -> Value {
    match value {
        Value::Str(s) => Value::Str(testmesh_expr::render(s, store).0),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, store)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), render_value(v, store))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testmesh_foundation::SystemClock;

    #[test]
    fn body_template_substitutes_path_param_and_state() {
        let response = ResponseConfig {
            status: 200,
            body: Some(Value::Str("hello ${path.name}, count=${state.count}".into())),
            ..ResponseConfig::default()
        };
        let mut path_params = BTreeMap::new();
        path_params.insert("name".to_string(), "ada".to_string());
        let mut state = BTreeMap::new();
        state.insert("count".to_string(), Value::Num(3.0));

        let (status, _headers, body) =
            render_response(&response, &path_params, &BTreeMap::new(), &state, Arc::new(SystemClock));
        assert_eq!(status, 200);
        assert_eq!(body, Some(Value::Str("hello ada, count=3".into())));
    }
}
