//! Template interpolation (spec §4.1): `${path}` everywhere, plus `{{path}}`
//! in mock response bodies (spec §4.4).

use crate::store::VariableStore;

/// Render `template`, substituting every `${path}`/`{{path}}` reference with
/// its stringified value. Missing references render as the empty string;
/// their paths are collected into the second element so callers can log an
/// "undefined variable" warning without failing the render (spec §4.1).
pub fn render(template: &str, store: &VariableStore) -> (String, Vec<String>) {
    let mut output = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if let Some((path, consumed)) = try_match(template, i, "${", "}") {
            substitute(&path, store, &mut output, &mut missing);
            i += consumed;
        } else if let Some((path, consumed)) = try_match(template, i, "{{", "}}") {
            substitute(&path, store, &mut output, &mut missing);
            i += consumed;
        } else {
            let ch = template[i..].chars().next().unwrap_or('\0');
            output.push(ch);
            i += ch.len_utf8();
        }
    }

    (output, missing)
}

fn substitute(path: &str, store: &VariableStore, output: &mut String, missing: &mut Vec<String>) {
    match store.get(path.trim()) {
        Some(value) => output.push_str(&value.to_string()),
        None => missing.push(path.trim().to_string()),
    }
}

/// If `template[at..]` starts with `open`, find the matching `close` and
/// return the enclosed path plus the number of bytes consumed.
fn try_match(template: &str, at: usize, open: &str, close: &str) -> Option<(String, usize)> {
    let rest = &template[at..];
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    let path = &inner[..end];
    Some((path.to_string(), open.len() + end + close.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ScopeKind;
    use std::sync::Arc;
    use testmesh_domain::Value;
    use testmesh_foundation::SystemClock;

    #[test]
    fn renders_dollar_and_brace_syntax() {
        let mut store = VariableStore::new(Arc::new(SystemClock));
        store.set(ScopeKind::FlowInitial, "name", Value::Str("Ada".into()));
        let (rendered, missing) = render("hello ${name} and {{name}}", &store);
        assert_eq!(rendered, "hello Ada and Ada");
        assert!(missing.is_empty());
    }

    #[test]
    fn missing_reference_renders_empty_and_is_reported() {
        let store = VariableStore::new(Arc::new(SystemClock));
        let (rendered, missing) = render("value: ${nope}", &store);
        assert_eq!(rendered, "value: ");
        assert_eq!(missing, vec!["nope".to_string()]);
    }
}
