//! Endpoint matching (spec §4.4): method + path + headers/query/body, first
//! match wins by descending `priority`. Path matching is hand-rolled — the
//! mixed `regex:`/`:param`/`*`-tail semantics spec.md requires per endpoint
//! don't map onto a single static router (unlike the fixed OpenAPI route
//! tables a `matchit`-style router is built for) — generalizing the
//! exact/wildcard/regex matching the teacher's `verification::matches_path_pattern`
//! performs, adding `:param` segment capture.

use regex::Regex;
use std::collections::BTreeMap;
use testmesh_domain::{Endpoint, Value};

/// The result of a successful match: the endpoint and any `:param` segment
/// captures.
pub struct Matched<'a> {
    pub endpoint: &'a Endpoint,
    pub path_params: BTreeMap<String, String>,
}

#[allow(clippy::too_many_arguments)]
pub fn find_match<'a>(
    endpoints: &'a [Endpoint],
    method: &str,
    path: &str,
    headers: &BTreeMap<String, String>,
    query: &BTreeMap<String, String>,
    raw_body: Option<&str>,
    parsed_body: Option<&Value>,
) -> Option<Matched<'a>> {
    let mut ordered: Vec<&Endpoint> = endpoints.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    for endpoint in ordered {
        if !endpoint.method.eq_ignore_ascii_case(method) {
            continue;
        }
        let Some(path_params) = match_path(&endpoint.path, path) else {
            continue;
        };
        if !headers_match(&endpoint.match_config.headers, headers) {
            continue;
        }
        if !query_match(&endpoint.match_config.query, query) {
            continue;
        }
        if !body_matches(endpoint, raw_body, parsed_body) {
            continue;
        }
        return Some(Matched { endpoint, path_params });
    }
    None
}

/// Match `actual` against `pattern`, returning captured `:name` segments on
/// success. `regex:`-prefixed patterns are matched as a whole-path regex
/// with no captures recorded; otherwise segments are compared one by one,
/// with `:name` capturing any single segment and a trailing `*` consuming
/// the rest of the path (spec §4.4(b): "`:param` segments match any single
/// segment and `*` matches the tail").
fn match_path(pattern: &str, actual: &str) -> Option<BTreeMap<String, String>> {
    if let Some(regex_source) = pattern.strip_prefix("regex:") {
        let re = Regex::new(regex_source).ok()?;
        return re.is_match(actual).then(BTreeMap::new);
    }

    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let actual_segments: Vec<&str> = actual.split('/').filter(|s| !s.is_empty()).collect();
    let mut params = BTreeMap::new();
    let mut i = 0;

    loop {
        match (pattern_segments.get(i), actual_segments.get(i)) {
            (Some(&"*"), _) => return Some(params),
            (Some(p), Some(a)) if p.starts_with(':') => {
                params.insert(p[1..].to_string(), (*a).to_string());
                i += 1;
            }
            (Some(p), Some(a)) if p == a => i += 1,
            (None, None) => return Some(params),
            _ => return None,
        }
    }
}

fn headers_match(required: &BTreeMap<String, String>, actual: &BTreeMap<String, String>) -> bool {
    required.iter().all(|(name, expected)| {
        actual
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .is_some_and(|(_, v)| value_matches(expected, v))
    })
}

fn query_match(required: &BTreeMap<String, String>, actual: &BTreeMap<String, String>) -> bool {
    required.iter().all(|(k, expected)| actual.get(k).is_some_and(|v| value_matches(expected, v)))
}

fn value_matches(expected: &str, actual: &str) -> bool {
    match expected.strip_prefix("regex:") {
        Some(pattern) => Regex::new(pattern).is_ok_and(|re| re.is_match(actual)),
        None => expected == actual,
    }
}

fn body_matches(endpoint: &Endpoint, raw_body: Option<&str>, parsed_body: Option<&Value>) -> bool {
    let config = &endpoint.match_config;
    if config.body_pattern.is_none() && config.body_json.is_none() {
        return true;
    }
    if let Some(pattern) = &config.body_pattern {
        if let Some(raw) = raw_body {
            if Regex::new(pattern).is_ok_and(|re| re.is_match(raw)) {
                return true;
            }
        }
    }
    if let Some(expected) = &config.body_json {
        if let Some(actual) = parsed_body {
            if expected.is_structural_subset_of(actual) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use testmesh_domain::{MatchConfig, ResponseConfig};

    fn endpoint(id: &str, method: &str, path: &str, priority: i32) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            match_config: MatchConfig::default(),
            response: ResponseConfig::default(),
            priority,
        }
    }

    #[test]
    fn param_segment_is_captured() {
        let endpoints = vec![endpoint("e1", "GET", "/users/:id", 0)];
        let empty = BTreeMap::new();
        let matched = find_match(&endpoints, "get", "/users/42", &empty, &empty, None, None).unwrap();
        assert_eq!(matched.path_params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn tail_wildcard_matches_remaining_segments() {
        let endpoints = vec![endpoint("e1", "GET", "/static/*", 0)];
        let empty = BTreeMap::new();
        assert!(find_match(&endpoints, "GET", "/static/a/b/c", &empty, &empty, None, None).is_some());
    }

    #[test]
    fn higher_priority_wins_on_overlap() {
        let mut specific = endpoint("specific", "GET", "/users/:id", 10);
        specific.response.status = 201;
        let mut generic = endpoint("generic", "GET", "/users/:id", 0);
        generic.response.status = 200;
        let endpoints = vec![generic, specific];
        let empty = BTreeMap::new();
        let matched = find_match(&endpoints, "GET", "/users/1", &empty, &empty, None, None).unwrap();
        assert_eq!(matched.endpoint.id, "specific");
    }

    #[test]
    fn no_match_returns_none() {
        let endpoints = vec![endpoint("e1", "GET", "/users/:id", 0)];
        let empty = BTreeMap::new();
        assert!(find_match(&endpoints, "POST", "/users/1", &empty, &empty, None, None).is_none());
    }

    #[test]
    fn body_json_subset_matches() {
        let mut e = endpoint("e1", "POST", "/pay", 0);
        e.match_config.body_json = Some(
            serde_json::json!({"amount": 100})
                .into(),
        );
        let empty = BTreeMap::new();
        let body: Value = serde_json::json!({"amount": 100, "currency": "USD"}).into();
        assert!(find_match(&[e], "POST", "/pay", &empty, &empty, None, Some(&body)).is_some());
    }
}
