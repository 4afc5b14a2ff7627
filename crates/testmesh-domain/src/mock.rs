//! Mock Server Fabric data model (spec §4.4): servers, their endpoint
//! tables, and the request log each server accumulates.

use crate::{MockRequestId, MockServerId, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// An in-memory HTTP stub, multiplexed onto the fabric's single listener by
/// `id` rather than owning its own TCP port (spec §4.4).
#[derive(Debug, Clone)]
pub struct MockServer {
    pub id: MockServerId,
    pub name: String,
    pub status: MockServerStatus,
    /// Checked in declaration order; the first endpoint whose matcher
    /// accepts the request wins (spec §4.4's "first match" rule).
    pub endpoints: Vec<Endpoint>,
    /// The server's mutable state KV store, seeded from `StateConfig` and
    /// mutated by endpoint `StateOp`s as requests are served.
    pub state: BTreeMap<String, Value>,
}

impl MockServer {
    pub fn new(name: impl Into<String>, state: StateConfig) -> Self {
        Self {
            id: MockServerId::new(),
            name: name.into(),
            status: MockServerStatus::Running,
            endpoints: Vec::new(),
            state: state.initial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockServerStatus {
    Running,
    Stopped,
}

/// Seed values for a server's state store, supplied at creation time.
#[derive(Debug, Clone, Default)]
pub struct StateConfig {
    pub initial: BTreeMap<String, Value>,
}

/// One route on a mock server: a method + path pattern, optional extra
/// matchers, and the response to serve when matched.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,
    pub method: String,
    /// A path pattern: an exact path, `:name` parameter segments, `*`/`**`
    /// wildcard segments, or a `regex:` prefixed pattern — resolved by the
    /// fabric's own matcher, not encoded in this type.
    pub path: String,
    pub match_config: MatchConfig,
    pub response: ResponseConfig,
    /// Endpoints are consulted in descending priority order; the first
    /// match wins (spec §4.4).
    pub priority: i32,
}

/// Additional constraints a request must satisfy beyond method + path.
#[derive(Debug, Clone, Default)]
pub struct MatchConfig {
    /// Values prefixed `regex:` are matched as regular expressions
    /// (spec §4.4); others require an exact, case-sensitive match.
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Regex matched against the raw request body.
    pub body_pattern: Option<String>,
    /// When set, the request body must contain this value as a structural
    /// subset (see [`Value::is_structural_subset_of`]).
    pub body_json: Option<Value>,
}

/// The response an endpoint serves, templated against path params, query,
/// and server state before being written out (spec §4.4).
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub delay_ms: Option<u64>,
    /// State mutations applied after a successful match, in order.
    pub state_ops: Vec<StateOp>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: None,
            delay_ms: None,
            state_ops: Vec::new(),
        }
    }
}

/// A mutation to a mock server's state store, applied when an endpoint
/// matches.
#[derive(Debug, Clone)]
pub enum StateOp {
    Set { key: String, value: Value },
    Increment { key: String, by: f64 },
    Delete { key: String },
}

/// A logged inbound request, retained so `GET /__testmesh/requests/{id}`
/// (spec SPEC_FULL §4.4 supplement) and verification checks can inspect
/// mock traffic after the fact.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub id: MockRequestId,
    pub server_id: MockServerId,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub received_at: DateTime<Utc>,
    pub matched_endpoint_id: Option<String>,
}
