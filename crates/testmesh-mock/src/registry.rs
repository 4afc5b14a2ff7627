//! In-memory server registry and request dispatch (spec §4.4): servers are
//! multiplexed onto one listener by id, so "starting" a mock server is
//! registering it here rather than binding a socket, mirroring the
//! teacher's `MockServer`/`MockServerConfig` split in `mock_server.rs`
//! (state + config in one place, transport bound separately).

use crate::matcher::find_match;
use crate::render::render_response;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use testmesh_domain::{
    Endpoint, MockRepository, MockRequest, MockRequestId, MockServer, MockServerId,
    MockServerStatus, StateConfig, StateOp, Value,
};
use testmesh_foundation::{BuiltinSource, Error, Result};
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

/// The response a matched endpoint produces, ready to be written back by
/// whichever transport invoked the fabric (spec §4.4).
#[derive(Debug)]
pub struct RenderedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// Owns every registered mock server and the request log sender; shared
/// behind an `Arc` by the axum router and the `MockControl` port
/// implementation.
pub struct MockFabric {
    servers: RwLock<HashMap<MockServerId, MockServer>>,
    repo: Arc<dyn MockRepository>,
    builtins: Arc<dyn BuiltinSource>,
    log_tx: mpsc::UnboundedSender<MockRequest>,
}

impl MockFabric {
    /// Spawns the background task that drains logged requests into the
    /// repository, so a slow persistence layer never adds latency to the
    /// request path it's logging (spec §4.4: request log is best-effort).
    pub fn new(repo: Arc<dyn MockRepository>, builtins: Arc<dyn BuiltinSource>) -> Arc<Self> {
        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<MockRequest>();
        let log_repo = repo.clone();
        tokio::spawn(async move {
            while let Some(request) = log_rx.recv().await {
                if let Err(err) = log_repo.log_request(request).await {
                    warn!(%err, "failed to persist mock request log entry");
                }
            }
        });
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
            repo,
            builtins,
            log_tx,
        })
    }

    /// Reloads servers left `Running` at the last shutdown (spec §4.4
    /// supplement: servers survive a process restart).
    pub async fn restore(&self) -> Result<()> {
        let mut servers = self.servers.write().await;
        for server in self.repo.list_servers().await? {
            if server.status == MockServerStatus::Running {
                servers.insert(server.id, server);
            }
        }
        Ok(())
    }

    pub async fn start(
        &self,
        name: impl Into<String>,
        state: StateConfig,
        endpoints: Vec<Endpoint>,
    ) -> Result<MockServer> {
        let mut server = MockServer::new(name, state);
        server.endpoints = endpoints;
        self.repo.put_server(server.clone()).await?;
        self.servers.write().await.insert(server.id, server.clone());
        Ok(server)
    }

    pub async fn stop(&self, id: MockServerId) -> Result<()> {
        let mut servers = self.servers.write().await;
        let server = servers.get_mut(&id).ok_or(Error::MockNotFound)?;
        server.status = MockServerStatus::Stopped;
        let snapshot = server.clone();
        drop(servers);
        self.repo.put_server(snapshot).await
    }

    pub async fn configure(&self, id: MockServerId, endpoints: Vec<Endpoint>) -> Result<()> {
        let mut servers = self.servers.write().await;
        let server = servers.get_mut(&id).ok_or(Error::MockNotFound)?;
        server.endpoints = endpoints;
        let snapshot = server.clone();
        drop(servers);
        self.repo.put_server(snapshot).await
    }

    pub async fn get(&self, id: MockServerId) -> Option<MockServer> {
        self.servers.read().await.get(&id).cloned()
    }

    /// The request log for a server, read back through the repository so
    /// entries written by the best-effort logging task are visible here
    /// (spec SPEC_FULL §4.4 supplement: `GET /__testmesh/requests/{id}`).
    pub async fn list_requests(&self, id: MockServerId) -> Result<Vec<MockRequest>> {
        self.repo.list_requests_for_server(id).await
    }

    /// Services one inbound request against `server_id` (spec §4.4's
    /// request lifecycle): match, mutate state, render, log. Returns
    /// [`Error::MockNotFound`] for a missing/stopped server and
    /// [`Error::MockNoMatch`] when no endpoint accepts the request.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_request(
        &self,
        server_id: MockServerId,
        method: &str,
        path: &str,
        headers: BTreeMap<String, String>,
        query: BTreeMap<String, String>,
        raw_body: Option<String>,
    ) -> Result<RenderedResponse> {
        let mut servers = self.servers.write().await;
        let server = servers
            .get_mut(&server_id)
            .filter(|s| s.status == MockServerStatus::Running)
            .ok_or(Error::MockNotFound)?;

        let parsed_body = raw_body
            .as_deref()
            .and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok())
            .map(Value::from);

        let matched = find_match(
            &server.endpoints,
            method,
            path,
            &headers,
            &query,
            raw_body.as_deref(),
            parsed_body.as_ref(),
        );

        let (endpoint_id, status, resp_headers, body, delay_ms) = match matched {
            Some(found) => {
                let endpoint_id = found.endpoint.id.clone();
                let response = found.endpoint.response.clone();
                apply_state_ops(&mut server.state, &response.state_ops, self.builtins.as_ref());
                let rendered = render_response(
                    &response,
                    &found.path_params,
                    &query,
                    &server.state,
                    self.builtins.clone(),
                );
                (Some(endpoint_id), rendered.0, rendered.1, rendered.2, response.delay_ms)
            }
            None => (None, 0, BTreeMap::new(), None, None),
        };
        drop(servers);

        // Honoured strictly, even on the happy path (spec §4.4 step 1).
        if let Some(delay_ms) = delay_ms.filter(|ms| *ms > 0) {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }

        let log_entry = MockRequest {
            id: MockRequestId::new(),
            server_id,
            method: method.to_string(),
            path: path.to_string(),
            headers,
            query,
            body: parsed_body,
            received_at: self.builtins.now(),
            matched_endpoint_id: endpoint_id.clone(),
        };
        let _ = self.log_tx.send(log_entry);

        if endpoint_id.is_none() {
            return Err(Error::MockNoMatch);
        }
        Ok(RenderedResponse {
            status,
            headers: resp_headers,
            body,
        })
    }
}

fn apply_state_ops(
    state: &mut BTreeMap<String, Value>,
    ops: &[StateOp],
    _builtins: &dyn BuiltinSource,
) {
    for op in ops {
        match op {
            StateOp::Set { key, value } => {
                state.insert(key.clone(), value.clone());
            }
            StateOp::Increment { key, by } => {
                let current = state.get(key).and_then(Value::as_f64).unwrap_or(0.0);
                state.insert(key.clone(), Value::Num(current + by));
            }
            StateOp::Delete { key } => {
                state.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testmesh_domain::{MatchConfig, ResponseConfig};
    use testmesh_foundation::SystemClock;

    struct NullRepo;

    #[async_trait::async_trait]
    impl MockRepository for NullRepo {
        async fn put_server(&self, _server: MockServer) -> Result<()> {
            Ok(())
        }
        async fn get_server(&self, _id: MockServerId) -> Result<Option<MockServer>> {
            Ok(None)
        }
        async fn list_servers(&self) -> Result<Vec<MockServer>> {
            Ok(Vec::new())
        }
        async fn delete_server(&self, _id: MockServerId) -> Result<()> {
            Ok(())
        }
        async fn log_request(&self, _request: MockRequest) -> Result<()> {
            Ok(())
        }
        async fn get_request(&self, _id: MockRequestId) -> Result<Option<MockRequest>> {
            Ok(None)
        }
        async fn list_requests_for_server(&self, _server_id: MockServerId) -> Result<Vec<MockRequest>> {
            Ok(Vec::new())
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            id: "e1".into(),
            method: "GET".into(),
            path: "/hello".into(),
            match_config: MatchConfig::default(),
            response: ResponseConfig {
                status: 200,
                body: Some(Value::Str("hi".into())),
                ..ResponseConfig::default()
            },
            priority: 0,
        }
    }

    #[tokio::test]
    async fn matched_request_renders_configured_response() {
        let fabric = MockFabric::new(Arc::new(NullRepo), Arc::new(SystemClock));
        let server = fabric.start("demo", StateConfig::default(), vec![endpoint()]).await.unwrap();
        let resp = fabric
            .handle_request(server.id, "GET", "/hello", BTreeMap::new(), BTreeMap::new(), None)
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn unmatched_request_is_mock_no_match() {
        let fabric = MockFabric::new(Arc::new(NullRepo), Arc::new(SystemClock));
        let server = fabric.start("demo", StateConfig::default(), vec![endpoint()]).await.unwrap();
        let err = fabric
            .handle_request(server.id, "GET", "/nope", BTreeMap::new(), BTreeMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MockNoMatch));
    }

    #[tokio::test]
    async fn stopped_server_is_not_found() {
        let fabric = MockFabric::new(Arc::new(NullRepo), Arc::new(SystemClock));
        let server = fabric.start("demo", StateConfig::default(), vec![endpoint()]).await.unwrap();
        fabric.stop(server.id).await.unwrap();
        let err = fabric
            .handle_request(server.id, "GET", "/hello", BTreeMap::new(), BTreeMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MockNotFound));
    }
}
