use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use testmesh_domain::{MockRepository, MockRequest, MockRequestId, MockServer, MockServerId};
use testmesh_foundation::Result;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryMockRepository {
    servers: RwLock<HashMap<MockServerId, MockServer>>,
    requests: RwLock<HashMap<MockRequestId, MockRequest>>,
}

impl InMemoryMockRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl MockRepository for InMemoryMockRepository {
    async fn put_server(&self, server: MockServer) -> Result<()> {
        self.servers.write().await.insert(server.id, server);
        Ok(())
    }

    async fn get_server(&self, id: MockServerId) -> Result<Option<MockServer>> {
        Ok(self.servers.read().await.get(&id).cloned())
    }

    async fn list_servers(&self) -> Result<Vec<MockServer>> {
        Ok(self.servers.read().await.values().cloned().collect())
    }

    async fn delete_server(&self, id: MockServerId) -> Result<()> {
        self.servers.write().await.remove(&id);
        Ok(())
    }

    async fn log_request(&self, request: MockRequest) -> Result<()> {
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }

    async fn get_request(&self, id: MockRequestId) -> Result<Option<MockRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn list_requests_for_server(&self, server_id: MockServerId) -> Result<Vec<MockRequest>> {
        let mut requests: Vec<MockRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.server_id == server_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.received_at);
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testmesh_domain::MockServerStatus;

    #[tokio::test]
    async fn requests_for_server_are_sorted_by_received_at() {
        let repo = InMemoryMockRepository::new();
        let server = MockServer {
            id: MockServerId::new(),
            name: "billing".to_string(),
            status: MockServerStatus::Running,
            endpoints: Vec::new(),
            state: Default::default(),
        };
        repo.put_server(server.clone()).await.unwrap();
        let fetched = repo.get_server(server.id).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(repo.list_requests_for_server(server.id).await.unwrap().len(), 0);
    }
}
