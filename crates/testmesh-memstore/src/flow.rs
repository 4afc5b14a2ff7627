use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use testmesh_domain::{Execution, ExecutionId, Flow, FlowId, FlowRepository, ExecutionRepository};
use testmesh_foundation::Result;
use tokio::sync::RwLock;

/// Keyed by [`FlowId`], mirroring the cache-over-store shape of the
/// teacher's `WorkspaceService` (minus the backing database: persistence
/// is explicitly out of scope here).
#[derive(Default)]
pub struct InMemoryFlowRepository {
    flows: RwLock<HashMap<FlowId, Flow>>,
}

impl InMemoryFlowRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl FlowRepository for InMemoryFlowRepository {
    async fn put(&self, flow: Flow) -> Result<()> {
        self.flows.write().await.insert(flow.id, flow);
        Ok(())
    }

    async fn get(&self, id: FlowId) -> Result<Option<Flow>> {
        Ok(self.flows.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Flow>> {
        Ok(self.flows.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: FlowId) -> Result<()> {
        self.flows.write().await.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<ExecutionId, Execution>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn put(&self, execution: Execution) -> Result<()> {
        self.executions.write().await.insert(execution.id, execution);
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn list_for_flow(&self, flow_id: FlowId) -> Result<Vec<Execution>> {
        Ok(self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.flow_id == flow_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let repo = InMemoryExecutionRepository::new();
        let execution = Execution::new(FlowId::new(), Utc::now());
        let id = execution.id;
        repo.put(execution).await.unwrap();
        let fetched = repo.get(id).await.unwrap();
        assert_eq!(fetched.unwrap().id, id);
    }

    #[tokio::test]
    async fn list_for_flow_filters_by_flow_id() {
        let repo = InMemoryExecutionRepository::new();
        let flow_id = FlowId::new();
        repo.put(Execution::new(flow_id, Utc::now())).await.unwrap();
        repo.put(Execution::new(FlowId::new(), Utc::now())).await.unwrap();
        let for_flow = repo.list_for_flow(flow_id).await.unwrap();
        assert_eq!(for_flow.len(), 1);
    }
}
