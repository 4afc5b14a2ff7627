//! Assembles the concrete adapters behind every port (spec §9): mock
//! fabric and contract engine wired into `testmesh-runtime`'s `Ports`,
//! repositories backed by `testmesh-memstore`. Kafka/database clients are
//! left unset — those collaborators are external systems a deployment
//! supplies, not something this binary fabricates.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use testmesh_actions::{ContractControl, FlowRunner, MockControl};
use testmesh_contracts::ContractEngine;
use testmesh_domain::Value;
use testmesh_foundation::{BuiltinSource, Error, Result, SystemClock};
use testmesh_memstore::{
    InMemoryContractRepository, InMemoryExecutionRepository, InMemoryFlowRepository,
    InMemoryMockRepository, InMemoryScheduleRepository,
};
use testmesh_mock::MockFabric;
use testmesh_runtime::{FlowRuntime, Ports};
use tokio_util::sync::CancellationToken;

/// A `run_flow` action dispatched by a step needs a handle to the very
/// `FlowRuntime` that's dispatching it; `Weak` breaks the `Arc` cycle that
/// would otherwise result from baking that handle into `Ports` up front.
struct SelfFlowRunner(Weak<FlowRuntime>);

#[async_trait]
impl FlowRunner for SelfFlowRunner {
    async fn run_flow(
        &self,
        flow_id: &str,
        inputs: BTreeMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<BTreeMap<String, Value>> {
        let runtime = self
            .0
            .upgrade()
            .ok_or_else(|| Error::action_error("runtime shut down"))?;
        runtime.run_flow(flow_id, inputs, cancel).await
    }
}

pub struct Workspace {
    pub builtins: Arc<dyn BuiltinSource>,
    pub flows: Arc<InMemoryFlowRepository>,
    pub executions: Arc<InMemoryExecutionRepository>,
    pub contracts: Arc<InMemoryContractRepository>,
    pub schedules: Arc<InMemoryScheduleRepository>,
    pub mock_fabric: Arc<MockFabric>,
    pub runtime: Arc<FlowRuntime>,
}

impl Workspace {
    pub async fn assemble() -> anyhow::Result<Self> {
        let builtins: Arc<dyn BuiltinSource> = Arc::new(SystemClock);
        let flows = InMemoryFlowRepository::new();
        let executions = InMemoryExecutionRepository::new();
        let contracts = InMemoryContractRepository::new();
        let schedules = InMemoryScheduleRepository::new();
        let mock_repo = InMemoryMockRepository::new();

        let mock_fabric = MockFabric::new(mock_repo, builtins.clone());
        mock_fabric.restore().await?;

        let contract_engine = Arc::new(ContractEngine::new(
            executions.clone(),
            flows.clone(),
            contracts.clone(),
            builtins.clone(),
        ));

        let runtime = Arc::new_cyclic(|weak| {
            let ports = Ports {
                mock_control: Some(mock_fabric.clone() as Arc<dyn MockControl>),
                contract_control: Some(contract_engine as Arc<dyn ContractControl>),
                flow_runner: Some(Arc::new(SelfFlowRunner(weak.clone())) as Arc<dyn FlowRunner>),
                ..Ports::default()
            };
            FlowRuntime::new(flows.clone(), builtins.clone(), ports)
        });

        Ok(Self {
            builtins,
            flows,
            executions,
            contracts,
            schedules,
            mock_fabric,
            runtime,
        })
    }
}
