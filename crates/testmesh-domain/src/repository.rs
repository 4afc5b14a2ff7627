//! Repository interfaces (spec §6): persistence is explicitly out of scope
//! for the execution core, so every crate upstream of storage programs
//! against these traits. `testmesh-memstore` is the only implementation
//! shipped in this workspace.

use crate::{
    Contract, ContractId, Execution, ExecutionId, Flow, FlowId, MockRequest, MockRequestId,
    MockServer, MockServerId, Schedule, ScheduleId, ScheduleRun, ScheduleRunId, Verification,
};
use async_trait::async_trait;
use testmesh_foundation::Result;

#[async_trait]
pub trait FlowRepository: Send + Sync {
    async fn put(&self, flow: Flow) -> Result<()>;
    async fn get(&self, id: FlowId) -> Result<Option<Flow>>;
    async fn list(&self) -> Result<Vec<Flow>>;
    async fn delete(&self, id: FlowId) -> Result<()>;
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn put(&self, execution: Execution) -> Result<()>;
    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>>;
    async fn list_for_flow(&self, flow_id: FlowId) -> Result<Vec<Execution>>;
}

#[async_trait]
pub trait MockRepository: Send + Sync {
    async fn put_server(&self, server: MockServer) -> Result<()>;
    async fn get_server(&self, id: MockServerId) -> Result<Option<MockServer>>;
    async fn list_servers(&self) -> Result<Vec<MockServer>>;
    async fn delete_server(&self, id: MockServerId) -> Result<()>;

    async fn log_request(&self, request: MockRequest) -> Result<()>;
    async fn get_request(&self, id: MockRequestId) -> Result<Option<MockRequest>>;
    async fn list_requests_for_server(&self, server_id: MockServerId) -> Result<Vec<MockRequest>>;
}

#[async_trait]
pub trait ContractRepository: Send + Sync {
    async fn put_contract(&self, contract: Contract) -> Result<()>;
    async fn get_contract(&self, id: ContractId) -> Result<Option<Contract>>;
    async fn list_contracts_for(&self, consumer: &str, provider: &str) -> Result<Vec<Contract>>;

    async fn put_verification(&self, verification: Verification) -> Result<()>;
    async fn list_verifications(&self, contract_id: ContractId) -> Result<Vec<Verification>>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn put(&self, schedule: Schedule) -> Result<()>;
    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>>;
    async fn list(&self) -> Result<Vec<Schedule>>;
    async fn list_due(&self, as_of: chrono::DateTime<chrono::Utc>) -> Result<Vec<Schedule>>;

    async fn put_run(&self, run: ScheduleRun) -> Result<()>;
    async fn get_run(&self, id: ScheduleRunId) -> Result<Option<ScheduleRun>>;
    async fn list_runs_for_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<ScheduleRun>>;
    /// Most recent run for a schedule, used to decide overlap-policy
    /// behavior when a fire time arrives (spec §4.8).
    async fn latest_run(&self, schedule_id: ScheduleId) -> Result<Option<ScheduleRun>>;
}
