//! The `Action` trait (spec §9: "a unit of work identified by a kind
//! string; invoked by the Flow Runtime with a typed config and a Variable
//! Store reference; returns a `StepResult` or fails") and the ports it
//! dispatches through for concerns that live in other crates.

use async_trait::async_trait;
use std::collections::BTreeMap;
use testmesh_domain::Value;
use testmesh_expr::VariableStore;
use testmesh_foundation::Result;
use tokio_util::sync::CancellationToken;

/// The outcome of a successful action invocation (spec §4.3 step 4).
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub output: BTreeMap<String, Value>,
    pub raw: Option<Value>,
}

impl StepResult {
    pub fn with_output(output: BTreeMap<String, Value>) -> Self {
        Self { output, raw: None }
    }
}

/// Everything an action invocation needs beyond its own config: the
/// Variable Store it reads/writes, its cancellation scope, and ports into
/// the other execution-core components a built-in action may need to
/// drive (mock fabric, contract engine, sub-flow execution). Actions never
/// depend on those crates directly — `testmesh-runtime` wires the concrete
/// implementations in at startup, keeping `testmesh-actions` free of a
/// dependency cycle back onto `testmesh-runtime`/`testmesh-mock`.
pub struct ActionContext<'a> {
    pub store: &'a mut VariableStore,
    pub cancel: CancellationToken,
    pub http_client: reqwest::Client,
    pub mock_control: Option<std::sync::Arc<dyn MockControl>>,
    pub contract_control: Option<std::sync::Arc<dyn ContractControl>>,
    pub kafka_client: Option<std::sync::Arc<dyn KafkaClient>>,
    pub database_client: Option<std::sync::Arc<dyn DatabaseClient>>,
    pub flow_runner: Option<std::sync::Arc<dyn FlowRunner>>,
}

/// One registered kind of work (spec §4.3's Action Registry).
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, config: &Value, ctx: &mut ActionContext<'_>) -> Result<StepResult>;
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Action")
    }
}

/// Port into the Mock Server Fabric for `mock_server_*` actions.
#[async_trait]
pub trait MockControl: Send + Sync {
    async fn start(&self, name: &str, config: &Value) -> Result<Value>;
    async fn stop(&self, server_id: &str) -> Result<()>;
    async fn configure(&self, server_id: &str, config: &Value) -> Result<()>;
}

/// Port into the Contract Engine for `contract_*` actions.
#[async_trait]
pub trait ContractControl: Send + Sync {
    async fn generate(&self, execution_id: &str, config: &Value) -> Result<Value>;
    async fn verify(&self, contract_id: &str, base_url: &str, state_setup_url: Option<&str>) -> Result<Value>;
    async fn diff(&self, old_contract_id: &str, new_contract_id: &str) -> Result<Value>;
}

/// Port for `kafka_publish`/`kafka_consume` actions. Kafka itself is an
/// external collaborator (spec §3): this port is the seam a real client
/// (or a test double) plugs into.
#[async_trait]
pub trait KafkaClient: Send + Sync {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &Value) -> Result<()>;
    async fn consume_one(&self, topic: &str, timeout_ms: u64) -> Result<Option<Value>>;
}

/// Port for `database_query` actions.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn query(&self, statement: &str, params: &[Value]) -> Result<Value>;
}

/// Port for `run_flow` actions, implemented by `testmesh-runtime`'s
/// `FlowRuntime`.
#[async_trait]
pub trait FlowRunner: Send + Sync {
    async fn run_flow(
        &self,
        flow_id: &str,
        inputs: BTreeMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<BTreeMap<String, Value>>;
}
