//! Bundles the external collaborators a step's Action may need, mirroring
//! [`testmesh_actions::ActionContext`]'s port fields so `FlowRuntime` can
//! build a fresh `ActionContext` per step without threading each port
//! through every call individually.

use std::sync::Arc;
use testmesh_actions::{ContractControl, DatabaseClient, FlowRunner, KafkaClient, MockControl};

#[derive(Clone, Default)]
pub struct Ports {
    pub http_client: Option<reqwest::Client>,
    pub mock_control: Option<Arc<dyn MockControl>>,
    pub contract_control: Option<Arc<dyn ContractControl>>,
    pub kafka_client: Option<Arc<dyn KafkaClient>>,
    pub database_client: Option<Arc<dyn DatabaseClient>>,
    pub flow_runner: Option<Arc<dyn FlowRunner>>,
}

impl Ports {
    pub fn http_client(&self) -> reqwest::Client {
        self.http_client.clone().unwrap_or_default()
    }
}
