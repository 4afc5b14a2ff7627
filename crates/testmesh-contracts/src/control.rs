//! Adapts the generator/verifier/differ to the `contract_*` actions' port
//! (`testmesh_actions::ContractControl`).

use crate::differ::{diff, summarize};
use crate::generator::generate_from_execution;
use crate::verifier::Verifier;
use async_trait::async_trait;
use std::sync::Arc;
use testmesh_actions::ContractControl;
use testmesh_domain::{
    ContractId, ContractRepository, ExecutionId, ExecutionRepository, FlowRepository, Value,
    VerificationStatus,
};
use testmesh_foundation::{BuiltinSource, Error, Result};

pub struct ContractEngine {
    executions: Arc<dyn ExecutionRepository>,
    flows: Arc<dyn FlowRepository>,
    contracts: Arc<dyn ContractRepository>,
    builtins: Arc<dyn BuiltinSource>,
    verifier: Verifier,
}

impl ContractEngine {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        flows: Arc<dyn FlowRepository>,
        contracts: Arc<dyn ContractRepository>,
        builtins: Arc<dyn BuiltinSource>,
    ) -> Self {
        Self {
            executions,
            flows,
            contracts,
            builtins,
            verifier: Verifier::new(),
        }
    }
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse().map_err(|_| Error::config_invalid(format!("invalid {what}: {raw}")))
}

#[async_trait]
impl ContractControl for ContractEngine {
    async fn generate(&self, execution_id: &str, config: &Value) -> Result<Value> {
        let execution_id: ExecutionId = parse_id(execution_id, "execution id")?;
        let execution = self
            .executions
            .get(execution_id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown execution: {execution_id}")))?;
        let flow = self
            .flows
            .get(execution.flow_id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown flow: {}", execution.flow_id)))?;
        let consumer = config.get_path("consumer").and_then(Value::as_str).unwrap_or("consumer");
        let provider = config.get_path("provider").and_then(Value::as_str).unwrap_or("provider");
        let version = config.get_path("version").and_then(Value::as_str).unwrap_or("1.0.0");

        let contract =
            generate_from_execution(consumer, provider, version, &flow, &execution, self.builtins.as_ref());
        let id = contract.id;
        let interaction_count = contract.interactions.len();
        self.contracts.put_contract(contract).await?;
        Ok(Value::Object(
            [
                ("contract_id".to_string(), Value::Str(id.to_string())),
                ("interaction_count".to_string(), Value::Num(interaction_count as f64)),
            ]
            .into_iter()
            .collect(),
        ))
    }

    async fn verify(&self, contract_id: &str, base_url: &str, state_setup_url: Option<&str>) -> Result<Value> {
        let contract_id: ContractId = parse_id(contract_id, "contract id")?;
        let contract = self
            .contracts
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown contract: {contract_id}")))?;
        let verification =
            self.verifier.verify(&contract, base_url, state_setup_url, self.builtins.as_ref()).await?;
        let status = match verification.status {
            VerificationStatus::Passed => "passed",
            VerificationStatus::Failed => "failed",
        };
        let mismatch_count = verification.mismatches.len();
        self.contracts.put_verification(verification).await?;
        Ok(Value::Object(
            [
                ("status".to_string(), Value::Str(status.to_string())),
                ("mismatch_count".to_string(), Value::Num(mismatch_count as f64)),
            ]
            .into_iter()
            .collect(),
        ))
    }

    async fn diff(&self, old_contract_id: &str, new_contract_id: &str) -> Result<Value> {
        let old_id: ContractId = parse_id(old_contract_id, "contract id")?;
        let new_id: ContractId = parse_id(new_contract_id, "contract id")?;
        let old = self
            .contracts
            .get_contract(old_id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown contract: {old_id}")))?;
        let new = self
            .contracts
            .get_contract(new_id)
            .await?
            .ok_or_else(|| Error::config_invalid(format!("unknown contract: {new_id}")))?;

        let changes = diff(&old, &new);
        let summary = summarize(&changes);
        Ok(Value::Object(
            [
                ("critical".to_string(), Value::Num(summary.critical as f64)),
                ("major".to_string(), Value::Num(summary.major as f64)),
                ("minor".to_string(), Value::Num(summary.minor as f64)),
                ("total".to_string(), Value::Num(summary.total as f64)),
            ]
            .into_iter()
            .collect(),
        ))
    }
}
