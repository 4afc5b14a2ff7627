use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use testmesh_domain::{Contract, ContractId, ContractRepository, Verification};
use testmesh_foundation::Result;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryContractRepository {
    contracts: RwLock<HashMap<ContractId, Contract>>,
    verifications: RwLock<HashMap<ContractId, Vec<Verification>>>,
}

impl InMemoryContractRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ContractRepository for InMemoryContractRepository {
    async fn put_contract(&self, contract: Contract) -> Result<()> {
        self.contracts.write().await.insert(contract.id, contract);
        Ok(())
    }

    async fn get_contract(&self, id: ContractId) -> Result<Option<Contract>> {
        Ok(self.contracts.read().await.get(&id).cloned())
    }

    async fn list_contracts_for(&self, consumer: &str, provider: &str) -> Result<Vec<Contract>> {
        Ok(self
            .contracts
            .read()
            .await
            .values()
            .filter(|c| c.consumer == consumer && c.provider == provider)
            .cloned()
            .collect())
    }

    async fn put_verification(&self, verification: Verification) -> Result<()> {
        self.verifications
            .write()
            .await
            .entry(verification.contract_id)
            .or_default()
            .push(verification);
        Ok(())
    }

    async fn list_verifications(&self, contract_id: ContractId) -> Result<Vec<Verification>> {
        Ok(self
            .verifications
            .read()
            .await
            .get(&contract_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use testmesh_domain::VerificationStatus;

    #[tokio::test]
    async fn verifications_accumulate_per_contract() {
        let repo = InMemoryContractRepository::new();
        let contract_id = ContractId::new();
        let verification = Verification {
            contract_id,
            status: VerificationStatus::Passed,
            mismatches: Vec::new(),
            verified_at: Utc::now(),
        };
        repo.put_verification(verification).await.unwrap();
        assert_eq!(repo.list_verifications(contract_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_contracts_for_filters_by_pair() {
        let repo = InMemoryContractRepository::new();
        let contract = Contract {
            id: ContractId::new(),
            consumer: "web".to_string(),
            provider: "billing".to_string(),
            version: "1.0.0".to_string(),
            interactions: Vec::new(),
            created_at: Utc::now(),
        };
        repo.put_contract(contract).await.unwrap();
        assert_eq!(repo.list_contracts_for("web", "billing").await.unwrap().len(), 1);
        assert_eq!(repo.list_contracts_for("web", "other").await.unwrap().len(), 0);
    }
}
