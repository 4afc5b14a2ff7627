//! Action Registry (spec §4.3's Action Registry row): maps a kind string to
//! its [`Action`] implementation. Flow loading validates every step's
//! `action` against `contains()` before execution begins (spec.md's
//! "unknown kinds are rejected at load time, not at step dispatch").

use crate::action::Action;
use crate::builtins;
use std::collections::HashMap;
use std::sync::Arc;
use testmesh_foundation::Error;

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every action kind named in spec §3's
    /// Action Registry row.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("http_request", Arc::new(builtins::HttpRequestAction));
        registry.register("database_query", Arc::new(builtins::DatabaseQueryAction));
        registry.register("delay", Arc::new(builtins::DelayAction));
        registry.register("log", Arc::new(builtins::LogAction));
        registry.register("assert", Arc::new(builtins::AssertAction));
        registry.register("transform", Arc::new(builtins::TransformAction));
        registry.register("kafka_publish", Arc::new(builtins::KafkaPublishAction));
        registry.register("kafka_consume", Arc::new(builtins::KafkaConsumeAction));
        registry.register("mock_server_start", Arc::new(builtins::MockServerStartAction));
        registry.register("mock_server_stop", Arc::new(builtins::MockServerStopAction));
        registry.register(
            "mock_server_configure",
            Arc::new(builtins::MockServerConfigureAction),
        );
        registry.register("contract_generate", Arc::new(builtins::ContractGenerateAction));
        registry.register("contract_verify", Arc::new(builtins::ContractVerifyAction));
        registry.register("contract_diff", Arc::new(builtins::ContractDiffAction));
        registry.register("run_flow", Arc::new(builtins::RunFlowAction));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(kind.into(), action);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.actions.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Action>, Error> {
        self.actions
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::action_unknown(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_spec_kind() {
        let registry = ActionRegistry::with_builtins();
        for kind in [
            "http_request",
            "database_query",
            "delay",
            "log",
            "assert",
            "transform",
            "kafka_publish",
            "kafka_consume",
            "mock_server_start",
            "mock_server_stop",
            "mock_server_configure",
            "contract_generate",
            "contract_verify",
            "contract_diff",
            "run_flow",
        ] {
            assert!(registry.contains(kind), "missing builtin action: {kind}");
        }
        assert!(!registry.contains("not_a_real_action"));
    }

    #[test]
    fn unknown_kind_is_action_unknown_error() {
        let registry = ActionRegistry::new();
        let err = registry.get("nope").unwrap_err();
        assert_eq!(err.kind(), testmesh_foundation::ErrorKind::ActionUnknown);
    }
}
