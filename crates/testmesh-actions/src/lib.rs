//! The Action trait, its cross-crate ports, the built-in action kinds, and
//! the registry that maps action-kind strings to implementations (spec §3,
//! §4.3).

mod action;
mod builtins;
mod registry;

pub use action::{
    Action, ActionContext, ContractControl, DatabaseClient, FlowRunner, KafkaClient, MockControl,
    StepResult,
};
pub use registry::ActionRegistry;
