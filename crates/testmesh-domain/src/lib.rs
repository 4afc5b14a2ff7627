//! Data model (spec §3) and repository interfaces (spec §6) for the
//! TestMesh execution core.

mod contract;
mod execution;
mod flow;
mod ids;
mod mock;
mod repository;
mod schedule;
mod value;

pub use contract::{
    BreakingChange, ChangeType, Contract, Interaction, Mismatch, MismatchType, Severity,
    Verification, VerificationStatus,
};
pub use execution::{Execution, ExecutionStatus, ExecutionStep, StepStatus};
pub use flow::{
    Backoff, Condition, ControlFlow, Definition, Flow, ForEach, Parallel, Retry, Step, StepBody,
    WaitUntil,
};
pub use ids::{
    ContractId, ExecutionId, FlowId, MockRequestId, MockServerId, ScheduleId, ScheduleRunId,
};
pub use mock::{
    Endpoint, MatchConfig, MockRequest, MockServer, MockServerStatus, ResponseConfig,
    StateConfig, StateOp,
};
pub use repository::{
    ContractRepository, ExecutionRepository, FlowRepository, MockRepository, ScheduleRepository,
};
pub use schedule::{OverlapPolicy, Schedule, ScheduleRun, ScheduleRunResult, ScheduleStatus};
pub use value::Value;
