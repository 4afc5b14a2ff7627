//! In-memory implementations of every repository trait in
//! `testmesh-domain::repository` (spec §6): a `tokio::sync::RwLock`-guarded
//! `HashMap` per entity, with no persistence across process restarts.

mod contract;
mod flow;
mod mock;
mod schedule;

pub use contract::InMemoryContractRepository;
pub use flow::{InMemoryExecutionRepository, InMemoryFlowRepository};
pub use mock::InMemoryMockRepository;
pub use schedule::InMemoryScheduleRepository;
