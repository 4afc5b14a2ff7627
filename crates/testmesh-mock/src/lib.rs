//! Mock Server Fabric (spec §4.4): many logical HTTP mock servers
//! multiplexed onto one listener by id, with priority-ordered endpoint
//! matching and templated responses.

mod control;
mod matcher;
mod registry;
mod render;
mod router;

pub use registry::{MockFabric, RenderedResponse};
pub use router::router;
