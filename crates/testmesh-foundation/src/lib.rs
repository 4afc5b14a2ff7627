//! Shared error types and time/id helpers for the TestMesh execution core.
//!
//! Every other crate in the workspace depends on this one and nothing else
//! in the reverse direction — it is the lowest level of the stack.

mod clock;
mod error;

pub use clock::{BuiltinSource, SystemClock};
pub use error::{Error, ErrorKind, Result};

/// Re-exported so downstream crates don't need their own `cancel` dependency line.
pub use tokio_util::sync::CancellationToken;
