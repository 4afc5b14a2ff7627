//! Contract Engine (spec §4.5-§4.7): generator, verifier, and differ for
//! Pact-style consumer/provider contracts.

mod control;
mod differ;
mod generator;
mod verifier;

pub use control::ContractEngine;
pub use differ::{diff, summarize, Summary};
pub use generator::{generate_from_execution, import_pact};
pub use verifier::Verifier;
