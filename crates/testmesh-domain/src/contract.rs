//! Contract Engine data model (spec §4.5-§4.7): recorded interactions,
//! verification outcomes, and the breaking-change classification produced
//! by diffing two contract versions.

use crate::{ContractId, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A Pact-style contract: a named consumer/provider pair plus the
/// interactions recorded (or hand-authored) against it.
#[derive(Debug, Clone)]
pub struct Contract {
    pub id: ContractId,
    pub consumer: String,
    pub provider: String,
    /// Together with `consumer`/`provider`, keys a contract row uniquely
    /// (spec §3, §4.5).
    pub version: String,
    pub interactions: Vec<Interaction>,
    pub created_at: DateTime<Utc>,
}

/// One request/response pair the provider is expected to honor.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub description: String,
    /// State the provider must be set up in before this interaction is
    /// replayed, POSTed to the provider's state-setup endpoint ahead of the
    /// request itself (spec §4.6 step 1).
    pub provider_state: Option<String>,
    pub request_method: String,
    pub request_path: String,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<Value>,
    pub response_status: u16,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: Option<Value>,
}

/// The outcome of replaying a contract's interactions against a live
/// provider (spec §4.6).
#[derive(Debug, Clone)]
pub struct Verification {
    pub contract_id: ContractId,
    pub status: VerificationStatus,
    pub mismatches: Vec<Mismatch>,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Passed,
    Failed,
}

/// One discrepancy between an interaction's expectation and the provider's
/// actual response.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub interaction: String,
    pub mismatch_type: MismatchType,
    /// JSON-path-like locator within the body, or `$` for status/header/
    /// request-level mismatches (spec §4.6).
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub message: String,
}

/// Mirrors spec §4.6's `type ∈ {request, status, header, body}` taxonomy;
/// `body` is further split by the kind of structural discrepancy found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchType {
    Request,
    StatusCode,
    Header,
    BodyField,
    BodyType,
    MissingField,
    ExtraField,
}

/// A classified difference found when diffing two contract versions for
/// the same consumer/provider pair (spec §4.7).
#[derive(Debug, Clone)]
pub struct BreakingChange {
    pub old_contract_id: ContractId,
    pub new_contract_id: ContractId,
    pub interaction: String,
    pub change_type: ChangeType,
    pub severity: Severity,
    /// JSON-path-like locator of the change, e.g. `$.currency` (spec §4.7).
    pub path: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// What the change does to a consumer replaying this interaction.
    pub impact: String,
    /// What a consumer should do about it before the provider upgrade ships.
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    InteractionRemoved,
    InteractionAdded,
    RequestMethodChanged,
    RequestPathChanged,
    RequiredRequestHeaderRemoved,
    ResponseBodyExistenceChanged,
    ResponseFieldRemoved,
    ResponseFieldTypeChanged,
    StatusCodeChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Breaking,
}
