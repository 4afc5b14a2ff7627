//! Error taxonomy for the TestMesh execution core (spec §7).

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// One variant per row of the spec's error taxonomy. Each carries a message
/// and an optional boxed cause, mirroring the teacher's `mockforge_core::Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed flow/step/endpoint: {message}")]
    ConfigInvalid {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("unregistered action kind: {kind}")]
    ActionUnknown { kind: String },

    #[error("undefined variable: {path}")]
    VariableUndefined { path: String },

    #[error("assertion failed: {expression}")]
    AssertionFailed { expression: String },

    #[error("action error: {message}")]
    ActionError {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("mock server not found or stopped")]
    MockNotFound,

    #[error("no matching endpoint found")]
    MockNoMatch,

    #[error("contract verification produced mismatches")]
    VerifyMismatch,

    #[error("prior run still in flight, overlap not allowed")]
    ScheduleOverlap,

    #[error("repository error: {message}")]
    RepositoryError {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// The error's row in the spec's error taxonomy (spec.md §7), used by
    /// callers that branch on propagation policy rather than message text.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigInvalid { .. } => ErrorKind::ConfigInvalid,
            Self::ActionUnknown { .. } => ErrorKind::ActionUnknown,
            Self::VariableUndefined { .. } => ErrorKind::VariableUndefined,
            Self::AssertionFailed { .. } => ErrorKind::AssertionFailed,
            Self::ActionError { .. } => ErrorKind::ActionError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::MockNotFound => ErrorKind::MockNotFound,
            Self::MockNoMatch => ErrorKind::MockNoMatch,
            Self::VerifyMismatch => ErrorKind::VerifyMismatch,
            Self::ScheduleOverlap => ErrorKind::ScheduleOverlap,
            Self::RepositoryError { .. } => ErrorKind::RepositoryError,
        }
    }

    /// Whether the step dispatcher should subject this error to the step's
    /// own retry policy (spec.md §7 propagation policy).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AssertionFailed
                | ErrorKind::ActionError
                | ErrorKind::Timeout
                | ErrorKind::VariableUndefined
        )
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            cause: None,
        }
    }

    pub fn action_unknown(kind: impl Into<String>) -> Self {
        Self::ActionUnknown { kind: kind.into() }
    }

    pub fn variable_undefined(path: impl Into<String>) -> Self {
        Self::VariableUndefined { path: path.into() }
    }

    pub fn assertion_failed(expression: impl Into<String>) -> Self {
        Self::AssertionFailed {
            expression: expression.into(),
        }
    }

    pub fn action_error(message: impl Into<String>) -> Self {
        Self::ActionError {
            message: message.into(),
            cause: None,
        }
    }

    pub fn action_error_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ActionError {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn repository_error(message: impl Into<String>) -> Self {
        Self::RepositoryError {
            message: message.into(),
            cause: None,
        }
    }
}

/// Discriminant mirroring the rows of spec.md §7's error taxonomy table,
/// independent of the message text carried in a given [`Error`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigInvalid,
    ActionUnknown,
    VariableUndefined,
    AssertionFailed,
    ActionError,
    Timeout,
    Cancelled,
    MockNotFound,
    MockNoMatch,
    VerifyMismatch,
    ScheduleOverlap,
    RepositoryError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(Error::assertion_failed("x == 1").is_retriable());
        assert!(Error::action_error("boom").is_retriable());
        assert!(!Error::Cancelled.is_retriable());
        assert!(!Error::action_unknown("unknown_kind").is_retriable());
    }
}
