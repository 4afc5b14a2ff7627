//! Builtin value sources for the Variable Store's `builtin` scope (spec §4.1).
//!
//! The Variable Store evaluates `NOW`, `RANDOM_ID`, and `UUID` lazily on each
//! read. Tests want those reads to be deterministic, so the source is a
//! trait rather than a direct call to `Utc::now()`/`Uuid::new_v4()` —
//! the same seam the teacher's `time_travel::VirtualClock` provides for its
//! own cron scheduler.

use chrono::{DateTime, Utc};

/// Supplies the three builtin values the Variable Store exposes.
pub trait BuiltinSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
    /// A fresh RFC-4122-compatible identifier.
    fn random_id(&self) -> String;
    /// A fresh RFC-4122-compatible identifier (alias kept distinct from
    /// `random_id` so callers can distinguish intent in templates).
    fn uuid(&self) -> String {
        self.random_id()
    }
}

/// The real clock/id source used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl BuiltinSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn random_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_produces_distinct_ids() {
        let clock = SystemClock;
        assert_ne!(clock.random_id(), clock.random_id());
    }
}
