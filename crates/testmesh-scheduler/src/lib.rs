//! Cron Scheduler (spec §4.8): fires flows on a recurring schedule with
//! overlap and retry policy, and previews upcoming fire times.

mod cron_expr;
mod tick;
mod validate;

pub use cron_expr::{next_fire, preview};
pub use tick::Scheduler;
pub use validate::{validate, ValidationResult};
