//! Cron expression parsing and next-fire computation (spec §4.8), grounded
//! on the teacher's `time_travel::cron::CronJob::calculate_next_execution`
//! (parse on every call, `schedule.after(&from).next()`), generalized from
//! a single virtual clock to per-`Schedule` IANA timezone math.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use testmesh_foundation::{Error, Result};

/// The `cron` crate requires an explicit seconds field; spec §4.8 spells
/// out standard five-field expressions plus the common presets, so both
/// are translated to the six-field form here rather than pushed onto
/// every caller.
fn normalize(expr: &str) -> String {
    let expr = match expr.trim() {
        "@hourly" => "0 * * * *",
        "@daily" | "@midnight" => "0 0 * * *",
        "@weekly" => "0 0 * * 0",
        "@monthly" => "0 0 1 * *",
        "@yearly" | "@annually" => "0 0 1 1 *",
        other => other,
    };
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

fn parse(expr: &str) -> Result<CronSchedule> {
    CronSchedule::from_str(&normalize(expr))
        .map_err(|e| Error::config_invalid(format!("invalid cron expression '{expr}': {e}")))
}

fn parse_timezone(timezone: &str) -> Result<Tz> {
    Tz::from_str(timezone).map_err(|_| Error::config_invalid(format!("unknown IANA timezone: {timezone}")))
}

/// The next fire time strictly after `after`, computed in `timezone` then
/// converted back to UTC. DST-skipped local times resolve to the next
/// existing instant and duplicated local times fire once, since both are
/// handled by `chrono`'s own `TimeZone::from_local_datetime` resolution
/// that the `cron` crate's iterator relies on.
pub fn next_fire(cron_expr: &str, timezone: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = parse(cron_expr)?;
    let tz = parse_timezone(timezone)?;
    let after_local = after.with_timezone(&tz);
    schedule
        .after(&after_local)
        .next()
        .map(|fire| fire.with_timezone(&Utc))
        .ok_or_else(|| Error::config_invalid(format!("cron expression '{cron_expr}' never fires again")))
}

/// Validates a cron expression/timezone pair and previews the next `count`
/// fire times (spec §4.8's `Validate(cron, timezone, count)`).
pub fn preview(cron_expr: &str, timezone: &str, after: DateTime<Utc>, count: usize) -> Result<Vec<DateTime<Utc>>> {
    let schedule = parse(cron_expr)?;
    let tz = parse_timezone(timezone)?;
    let after_local = after.with_timezone(&tz);
    Ok(schedule.after(&after_local).take(count).map(|fire| fire.with_timezone(&Utc)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn hourly_preset_fires_on_the_hour() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 10, 15, 0).unwrap();
        let next = next_fire("@hourly", "UTC", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn five_field_expression_is_accepted() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_fire("0 9 * * *", "UTC", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn preview_returns_requested_count() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let fires = preview("@daily", "UTC", after, 3).unwrap();
        assert_eq!(fires.len(), 3);
    }

    #[test]
    fn invalid_expression_is_config_invalid() {
        assert!(next_fire("not a cron expression", "UTC", Utc::now()).is_err());
    }

    #[test]
    fn unknown_timezone_is_config_invalid() {
        assert!(next_fire("@daily", "Not/A_Zone", Utc::now()).is_err());
    }
}
