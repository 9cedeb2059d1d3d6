//! Cron Evaluator (spec §4.1): turns a crontab string or preset alias into a
//! next-fire decision relative to a job's local wall-clock time.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use croner::Cron;

use crate::error::{Result, SchedulerError};

/// Schedule aliases expanded at job-creation time (spec §4.1, §6).
pub const PRESET_HOURLY: &str = "@hourly";
pub const PRESET_DAILY: &str = "@daily";
pub const PRESET_WEEKLY: &str = "@weekly";
pub const PRESET_WEEKDAY_DAILY: &str = "@weekdaydaily";

/// Parses a 5-field crontab expression (or preset alias) and computes
/// next-fire times against a job's local timezone.
pub struct CronEvaluator;

impl CronEvaluator {
    /// Expand a preset alias into a concrete 5-field crontab string, using
    /// the job's `start_dt` minute/hour and `weekday = start_dt.weekday()+1`
    /// (Monday=1 … Sunday=7), as spec §4.1 specifies.
    ///
    /// A non-empty `schedule_interval_crontab` field in the caller's input
    /// overrides preset selection entirely (spec §6) — that precedence is
    /// enforced by the caller (`request::add_job`/`edit_job`), not here:
    /// this function only performs the expansion itself.
    pub fn expand_preset(preset: &str, start_dt: NaiveDateTime) -> Result<String> {
        use chrono::Datelike;

        let minute = start_dt.format("%-M").to_string();
        let hour = start_dt.format("%-H").to_string();
        let weekday = start_dt.weekday().num_days_from_monday() + 1; // Monday=1..Sunday=7

        let expanded = match preset {
            PRESET_HOURLY => format!("{} * * * *", minute),
            PRESET_DAILY => format!("{} {} * * *", minute, hour),
            PRESET_WEEKLY => format!("{} {} * * {}", minute, hour, weekday),
            PRESET_WEEKDAY_DAILY => format!("{} {} * * 1-5", minute, hour),
            other => {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "unknown preset alias: {other}"
                )))
            }
        };

        Ok(expanded)
    }

    /// Expand an explicit weekday list (1-7, Monday=1) into a crontab string
    /// using the job's start-time minute/hour (spec §6 "other").
    pub fn expand_weekday_list(start_dt: NaiveDateTime, weekdays: &[i64]) -> Result<String> {
        if weekdays.is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "weekday_to_run must not be empty".into(),
            ));
        }
        if weekdays.iter().any(|d| !(1..=7).contains(d)) {
            return Err(SchedulerError::InvalidSchedule(format!(
                "weekday_to_run entries must be within 1-7, got {weekdays:?}"
            )));
        }

        let minute = start_dt.format("%-M").to_string();
        let hour = start_dt.format("%-H").to_string();
        let csv = weekdays
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");

        Ok(format!("{} {} * * {}", minute, hour, csv))
    }

    /// `true` iff `expr` is a syntactically valid 5-field crontab expression.
    pub fn valid_crontab_string(expr: &str) -> bool {
        Cron::new(expr).parse().is_ok()
    }

    /// Compute the next fire time strictly after `current_local`, in the
    /// given IANA timezone. Ties break upward: the result is never equal to
    /// `current_local`.
    pub fn next_fire(expr: &str, timezone: &str, current_local: NaiveDateTime) -> Result<NaiveDateTime> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidSchedule(format!("unknown timezone: {timezone}")))?;

        let schedule = Cron::new(expr)
            .parse()
            .map_err(|e| SchedulerError::InvalidSchedule(format!("{expr}: {e}")))?;

        let current_zoned = match tz.from_local_datetime(&current_local) {
            chrono::LocalResult::Single(dt) => dt,
            chrono::LocalResult::Ambiguous(dt, _) => dt,
            chrono::LocalResult::None => tz.from_utc_datetime(&current_local),
        };

        let next = schedule
            .find_next_occurrence(&current_zoned, false)
            .map_err(|e| SchedulerError::InvalidSchedule(format!("{expr}: {e}")))?;

        Ok(next.naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn daily_preset_expands_using_start_minute_and_hour() {
        let start = dt(2024, 1, 1, 9, 30);
        let expanded = CronEvaluator::expand_preset(PRESET_DAILY, start).unwrap();
        assert_eq!(expanded, "30 9 * * *");
    }

    #[test]
    fn weekly_preset_uses_monday_eq_1_weekday() {
        // 2024-01-01 is a Monday.
        let start = dt(2024, 1, 1, 9, 30);
        let expanded = CronEvaluator::expand_preset(PRESET_WEEKLY, start).unwrap();
        assert_eq!(expanded, "30 9 * * 1");
    }

    #[test]
    fn weekdaydaily_preset_runs_monday_through_friday() {
        let start = dt(2024, 1, 1, 9, 30);
        let expanded = CronEvaluator::expand_preset(PRESET_WEEKDAY_DAILY, start).unwrap();
        assert_eq!(expanded, "30 9 * * 1-5");
    }

    #[test]
    fn weekday_list_rejects_out_of_range_values() {
        let start = dt(2024, 1, 1, 9, 30);
        let result = CronEvaluator::expand_weekday_list(start, &[1, 8]);
        assert!(result.is_err());
    }

    #[test]
    fn weekday_list_composes_csv() {
        let start = dt(2024, 1, 1, 9, 30);
        let expanded = CronEvaluator::expand_weekday_list(start, &[1, 3, 5]).unwrap();
        assert_eq!(expanded, "30 9 * * 1,3,5");
    }

    #[test]
    fn invalid_crontab_string_is_rejected() {
        assert!(!CronEvaluator::valid_crontab_string("not a cron"));
    }

    #[test]
    fn valid_crontab_string_is_accepted() {
        assert!(CronEvaluator::valid_crontab_string("30 9 * * *"));
    }

    #[test]
    fn next_fire_is_strictly_after_current() {
        let current = dt(2024, 1, 1, 9, 30);
        let next = CronEvaluator::next_fire("30 9 * * *", "US/Eastern", current).unwrap();
        assert!(next > current);
        assert_eq!(next, dt(2024, 1, 2, 9, 30));
    }

    #[test]
    fn preset_expansion_next_fire_matches_raw_crontab_next_fire() {
        let start = dt(2024, 1, 1, 9, 30);
        let preset_expr = CronEvaluator::expand_preset(PRESET_DAILY, start).unwrap();
        let raw_expr = "30 9 * * *";
        let current = dt(2024, 1, 5, 0, 0);
        let from_preset = CronEvaluator::next_fire(&preset_expr, "UTC", current).unwrap();
        let from_raw = CronEvaluator::next_fire(raw_expr, "UTC", current).unwrap();
        assert_eq!(from_preset, from_raw);
    }
}
