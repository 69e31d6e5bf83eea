//! Next-activation policy and rule installation.
//!
//! The job never relies on a recurring schedule. Each run computes a single
//! future instant, pins a cron expression to that exact minute, and upserts
//! it under its own rule name.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use rand::Rng;
use tracing::{error, info};

use crate::retry::RetryPolicy;
use crate::rules::{RuleError, RuleScheduler, RuleState};

pub const WEEKLY_FIRE_HOUR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleMode {
    /// Monday 02:00 UTC of the following week.
    Weekly,
    /// `base_minutes` from now, give or take up to `jitter_minutes`.
    Interval {
        base_minutes: i64,
        jitter_minutes: i64,
    },
}

pub fn compute_next(mode: &RescheduleMode, now: DateTime<Utc>) -> DateTime<Utc> {
    compute_next_with_rng(mode, now, &mut rand::thread_rng())
}

pub fn compute_next_with_rng<R: Rng + ?Sized>(
    mode: &RescheduleMode,
    now: DateTime<Utc>,
    rng: &mut R,
) -> DateTime<Utc> {
    match *mode {
        RescheduleMode::Weekly => next_monday(now),
        RescheduleMode::Interval {
            base_minutes,
            jitter_minutes,
        } => {
            let jitter = if jitter_minutes > 0 {
                rng.gen_range(-jitter_minutes..=jitter_minutes)
            } else {
                0
            };
            now + Duration::minutes(base_minutes + jitter)
        }
    }
}

// A Monday `now` still moves a full week ahead, so the job never fires twice
// on the same day.
fn next_monday(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let days_until_monday = if days_since_monday == 0 {
        7
    } else {
        7 - days_since_monday
    };
    let date = now.date_naive() + Duration::days(days_until_monday);
    let fire_at = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(WEEKLY_FIRE_HOUR));
    Utc.from_utc_datetime(&fire_at)
}

/// `cron(minute hour day month ? year)` pinned to `instant`.
pub fn one_shot_cron_expression(instant: DateTime<Utc>) -> String {
    format!(
        "cron({} {} {} {} ? {})",
        instant.minute(),
        instant.hour(),
        instant.day(),
        instant.month(),
        instant.year()
    )
}

/// Installs `instant` as the next activation of `rule_name` and returns the
/// expression written.
pub fn install_next_run(
    rules: &dyn RuleScheduler,
    rule_name: &str,
    instant: DateTime<Utc>,
    retry: RetryPolicy,
) -> Result<String, RuleError> {
    let expression = one_shot_cron_expression(instant);
    info!(
        "installing rule {} with schedule {} (next trigger time {})",
        rule_name, expression, instant
    );
    match retry.run("rule install", || {
        rules.put_rule(rule_name, &expression, RuleState::Enabled)
    }) {
        Ok(()) => Ok(expression),
        Err(err) => {
            error!(
                "FAILED to reinstall rule {}; the recurring job will not fire again until it is reinstalled: {}",
                rule_name, err
            );
            Err(err)
        }
    }
}
