use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;

use super::RuleError;

/// Rule expressions are `cron(minute hour day-of-month month day-of-week year)`.
/// The `cron` crate wants a leading seconds field and has no `?`, so the
/// fields are shifted and `?` becomes `*`.
fn to_cron_schedule(expression: &str) -> Result<CronSchedule, RuleError> {
    let inner = expression
        .trim()
        .strip_prefix("cron(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| RuleError::InvalidExpression(expression.to_string()))?;
    let fields: Vec<&str> = inner.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(RuleError::InvalidCron(fields.len()));
    }
    let translated = fields
        .iter()
        .map(|field| if *field == "?" { "*" } else { *field })
        .collect::<Vec<_>>()
        .join(" ");
    Ok(CronSchedule::from_str(&format!("0 {translated}"))?)
}

pub fn validate_schedule_expression(expression: &str) -> Result<(), RuleError> {
    to_cron_schedule(expression).map(|_| ())
}

/// `None` once a pinned expression's instant has passed.
pub fn next_fire_after(
    expression: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, RuleError> {
    let schedule = to_cron_schedule(expression)?;
    Ok(schedule.after(&after).find(|next| *next > after))
}
