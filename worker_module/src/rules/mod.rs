//! Cron-style schedule rules: the interface the job installs its next run
//! through, plus a SQLite-backed rule service and a runner that fires due
//! rules.

mod expression;
mod runner;
mod store;

use chrono::{DateTime, Utc};

pub use expression::{next_fire_after, validate_schedule_expression};
pub use runner::RuleRunner;
pub use store::SqliteRuleStore;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("cron parse error: {0}")]
    Cron(#[from] cron::error::Error),
    #[error("invalid schedule expression: {0}")]
    InvalidExpression(String),
    #[error("invalid cron expression (expected 6 fields, got {0})")]
    InvalidCron(usize),
    #[error("unknown rule state: {0}")]
    UnknownState(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Enabled,
    Disabled,
}

impl RuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleState::Enabled => "ENABLED",
            RuleState::Disabled => "DISABLED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RuleError> {
        match value {
            "ENABLED" => Ok(RuleState::Enabled),
            "DISABLED" => Ok(RuleState::Disabled),
            other => Err(RuleError::UnknownState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRule {
    pub name: String,
    pub schedule_expression: String,
    pub state: RuleState,
    pub updated_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl ScheduleRule {
    /// Next fire time after the later of the last install and the last fire.
    pub fn next_fire(&self) -> Result<Option<DateTime<Utc>>, RuleError> {
        let anchor = match self.last_fired_at {
            Some(fired) if fired > self.updated_at => fired,
            _ => self.updated_at,
        };
        next_fire_after(&self.schedule_expression, anchor)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> Result<bool, RuleError> {
        if self.state != RuleState::Enabled {
            return Ok(false);
        }
        Ok(matches!(self.next_fire()?, Some(next) if next <= now))
    }
}

/// Upsert-by-name access to the scheduling service.
pub trait RuleScheduler {
    fn put_rule(
        &self,
        name: &str,
        schedule_expression: &str,
        state: RuleState,
    ) -> Result<(), RuleError>;
}
