pub mod config;
pub mod event;
pub mod generator;
pub mod history;
pub mod identity;
pub mod job;
pub mod mention;
pub mod notifier;
pub mod prompt;
pub mod reschedule;
pub mod retry;
pub mod rules;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ConfigError, WorkerConfig};
pub use event::{classify_event, dispatch_event, EventError, HandlerResponse, InboundEvent};
pub use history::{AdviceHistory, AdviceRecord, AdviceStore, HistoryError, SqliteAdviceStore};
pub use identity::parse_rule_name;
pub use job::{AdviceJob, JobError, JobReport, JobSettings};
pub use mention::{MentionError, MentionResponder, MentionSettings};
pub use reschedule::{compute_next, one_shot_cron_expression, RescheduleMode};
pub use retry::RetryPolicy;
pub use runtime::{Runtime, RuntimeError};
pub use rules::{RuleError, RuleRunner, RuleScheduler, RuleState, ScheduleRule, SqliteRuleStore};
