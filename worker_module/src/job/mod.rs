//! One invocation of the advice job: generate a tip, post it, remember its
//! topic, and install the next activation.
//!
//! Only three steps can end a run early: an unusable trigger, a failed
//! advice request, and a failed reschedule. Everything after advice
//! generation is arranged so the next activation still gets installed.

use chrono::{DateTime, Utc};
use completion_module::{ChatCompletion, CompletionError};
use send_slack_module::SlackApi;
use tracing::{error, info, warn};

use crate::generator::AdviceGenerator;
use crate::history::{AdviceHistory, AdviceStore, HistoryError};
use crate::identity::parse_rule_name;
use crate::notifier::{NotifyError, Notifier};
use crate::reschedule::{compute_next, install_next_run, RescheduleMode};
use crate::retry::RetryPolicy;
use crate::rules::{RuleError, RuleScheduler};


#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("completion service unavailable: {0}")]
    UpstreamUnavailable(#[from] CompletionError),
    #[error("destination unavailable: {0}")]
    DestinationUnavailable(#[source] NotifyError),
    #[error("persistence error: {0}")]
    Persistence(#[from] HistoryError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] RuleError),
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub target_channel: String,
    pub model: String,
    pub temperature: f32,
    pub reschedule: RescheduleMode,
    pub history_limit: Option<usize>,
    pub retry: RetryPolicy,
}

#[derive(Debug)]
pub struct JobReport {
    pub rule_name: String,
    pub advice: String,
    pub delivered: bool,
    pub history_saved: bool,
    pub next_run: DateTime<Utc>,
    pub schedule_expression: String,
    /// Failures that were logged and did not stop the run.
    pub warnings: Vec<JobError>,
}

pub struct AdviceJob<'a> {
    completion: &'a dyn ChatCompletion,
    slack: &'a dyn SlackApi,
    store: &'a dyn AdviceStore,
    rules: &'a dyn RuleScheduler,
    settings: JobSettings,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> AdviceJob<'a> {
    pub fn new(
        completion: &'a dyn ChatCompletion,
        slack: &'a dyn SlackApi,
        store: &'a dyn AdviceStore,
        rules: &'a dyn RuleScheduler,
        settings: JobSettings,
    ) -> Self {
        Self {
            completion,
            slack,
            store,
            rules,
            settings,
            clock: Utc::now,
        }
    }

    /// Replaces the clock read when the next activation is computed.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn run(&self, descriptor: &str, now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let rule_name = parse_rule_name(descriptor)
            .map_err(|err| JobError::Configuration(err.to_string()))?;
        info!("running advice job for rule {}", rule_name);

        let history = AdviceHistory::new(self.store, self.settings.retry, self.settings.history_limit);
        let mut record = history.load();

        let generator = AdviceGenerator::new(
            self.completion,
            &self.settings.model,
            self.settings.temperature,
            self.settings.retry,
        );
        let advice = generator.generate_advice(&record.previous_advice)?;

        let notifier = Notifier::new(self.slack, self.settings.retry);
        let channel_id = match notifier.resolve_channel(&self.settings.target_channel) {
            Ok(channel_id) => channel_id,
            Err(err) => {
                error!(
                    "cannot deliver advice to {}: {}",
                    self.settings.target_channel, err
                );
                self.reschedule(&rule_name, now)?;
                return Err(JobError::DestinationUnavailable(err));
            }
        };

        let mut warnings = Vec::new();
        let delivered = match notifier.post(&channel_id, &advice) {
            Ok(result) if result.ok => {
                info!("advice delivered to {}", channel_id);
                true
            }
            Ok(result) => {
                warn!(
                    "slack rejected advice for {}: {}",
                    channel_id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                false
            }
            Err(err) => {
                warn!("failed to post advice to {}: {}", channel_id, err);
                warnings.push(JobError::DestinationUnavailable(NotifyError::Slack(err)));
                false
            }
        };

        let history_saved = match generator.summarize(&advice) {
            Ok(summary) => match history.save(&mut record, summary) {
                Ok(()) => true,
                Err(err) => {
                    warn!("failed to save advice history: {}", err);
                    warnings.push(JobError::Persistence(err));
                    false
                }
            },
            Err(err) => {
                warn!("failed to summarize advice, history not updated: {}", err);
                warnings.push(JobError::UpstreamUnavailable(err));
                false
            }
        };

        let (next_run, schedule_expression) = self.reschedule(&rule_name, now)?;
        Ok(JobReport {
            rule_name,
            advice,
            delivered,
            history_saved,
            next_run,
            schedule_expression,
            warnings,
        })
    }

    // `started_at` can be minutes old by now; the next activation must land
    // after the moment the rule is installed.
    fn reschedule(
        &self,
        rule_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, String), RuleError> {
        let now = started_at.max((self.clock)());
        let next_run = compute_next(&self.settings.reschedule, now);
        let expression = install_next_run(self.rules, rule_name, next_run, self.settings.retry)?;
        Ok((next_run, expression))
    }
}
