//! Wires the production clients and stores from a [`WorkerConfig`].

use chrono::{DateTime, Utc};
use completion_module::{CompletionError, OpenAiClient};
use send_slack_module::{SlackClient, SlackError};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::event::{dispatch_event, HandlerResponse};
use crate::history::{HistoryError, SqliteAdviceStore};
use crate::job::{AdviceJob, JobSettings};
use crate::mention::{MentionResponder, MentionSettings};
use crate::reschedule::{compute_next, install_next_run};
use crate::rules::{RuleError, RuleRunner, SqliteRuleStore};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Slack(#[from] SlackError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Rules(#[from] RuleError),
}

pub struct Runtime {
    config: WorkerConfig,
    slack: SlackClient,
    completion: OpenAiClient,
    advice_store: SqliteAdviceStore,
    rules: SqliteRuleStore,
}

impl Runtime {
    pub fn new(config: WorkerConfig) -> Result<Self, RuntimeError> {
        if config.slack_bot_user_id.is_none() {
            warn!(
                "SLACK_BOT_USER_ID is not set; mention replies will treat every app-posted message as the bot's own"
            );
        }
        let slack = SlackClient::new(
            config.slack_bot_token.clone(),
            config.slack_api_base_url.clone(),
            config.http_timeout,
        )?;
        let completion = OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.http_timeout,
        )?;
        let advice_store =
            SqliteAdviceStore::new(config.advice_db_path.clone(), config.advice_table.clone())?;
        let rules = SqliteRuleStore::new(config.rules_db_path.clone())?;
        Ok(Self {
            config,
            slack,
            completion,
            advice_store,
            rules,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn rules(&self) -> &SqliteRuleStore {
        &self.rules
    }

    pub fn job(&self) -> AdviceJob<'_> {
        AdviceJob::new(
            &self.completion,
            &self.slack,
            &self.advice_store,
            &self.rules,
            JobSettings {
                target_channel: self.config.target_channel.clone(),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                reschedule: self.config.reschedule,
                history_limit: self.config.history_limit,
                retry: self.config.retry,
            },
        )
    }

    pub fn mention_responder(&self) -> MentionResponder<'_> {
        MentionResponder::new(
            &self.completion,
            &self.slack,
            MentionSettings {
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                bot_user_id: self.config.slack_bot_user_id.clone(),
                history_limit: self.config.mention_history_limit,
                retry: self.config.retry,
            },
        )
    }

    pub fn handle_event(&self, event: &Value, now: DateTime<Utc>) -> HandlerResponse {
        dispatch_event(event, &self.job(), &self.mention_responder(), now)
    }

    /// Installs the first activation of `rule_name`; later ones are installed
    /// by the job itself.
    pub fn install(&self, rule_name: &str, now: DateTime<Utc>) -> Result<String, RuleError> {
        let next_run = compute_next(&self.config.reschedule, now);
        install_next_run(&self.rules, rule_name, next_run, self.config.retry)
    }

    /// Fires every due rule as a scheduled event and returns how many fired.
    pub fn run_due_rules(&self, now: DateTime<Utc>) -> Result<usize, RuleError> {
        let runner = RuleRunner::new(
            &self.rules,
            self.config.aws_region.clone(),
            self.config.aws_account_id.clone(),
        );
        runner.tick(now, |descriptor| {
            let event = serde_json::json!({
                "source": "aws.events",
                "resources": [descriptor],
            });
            let response = self.handle_event(&event, now);
            if response.status_code == 200 {
                info!("rule target {} completed", descriptor);
            } else {
                error!(
                    "rule target {} failed with status {}",
                    descriptor, response.status_code
                );
            }
        })
    }
}
