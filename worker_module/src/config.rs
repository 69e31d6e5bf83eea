use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use completion_module::DEFAULT_OPENAI_BASE_URL;
use send_slack_module::DEFAULT_SLACK_API_BASE;
use tracing::Level;

use crate::reschedule::RescheduleMode;
use crate::retry::RetryPolicy;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TARGET_CHANNEL: &str = "exercise";
pub const DEFAULT_ADVICE_TABLE: &str = "advice";
/// Longest interval gap accepted, one year in minutes.
pub const MAX_RESCHEDULE_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub slack_bot_token: String,
    /// Messages from this user are treated as the bot's own turns.
    pub slack_bot_user_id: Option<String>,
    pub slack_api_base_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub advice_db_path: PathBuf,
    pub advice_table: String,
    pub history_limit: Option<usize>,
    pub target_channel: String,
    pub reschedule: RescheduleMode,
    pub rules_db_path: PathBuf,
    pub aws_region: String,
    pub aws_account_id: String,
    pub log_level: Level,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub mention_history_limit: usize,
    pub rule_poll_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let slack_bot_token = get("SLACK_BOT_TOKEN").ok_or(ConfigError::Missing("SLACK_BOT_TOKEN"))?;
        let openai_api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let advice_table = get("ADVICE_TABLE").unwrap_or_else(|| DEFAULT_ADVICE_TABLE.to_string());
        if !advice_table
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            || advice_table.starts_with(|ch: char| ch.is_ascii_digit())
        {
            return Err(invalid(
                "ADVICE_TABLE",
                &advice_table,
                "expected letters, digits and underscores",
            ));
        }

        let history_limit = match get("ADVICE_HISTORY_LIMIT") {
            Some(raw) => {
                let limit: usize = parse_value("ADVICE_HISTORY_LIMIT", &raw)?;
                if limit == 0 {
                    return Err(invalid("ADVICE_HISTORY_LIMIT", &raw, "must be positive"));
                }
                Some(limit)
            }
            None => None,
        };

        let temperature: f32 = parse_or(&get, "ADVICE_TEMPERATURE", 1.0)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid(
                "ADVICE_TEMPERATURE",
                &temperature.to_string(),
                "expected a value between 0 and 2",
            ));
        }

        let reschedule = parse_reschedule(&get)?;

        let log_level = match get("LOG_LEVEL") {
            Some(raw) => Level::from_str(&raw)
                .map_err(|_| invalid("LOG_LEVEL", &raw, "expected TRACE, DEBUG, INFO, WARN or ERROR"))?,
            None => Level::INFO,
        };

        let max_attempts: u32 = parse_or(&get, "RETRY_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(invalid("RETRY_ATTEMPTS", "0", "must be at least 1"));
        }
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(parse_or(&get, "RETRY_BASE_DELAY_MS", 500)?),
        };

        Ok(Self {
            slack_bot_token,
            slack_bot_user_id: get("SLACK_BOT_USER_ID"),
            slack_api_base_url: get("SLACK_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string()),
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            advice_db_path: PathBuf::from(
                get("ADVICE_DB_PATH").unwrap_or_else(|| "state/advice.db".to_string()),
            ),
            advice_table,
            history_limit,
            target_channel: get("TARGET_CHANNEL")
                .unwrap_or_else(|| DEFAULT_TARGET_CHANNEL.to_string()),
            reschedule,
            rules_db_path: PathBuf::from(
                get("RULES_DB_PATH").unwrap_or_else(|| "state/rules.db".to_string()),
            ),
            aws_region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            aws_account_id: get("AWS_ACCOUNT_ID").unwrap_or_else(|| "000000000000".to_string()),
            log_level,
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?),
            retry,
            mention_history_limit: parse_or(&get, "MENTION_HISTORY_LIMIT", 40)?,
            rule_poll_interval: Duration::from_secs(parse_or(&get, "RULE_POLL_INTERVAL_SECS", 30)?),
        })
    }
}

fn parse_reschedule<G>(get: &G) -> Result<RescheduleMode, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let mode = get("RESCHEDULE_MODE").unwrap_or_else(|| "weekly".to_string());
    match mode.to_ascii_lowercase().as_str() {
        "weekly" => Ok(RescheduleMode::Weekly),
        "interval" => {
            let base_minutes: i64 = parse_or(get, "RESCHEDULE_BASE_MINUTES", 20)?;
            let jitter_minutes: i64 = parse_or(get, "RESCHEDULE_JITTER_MINUTES", 10)?;
            if base_minutes <= 0 || base_minutes > MAX_RESCHEDULE_MINUTES {
                return Err(invalid(
                    "RESCHEDULE_BASE_MINUTES",
                    &base_minutes.to_string(),
                    &format!("must be between 1 and {MAX_RESCHEDULE_MINUTES}"),
                ));
            }
            if jitter_minutes < 0 || jitter_minutes >= base_minutes {
                return Err(invalid(
                    "RESCHEDULE_JITTER_MINUTES",
                    &jitter_minutes.to_string(),
                    "must be non-negative and smaller than RESCHEDULE_BASE_MINUTES",
                ));
            }
            Ok(RescheduleMode::Interval {
                base_minutes,
                jitter_minutes,
            })
        }
        _ => Err(invalid(
            "RESCHEDULE_MODE",
            &mode,
            "expected weekly or interval",
        )),
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| invalid(key, raw, &err.to_string()))
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
