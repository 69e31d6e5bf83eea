//! Replies to `@` mentions using the recent channel conversation as context.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use completion_module::{ChatCompletion, ChatMessage, CompletionError, CompletionRequest};
use regex::{Captures, Regex};
use send_slack_module::{SlackApi, SlackError, SlackMessage};
use tracing::{debug, error, info, warn};

use crate::prompt::SYSTEM_PROMPT;
use crate::retry::RetryPolicy;

const MAX_USER_PAGES: usize = 50;

static USER_MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([A-Z0-9]+)>").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum MentionError {
    #[error("slack error: {0}")]
    Slack(#[from] SlackError),
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
    #[error("failed to build name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone)]
pub struct MentionSettings {
    pub model: String,
    pub temperature: f32,
    pub bot_user_id: Option<String>,
    pub history_limit: usize,
    pub retry: RetryPolicy,
}

/// User id to display name.
pub type UserMap = BTreeMap<String, String>;

pub struct MentionResponder<'a> {
    completion: &'a dyn ChatCompletion,
    slack: &'a dyn SlackApi,
    settings: MentionSettings,
}

impl<'a> MentionResponder<'a> {
    pub fn new(
        completion: &'a dyn ChatCompletion,
        slack: &'a dyn SlackApi,
        settings: MentionSettings,
    ) -> Self {
        Self {
            completion,
            slack,
            settings,
        }
    }

    /// Answers the conversation in `channel_id` and returns the text posted.
    pub fn respond(&self, channel_id: &str) -> Result<String, MentionError> {
        let users = self.user_lookup();

        let mut history = self
            .slack
            .conversation_history(channel_id, self.settings.history_limit)?;
        history.reverse();

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(slack_to_chat_messages(
            &history,
            self.settings.bot_user_id.as_deref(),
            &users,
        ));
        debug!("mention conversation has {} message(s)", messages.len());

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: Some(self.settings.temperature),
        };
        info!("requesting mention reply");
        let reply = self
            .settings
            .retry
            .run("mention completion", || self.completion.complete(&request))?;
        let text = display_to_user_ids(&reply, &users)?;
        info!("mention reply: {}", text);

        let result = self.slack.post_message(channel_id, &text)?;
        if result.ok {
            info!("mention reply sent to {}", channel_id);
        } else {
            error!(
                "failed to send mention reply to {}: {}",
                channel_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(text)
    }

    /// Active users keyed by id. A failed lookup yields an empty map so
    /// mentions are left as raw ids.
    pub fn user_lookup(&self) -> UserMap {
        let mut users = UserMap::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        for _ in 0..MAX_USER_PAGES {
            let page = match self.slack.list_users(cursor.as_deref()) {
                Ok(page) => page,
                Err(err) => {
                    warn!("error fetching user list: {}", err);
                    return UserMap::new();
                }
            };
            for user in page.users.iter().filter(|user| !user.deleted) {
                if let Some(name) = user.preferred_name() {
                    users.insert(user.id.clone(), name.to_string());
                }
            }
            match page.next_cursor {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                _ => break,
            }
        }
        users
    }
}

/// Maps chronological Slack messages onto chat turns. The bot's own
/// messages become assistant turns; without a bot user id, any message
/// posted by an app counts as the bot's.
pub fn slack_to_chat_messages(
    history: &[SlackMessage],
    bot_user_id: Option<&str>,
    users: &UserMap,
) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|message| {
            let content = user_ids_to_display(&message.text, users);
            let from_bot = match bot_user_id {
                Some(bot) => message.user.as_deref() == Some(bot),
                None => message.bot_id.is_some(),
            };
            if from_bot {
                ChatMessage::assistant(content)
            } else {
                ChatMessage::user(content)
            }
        })
        .collect()
}

/// `<@U123>` becomes the user's display name; unknown ids are left as is.
pub fn user_ids_to_display(text: &str, users: &UserMap) -> String {
    USER_MENTION_PATTERN
        .replace_all(text, |captures: &Captures<'_>| {
            let uid = &captures[1];
            users
                .get(uid)
                .cloned()
                .unwrap_or_else(|| format!("<@{uid}>"))
        })
        .into_owned()
}

/// Whole-word display names become `<@U123>` mentions. Longer names are
/// tried first so "Sam Lee" wins over "Sam".
pub fn display_to_user_ids(text: &str, users: &UserMap) -> Result<String, regex::Error> {
    let by_name: HashMap<&str, &str> = users
        .iter()
        .map(|(uid, name)| (name.as_str(), uid.as_str()))
        .collect();
    if by_name.is_empty() {
        return Ok(text.to_string());
    }

    let mut names: Vec<&str> = by_name.keys().copied().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"\b({alternation})\b"))?;

    Ok(pattern
        .replace_all(text, |captures: &Captures<'_>| match by_name.get(&captures[1]) {
            Some(uid) => format!("<@{uid}>"),
            None => captures[0].to_string(),
        })
        .into_owned())
}
