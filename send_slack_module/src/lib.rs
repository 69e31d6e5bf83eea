//! Slack Web API client.
//!
//! Covers the handful of methods the advice worker needs:
//! - `conversations.list` to resolve a channel name to an id
//! - `chat.postMessage` to publish text
//! - `conversations.history` to read recent channel context
//! - `users.list` to map user ids to display names
//!
//! Everything goes through the [`SlackApi`] trait so callers can swap in a
//! fake; [`SlackClient`] is the blocking HTTP implementation.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

const PAGE_SIZE: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("slack api error in {method}: {error}")]
    Api { method: &'static str, error: String },
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A conversation as returned by `conversations.list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One page of channels plus the cursor for the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct ChannelPage {
    pub channels: Vec<SlackChannel>,
    pub next_cursor: Option<String>,
}

/// A message from `conversations.history`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackMessage {
    /// Author user id; absent for some bot/system messages
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: Option<String>,
    /// Set when an app or bot integration posted the message.
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackUserProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub real_name: String,
}

/// A workspace member from `users.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: SlackUserProfile,
}

impl SlackUser {
    /// Display name if set, otherwise the real name.
    pub fn preferred_name(&self) -> Option<&str> {
        let display = self.profile.display_name.trim();
        if !display.is_empty() {
            return Some(display);
        }
        self.real_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.profile.real_name.trim()).filter(|name| !name.is_empty()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserPage {
    pub users: Vec<SlackUser>,
    pub next_cursor: Option<String>,
}

/// Outcome of `chat.postMessage`.
///
/// A response with `ok: false` is reported here rather than as an error so the
/// caller decides whether a failed send matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMessageResult {
    pub ok: bool,
    pub ts: Option<String>,
    pub error: Option<String>,
}

pub trait SlackApi {
    fn list_channels(&self, cursor: Option<&str>) -> Result<ChannelPage, SlackError>;
    fn post_message(&self, channel_id: &str, text: &str)
        -> Result<PostMessageResult, SlackError>;
    /// Newest-first, as Slack returns them.
    fn conversation_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<SlackMessage>, SlackError>;
    fn list_users(&self, cursor: Option<&str>) -> Result<UserPage, SlackError>;
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    client: reqwest::blocking::Client,
    api_base: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SlackError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    fn get<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, SlackError> {
        let response = self
            .client
            .get(self.url(method))
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()?;
        let body = read_body(response)?;
        let body = check_ok(method, body)?;
        serde_json::from_value(body).map_err(|source| SlackError::Decode { method, source })
    }
}

impl SlackApi for SlackClient {
    fn list_channels(&self, cursor: Option<&str>) -> Result<ChannelPage, SlackError> {
        let mut query = vec![
            ("types", "public_channel,private_channel".to_string()),
            ("exclude_archived", "true".to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let response: ConversationsListResponse = self.get("conversations.list", &query)?;
        debug!("conversations.list returned {} channel(s)", response.channels.len());
        Ok(ChannelPage {
            channels: response.channels,
            next_cursor: response.response_metadata.into_cursor(),
        })
    }

    fn post_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<PostMessageResult, SlackError> {
        let request = PostMessageRequest {
            channel: channel_id,
            text,
        };
        let response = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&request)
            .send()?;
        let body = read_body(response)?;
        let parsed: PostMessageResponse =
            serde_json::from_value(body).map_err(|source| SlackError::Decode {
                method: "chat.postMessage",
                source,
            })?;
        Ok(PostMessageResult {
            ok: parsed.ok,
            ts: parsed.ts,
            error: parsed.error,
        })
    }

    fn conversation_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<SlackMessage>, SlackError> {
        let query = [
            ("channel", channel_id.to_string()),
            ("limit", limit.to_string()),
        ];
        let response: ConversationsHistoryResponse =
            self.get("conversations.history", &query)?;
        Ok(response.messages)
    }

    fn list_users(&self, cursor: Option<&str>) -> Result<UserPage, SlackError> {
        let mut query = vec![("limit", PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let response: UsersListResponse = self.get("users.list", &query)?;
        Ok(UserPage {
            users: response.members,
            next_cursor: response.response_metadata.into_cursor(),
        })
    }
}

fn read_body(response: reqwest::blocking::Response) -> Result<Value, SlackError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SlackError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json()?)
}

fn check_ok(method: &'static str, body: Value) -> Result<Value, SlackError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(SlackError::Api { method, error })
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ResponseMetadata {
    // Slack signals the last page with an empty cursor.
    fn into_cursor(self) -> Option<String> {
        self.next_cursor.filter(|cursor| !cursor.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ConversationsListResponse {
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct ConversationsHistoryResponse {
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_name_falls_back_to_real_name() {
        let user = SlackUser {
            id: "U1".to_string(),
            deleted: false,
            real_name: Some("Jamie Doe".to_string()),
            profile: SlackUserProfile {
                display_name: "  ".to_string(),
                real_name: "Jamie Doe".to_string(),
            },
        };
        assert_eq!(user.preferred_name(), Some("Jamie Doe"));

        let user = SlackUser {
            profile: SlackUserProfile {
                display_name: "jd".to_string(),
                real_name: String::new(),
            },
            ..user
        };
        assert_eq!(user.preferred_name(), Some("jd"));
    }

    #[test]
    fn empty_cursor_means_last_page() {
        let meta = ResponseMetadata {
            next_cursor: Some(String::new()),
        };
        assert_eq!(meta.into_cursor(), None);

        let meta = ResponseMetadata {
            next_cursor: Some("dXNlcjpVMDYxTkZUVDI=".to_string()),
        };
        assert_eq!(meta.into_cursor().as_deref(), Some("dXNlcjpVMDYxTkZUVDI="));
    }

    #[test]
    fn check_ok_reports_slack_error_code() {
        let body = serde_json::json!({"ok": false, "error": "channel_not_found"});
        let err = check_ok("conversations.history", body).unwrap_err();
        match err {
            SlackError::Api { method, error } => {
                assert_eq!(method, "conversations.history");
                assert_eq!(error, "channel_not_found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
