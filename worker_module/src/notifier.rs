use std::collections::HashSet;

use send_slack_module::{PostMessageResult, SlackApi, SlackError};
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

const MAX_CHANNEL_PAGES: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("slack error: {0}")]
    Slack(#[from] SlackError),
}

/// Publishes advice to a channel addressed by name.
pub struct Notifier<'a> {
    slack: &'a dyn SlackApi,
    retry: RetryPolicy,
}

impl<'a> Notifier<'a> {
    pub fn new(slack: &'a dyn SlackApi, retry: RetryPolicy) -> Self {
        Self { slack, retry }
    }

    /// Walks every `conversations.list` page looking for an exact name match.
    pub fn resolve_channel(&self, name: &str) -> Result<String, NotifyError> {
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        for _ in 0..MAX_CHANNEL_PAGES {
            let page = self.retry.run("conversations.list", || {
                self.slack.list_channels(cursor.as_deref())
            })?;
            debug!(
                "got channels: {}",
                page.channels
                    .iter()
                    .map(|channel| channel.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if let Some(channel) = page.channels.into_iter().find(|channel| channel.name == name) {
                return Ok(channel.id);
            }
            match page.next_cursor {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                _ => break,
            }
        }
        warn!("could not find channel {}", name);
        Err(NotifyError::ChannelNotFound(name.to_string()))
    }

    /// Not retried: a timed-out post may still have been delivered.
    pub fn post(&self, channel_id: &str, text: &str) -> Result<PostMessageResult, SlackError> {
        info!("sending message to slack channel {}", channel_id);
        self.slack.post_message(channel_id, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{channel, FakeSlack};

    #[test]
    fn resolves_exact_name_on_first_page() {
        let slack = FakeSlack::with_channels(&[("C1", "general"), ("C123", "exercise")]);
        let notifier = Notifier::new(&slack, RetryPolicy::none());
        assert_eq!(notifier.resolve_channel("exercise").expect("resolve"), "C123");
    }

    #[test]
    fn follows_cursor_to_later_pages() {
        let slack = FakeSlack {
            channel_pages: vec![
                vec![channel("C1", "general")],
                vec![channel("C2", "random")],
                vec![channel("C3", "exercise")],
            ],
            ..Default::default()
        };
        let notifier = Notifier::new(&slack, RetryPolicy::none());
        assert_eq!(notifier.resolve_channel("exercise").expect("resolve"), "C3");
        assert_eq!(slack.list_calls.get(), 3);
    }

    #[test]
    fn name_match_is_exact() {
        let slack = FakeSlack::with_channels(&[("C1", "exercise-chat"), ("C2", "Exercise")]);
        let notifier = Notifier::new(&slack, RetryPolicy::none());
        let err = notifier.resolve_channel("exercise").unwrap_err();
        assert!(matches!(err, NotifyError::ChannelNotFound(name) if name == "exercise"));
    }

    #[test]
    fn listing_failure_is_slack_error() {
        let slack = FakeSlack {
            fail_list_channels: true,
            ..Default::default()
        };
        let notifier = Notifier::new(&slack, RetryPolicy::none());
        assert!(matches!(
            notifier.resolve_channel("exercise"),
            Err(NotifyError::Slack(_))
        ));
    }

    #[test]
    fn post_forwards_channel_and_text() {
        let slack = FakeSlack::default();
        let notifier = Notifier::new(&slack, RetryPolicy::none());
        let result = notifier.post("C123", "Drink water.").expect("post");
        assert!(result.ok);
        assert_eq!(
            slack.posts(),
            vec![("C123".to_string(), "Drink water.".to_string())]
        );
    }
}
