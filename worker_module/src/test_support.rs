//! In-memory fakes for the external services.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use completion_module::{ChatCompletion, CompletionError, CompletionRequest};
use send_slack_module::{
    ChannelPage, PostMessageResult, SlackApi, SlackChannel, SlackError, SlackMessage, SlackUser,
    UserPage,
};

use crate::history::{AdviceRecord, AdviceStore, HistoryError, StoredAdvice};
use crate::rules::{RuleError, RuleScheduler, RuleState};

#[derive(Default)]
pub(crate) struct FakeCompletion {
    replies: RefCell<VecDeque<Option<String>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub(crate) fn with_replies<const N: usize>(replies: [&str; N]) -> Self {
        let fake = Self::default();
        for reply in replies {
            fake.push_reply(reply);
        }
        fake
    }

    pub(crate) fn push_reply(&self, reply: &str) {
        self.replies.borrow_mut().push_back(Some(reply.to_string()));
    }

    pub(crate) fn push_failure(&self) {
        self.replies.borrow_mut().push_back(None);
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl ChatCompletion for FakeCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Some(reply)) => Ok(reply),
            _ => Err(CompletionError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

fn api_error(method: &'static str) -> SlackError {
    SlackError::Api {
        method,
        error: "fatal_error".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeSlack {
    /// Each inner vec is one `conversations.list` page.
    pub(crate) channel_pages: Vec<Vec<SlackChannel>>,
    pub(crate) fail_list_channels: bool,
    pub(crate) fail_post: bool,
    pub(crate) reject_post: bool,
    /// Newest first, as Slack returns them.
    pub(crate) history: Vec<SlackMessage>,
    pub(crate) users: Vec<SlackUser>,
    pub(crate) fail_users: bool,
    pub(crate) list_calls: Cell<usize>,
    pub(crate) history_limits: RefCell<Vec<usize>>,
    pub(crate) posts: RefCell<Vec<(String, String)>>,
}

impl FakeSlack {
    pub(crate) fn with_channels(channels: &[(&str, &str)]) -> Self {
        Self {
            channel_pages: vec![channels
                .iter()
                .map(|(id, name)| channel(id, name))
                .collect()],
            ..Default::default()
        }
    }

    pub(crate) fn posts(&self) -> Vec<(String, String)> {
        self.posts.borrow().clone()
    }
}

pub(crate) fn channel(id: &str, name: &str) -> SlackChannel {
    SlackChannel {
        id: id.to_string(),
        name: name.to_string(),
    }
}

impl SlackApi for FakeSlack {
    fn list_channels(&self, cursor: Option<&str>) -> Result<ChannelPage, SlackError> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.fail_list_channels {
            return Err(api_error("conversations.list"));
        }
        let index = cursor
            .and_then(|cursor| cursor.strip_prefix("page-"))
            .and_then(|index| index.parse::<usize>().ok())
            .unwrap_or(0);
        let channels = self.channel_pages.get(index).cloned().unwrap_or_default();
        let next_cursor = if index + 1 < self.channel_pages.len() {
            Some(format!("page-{}", index + 1))
        } else {
            None
        };
        Ok(ChannelPage {
            channels,
            next_cursor,
        })
    }

    fn post_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<PostMessageResult, SlackError> {
        self.posts
            .borrow_mut()
            .push((channel_id.to_string(), text.to_string()));
        if self.fail_post {
            return Err(api_error("chat.postMessage"));
        }
        if self.reject_post {
            return Ok(PostMessageResult {
                ok: false,
                ts: None,
                error: Some("not_in_channel".to_string()),
            });
        }
        Ok(PostMessageResult {
            ok: true,
            ts: Some("1700000000.000100".to_string()),
            error: None,
        })
    }

    fn conversation_history(
        &self,
        _channel_id: &str,
        limit: usize,
    ) -> Result<Vec<SlackMessage>, SlackError> {
        self.history_limits.borrow_mut().push(limit);
        Ok(self.history.iter().take(limit).cloned().collect())
    }

    fn list_users(&self, _cursor: Option<&str>) -> Result<UserPage, SlackError> {
        if self.fail_users {
            return Err(api_error("users.list"));
        }
        Ok(UserPage {
            users: self.users.clone(),
            next_cursor: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeAdviceStore {
    pub(crate) record: RefCell<Option<StoredAdvice>>,
    pub(crate) fail_get: bool,
    pub(crate) fail_put: bool,
    pub(crate) puts: RefCell<Vec<AdviceRecord>>,
}

impl FakeAdviceStore {
    pub(crate) fn with_advice(previous: &[&str]) -> Self {
        let store = Self::default();
        *store.record.borrow_mut() = Some(StoredAdvice {
            advice_id: "0".to_string(),
            previous_advice: Some(previous.iter().map(|s| s.to_string()).collect()),
        });
        store
    }
}

impl AdviceStore for FakeAdviceStore {
    fn get(&self, _advice_id: &str) -> Result<Option<StoredAdvice>, HistoryError> {
        if self.fail_get {
            return Err(HistoryError::InvalidTable("unreachable".to_string()));
        }
        Ok(self.record.borrow().clone())
    }

    fn put(&self, record: &AdviceRecord) -> Result<(), HistoryError> {
        self.puts.borrow_mut().push(record.clone());
        if self.fail_put {
            return Err(HistoryError::InvalidTable("unreachable".to_string()));
        }
        *self.record.borrow_mut() = Some(StoredAdvice {
            advice_id: record.advice_id.clone(),
            previous_advice: Some(record.previous_advice.clone()),
        });
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRules {
    /// Number of leading calls that fail before calls start succeeding.
    pub(crate) failures_remaining: Cell<u32>,
    pub(crate) calls: RefCell<Vec<(String, String, RuleState)>>,
}

impl FakeRules {
    pub(crate) fn failing(times: u32) -> Self {
        let rules = Self::default();
        rules.failures_remaining.set(times);
        rules
    }

    pub(crate) fn calls(&self) -> Vec<(String, String, RuleState)> {
        self.calls.borrow().clone()
    }
}

impl RuleScheduler for FakeRules {
    fn put_rule(
        &self,
        name: &str,
        schedule_expression: &str,
        state: RuleState,
    ) -> Result<(), RuleError> {
        self.calls
            .borrow_mut()
            .push((name.to_string(), schedule_expression.to_string(), state));
        let remaining = self.failures_remaining.get();
        if remaining > 0 {
            self.failures_remaining.set(remaining - 1);
            return Err(RuleError::Storage("rule service unavailable".to_string()));
        }
        Ok(())
    }
}
