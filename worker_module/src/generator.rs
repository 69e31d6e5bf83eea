use completion_module::{ChatCompletion, CompletionError, CompletionRequest};
use tracing::{debug, info};

use crate::prompt::{compose_advice_conversation, compose_summary_conversation};
use crate::retry::RetryPolicy;

pub struct AdviceGenerator<'a> {
    completion: &'a dyn ChatCompletion,
    model: &'a str,
    temperature: f32,
    retry: RetryPolicy,
}

impl<'a> AdviceGenerator<'a> {
    pub fn new(
        completion: &'a dyn ChatCompletion,
        model: &'a str,
        temperature: f32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            completion,
            model,
            temperature,
            retry,
        }
    }

    /// Asks for a fresh tip, steering away from `previous_advice`. The reply
    /// is returned as-is.
    pub fn generate_advice(&self, previous_advice: &[String]) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: self.model.to_string(),
            messages: compose_advice_conversation(previous_advice),
            temperature: Some(self.temperature),
        };
        info!(
            "requesting advice with {} previous topic(s) in context",
            previous_advice.len()
        );
        let advice = self
            .retry
            .run("advice completion", || self.completion.complete(&request))?;
        debug!("advice: {}", advice);
        Ok(advice)
    }

    /// Short topic line for `advice`; this is what the history keeps.
    pub fn summarize(&self, advice: &str) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: self.model.to_string(),
            messages: compose_summary_conversation(advice),
            temperature: None,
        };
        let summary = self
            .retry
            .run("summary completion", || self.completion.complete(&request))?;
        let summary = summary.trim().to_string();
        info!("advice summary: {}", summary);
        Ok(summary)
    }
}
