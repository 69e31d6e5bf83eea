use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::job::AdviceJob;
use crate::mention::MentionResponder;

const SCHEDULED_SOURCE: &str = "aws.events";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Timer activation; `descriptor` is the firing rule's resource path.
    Scheduled { descriptor: String },
    UrlVerification { challenge: Value },
    AppMention { channel: String },
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event body is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),
    #[error("malformed event: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded payload, e.g. `"\"Success\""`.
    pub body: String,
}

impl HandlerResponse {
    fn json(status_code: u16, value: &Value) -> Self {
        Self {
            status_code,
            body: value.to_string(),
        }
    }

    pub fn success() -> Self {
        Self::json(200, &Value::from("Success"))
    }

    pub fn error() -> Self {
        Self::json(500, &Value::from("Error"))
    }
}

/// Works out what kind of invocation `event` is. Slack payloads arrive either
/// pre-parsed under `original_event` or as a JSON string in `body`.
pub fn classify_event(event: &Value) -> Result<InboundEvent, EventError> {
    if event.get("source").and_then(Value::as_str) == Some(SCHEDULED_SOURCE) {
        let descriptor = event
            .get("resources")
            .and_then(|resources| resources.get(0))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(InboundEvent::Scheduled { descriptor });
    }

    let payload = match event.get("original_event") {
        Some(original) => original.clone(),
        None => {
            let body = event
                .get("body")
                .and_then(Value::as_str)
                .ok_or(EventError::Malformed("missing body"))?;
            serde_json::from_str(body)?
        }
    };

    if let Some(challenge) = payload.get("challenge") {
        return Ok(InboundEvent::UrlVerification {
            challenge: challenge.clone(),
        });
    }

    let Some(inner) = payload.get("event") else {
        return Ok(InboundEvent::Ignored);
    };
    let is_mention = inner.get("type").and_then(Value::as_str) == Some("app_mention");
    if !is_mention || inner.get("subtype").is_some() {
        return Ok(InboundEvent::Ignored);
    }
    let channel = inner
        .get("channel")
        .and_then(Value::as_str)
        .ok_or(EventError::Malformed("app_mention without channel"))?;
    Ok(InboundEvent::AppMention {
        channel: channel.to_string(),
    })
}

/// Routes one inbound event and renders the HTTP-style response.
pub fn dispatch_event(
    event: &Value,
    job: &AdviceJob<'_>,
    mention: &MentionResponder<'_>,
    now: DateTime<Utc>,
) -> HandlerResponse {
    let inbound = match classify_event(event) {
        Ok(inbound) => inbound,
        Err(err) => {
            warn!("rejecting event: {}", err);
            return HandlerResponse::json(400, &Value::from("Bad Request"));
        }
    };

    let response = match inbound {
        InboundEvent::Scheduled { descriptor } => match job.run(&descriptor, now) {
            Ok(report) => {
                info!(
                    "advice job finished for {}; next run {} ({} warnings)",
                    report.rule_name,
                    report.next_run,
                    report.warnings.len()
                );
                HandlerResponse::success()
            }
            Err(err) => {
                error!("advice job failed: {}", err);
                HandlerResponse::error()
            }
        },
        InboundEvent::UrlVerification { challenge } => HandlerResponse::json(200, &challenge),
        InboundEvent::AppMention { channel } => match mention.respond(&channel) {
            Ok(_) => HandlerResponse::success(),
            Err(err) => {
                error!("mention reply failed: {}", err);
                HandlerResponse::error()
            }
        },
        InboundEvent::Ignored => HandlerResponse::success(),
    };
    info!("response: {} {}", response.status_code, response.body);
    response
}
