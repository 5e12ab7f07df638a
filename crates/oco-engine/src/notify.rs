//! Notification sinks.
//!
//! Delivery is best effort: a sink logs its own failures and never reports
//! them back, so a broken webhook cannot interrupt order handling.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use oco_core::config::NotifyConfig;
use serde_json::{Value, json};
use tracing::{info, warn};

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!("[notify] {text}");
    }
}

/// Posts notifications to a Slack channel via `chat.postMessage`.
pub struct SlackNotifier {
    http: reqwest::Client,
    token: String,
    channel: String,
}

impl SlackNotifier {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http, token: token.into(), channel: channel.into() })
    }

    async fn post(&self, text: &str) -> Result<(), String> {
        let body = json!({ "channel": self.channel, "text": text });
        let resp = self
            .http
            .post(SLACK_POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let v: Value = resp.json().await.map_err(|e| e.to_string())?;
        if v.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(v.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string())
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, text: &str) {
        info!("[notify] {text}");
        if let Err(e) = self.post(text).await {
            warn!("[notify] slack delivery to {} failed: {e}", self.channel);
        }
    }
}

/// Slack when a token is configured, the log otherwise.
pub fn notifier_from_config(cfg: &NotifyConfig) -> Box<dyn Notifier> {
    if cfg.token.is_empty() {
        return Box::new(LogNotifier);
    }
    match SlackNotifier::new(cfg.token.clone(), cfg.channel.clone()) {
        Ok(n) => Box::new(n),
        Err(e) => {
            warn!("[notify] slack client unavailable ({e}), logging only");
            Box::new(LogNotifier)
        }
    }
}

/// `[YYYY-mm-dd HH:MM:SS] TITLE | SYMBOL SIDE @ price x qty | extra`.
///
/// Missing price or quantity print as `-`; an empty `extra` drops the tail.
pub fn format_order_message(
    title: &str,
    symbol: &str,
    side: &str,
    price: Option<&dyn Display>,
    qty: Option<&dyn Display>,
    extra: &str,
) -> String {
    let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let p = price.map_or_else(|| "-".to_string(), |p| p.to_string());
    let q = qty.map_or_else(|| "-".to_string(), |q| q.to_string());
    let tail = if extra.is_empty() { String::new() } else { format!(" | {extra}") };
    format!("[{ts}] {title} | {symbol} {side} @ {p} x {q}{tail}")
}
