pub mod types;

pub use types::{EventEnvelope, SlackEvent};

use async_trait::async_trait;
use colored::Colorize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use types::{ApiReply, PostMessage, UpdateMessage};

const SLACK_API_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Slack request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Slack API error in {method}: {error}")]
    Api { method: &'static str, error: String },

    #[error("No Slack bot token configured")]
    MissingToken,
}

/// Where the bot's replies go.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Post `text`, threaded under `thread_ts` when given. Returns the new
    /// message's timestamp, which identifies it for later edits.
    async fn post_message(&self, channel: &str, thread_ts: Option<&str>, text: &str) -> Result<String, SlackError>;

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), SlackError>;
}

/// Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(token: Option<String>) -> Result<Self, SlackError> {
        let token = token.ok_or(SlackError::MissingToken)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: SLACK_API_URL.to_string(),
            token,
        })
    }

    async fn call<T: serde::Serialize>(&self, method: &'static str, body: &T) -> Result<ApiReply, SlackError> {
        let reply: ApiReply = self
            .http
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(SlackError::Api {
                method,
                error: reply.error.unwrap_or_else(|| "unknown_error".to_string()),
            })
        }
    }
}

#[async_trait]
impl Messenger for SlackClient {
    #[instrument(skip(self, text), fields(channel = %channel))]
    async fn post_message(&self, channel: &str, thread_ts: Option<&str>, text: &str) -> Result<String, SlackError> {
        let reply = self
            .call(
                "chat.postMessage",
                &PostMessage {
                    channel,
                    text,
                    thread_ts,
                },
            )
            .await?;
        let ts = reply.ts.unwrap_or_default();
        debug!(ts = %ts, "posted message");
        Ok(ts)
    }

    #[instrument(skip(self, text), fields(channel = %channel, ts = %ts))]
    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), SlackError> {
        self.call("chat.update", &UpdateMessage { channel, ts, text }).await?;
        Ok(())
    }
}

/// Prints replies to the terminal for the CLI commands.
#[derive(Default)]
pub struct ConsoleMessenger {
    counter: AtomicU64,
}

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn post_message(&self, _channel: &str, _thread_ts: Option<&str>, text: &str) -> Result<String, SlackError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        println!("{} {}", "bot:".cyan().bold(), colorize_message(text));
        Ok(id.to_string())
    }

    async fn update_message(&self, _channel: &str, _ts: &str, text: &str) -> Result<(), SlackError> {
        println!("{} {}", "bot:".cyan().bold(), colorize_message(text));
        Ok(())
    }
}

/// Tint a reply by the emoji it opens with.
fn colorize_message(text: &str) -> colored::ColoredString {
    if text.starts_with(":x:") || text.starts_with(":warning:") {
        text.red()
    } else if text.starts_with(":tada:") || text.starts_with(":white_check_mark:") {
        text.green()
    } else if text.starts_with(":hourglass_flowing_sand:") {
        text.dimmed()
    } else {
        text.normal()
    }
}
