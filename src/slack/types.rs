use serde::{Deserialize, Serialize};

/// Body of a POST from the Slack Events API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: SlackEvent,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    AppMention(MentionEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MentionEvent {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub channel: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Present when another bot (including this one) wrote the message.
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl MentionEvent {
    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some() || self.user.is_none()
    }

    /// Replies go to the existing thread, or start one under the message.
    pub fn reply_thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PostMessage<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateMessage<'a> {
    pub channel: &'a str,
    pub ts: &'a str,
    pub text: &'a str,
}

/// Common shape of Web API replies; `ok == false` carries `error`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiReply {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}
