pub mod agent;
pub mod anthropic;
pub mod json;
pub mod openai;
pub mod types;

pub use agent::CodeAgent;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Role, ToolCall, ToolSpec};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// Per-request timeout for provider calls. Agent turns can be slow.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("No API key configured for provider '{0}'")]
    MissingApiKey(String),

    #[error("Unsupported model provider '{0}' (expected 'anthropic' or 'openai')")]
    UnknownProvider(String),

    #[error("Unexpected LLM response: {0}")]
    InvalidResponse(String),

    #[error("Agent did not finish within {0} turns")]
    TurnLimit(usize),
}

/// A chat-completion backend with tool calling.
///
/// Implementations own their model name and credentials; callers only see
/// provider-neutral messages.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs (e.g., "anthropic")
    fn name(&self) -> &str;

    /// Model identifier requests are sent to
    fn model(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

/// Build the configured provider.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let kind: ProviderKind = config.provider.parse()?;
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| LlmError::MissingApiKey(config.provider.clone()))?;

    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::Anthropic => {
            let mut client = anthropic::AnthropicClient::new(api_key, &config.model);
            if let Some(url) = &config.api_url {
                client = client.with_endpoint(url);
            }
            Arc::new(client)
        }
        ProviderKind::OpenAi => {
            let mut client = openai::OpenAiClient::new(api_key, &config.model);
            if let Some(url) = &config.api_url {
                client = client.with_endpoint(url);
            }
            Arc::new(client)
        }
    };
    Ok(provider)
}

/// Single-shot completion without tools.
pub async fn complete(provider: &dyn LlmProvider, prompt: &str) -> Result<String, LlmError> {
    let request = ChatRequest::new(vec![ChatMessage::user(prompt)]);
    let response = provider.chat(&request).await?;
    Ok(response.text)
}

/// Turn a non-success HTTP response into an `LlmError::Api`.
pub(crate) async fn api_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    LlmError::Api { status, message }
}
