//! Anthropic Messages API client.
//!
//! Auth headers: `x-api-key` and `anthropic-version`. Tool results are sent
//! back as `tool_result` blocks inside a user turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::types::{ChatMessage, ChatRequest, ChatResponse, Role, ToolCall};
use super::{api_error, LlmError, LlmProvider, REQUEST_TIMEOUT};

pub const BASE_URL: &str = "https://api.anthropic.com/v1";
pub const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition<'a>>,
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_url: BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_url = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

/// Convert neutral messages into Anthropic turns. The system prompt travels
/// separately; consecutive tool results are merged into one user turn.
fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let system = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut converted: Vec<AnthropicMessage> = Vec::new();
    for message in messages.iter().filter(|m| m.role != Role::System) {
        match message.role {
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                };
                match converted.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
                    {
                        last.content.push(block)
                    }
                    _ => converted.push(AnthropicMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
            Role::Assistant => {
                let mut content = Vec::new();
                if !message.content.is_empty() {
                    content.push(ContentBlock::Text {
                        text: message.content.clone(),
                    });
                }
                content.extend(message.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                converted.push(AnthropicMessage {
                    role: "assistant",
                    content,
                });
            }
            Role::User | Role::System => converted.push(AnthropicMessage {
                role: "user",
                content: vec![ContentBlock::Text {
                    text: message.content.clone(),
                }],
            }),
        }
    }

    let system = if system.is_empty() { None } else { Some(system) };
    (system, converted)
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let (system, messages) = convert_messages(&request.messages);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages,
            system,
            temperature: request.temperature,
            tools: request
                .tools
                .iter()
                .map(|t| ToolDefinition {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: MessagesResponse = response.json().await?;
        let mut reply = ChatResponse {
            stop_reason: parsed.stop_reason,
            ..ChatResponse::default()
        };
        for block in parsed.content {
            match block {
                ContentBlock::Text { text } => reply.text.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => reply.tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }
        debug!(
            stop_reason = ?reply.stop_reason,
            text_len = reply.text.len(),
            tool_calls = reply.tool_calls.len(),
            "anthropic response"
        );
        Ok(reply)
    }
}
