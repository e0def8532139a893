//! OpenAI Chat Completions client (also works with compatible gateways via
//! `llm.api_url`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::types::{ChatMessage, ChatRequest, ChatResponse, Role, ToolCall};
use super::{api_error, LlmError, LlmProvider, REQUEST_TIMEOUT};

pub const BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiClient {
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

fn convert_message(message: &ChatMessage) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content,
        }),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": if message.content.is_empty() { Value::Null } else { Value::String(message.content.clone()) },
                "tool_calls": calls,
            })
        }
        role => json!({
            "role": role,
            "content": message.content,
        }),
    }
}

fn parse_arguments(name: &str, raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(tool = %name, error = %e, "tool arguments are not valid JSON");
            Value::Object(Default::default())
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: request.messages.iter().map(convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: CompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let reply = ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    arguments: parse_arguments(&call.function.name, &call.function.arguments),
                    id: call.id,
                    name: call.function.name,
                })
                .collect(),
            stop_reason: choice.finish_reason,
        };
        debug!(
            stop_reason = ?reply.stop_reason,
            text_len = reply.text.len(),
            tool_calls = reply.tool_calls.len(),
            "openai response"
        );
        Ok(reply)
    }
}
