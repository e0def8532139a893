use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{ChatMessage, ChatRequest, LlmError, LlmProvider};
use crate::tools::Toolset;

const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Tool-calling loop: send the conversation, run every requested tool,
/// append the results, repeat until the model answers in plain text.
pub struct CodeAgent {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
    toolset: Toolset,
    max_turns: usize,
}

impl CodeAgent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        system_prompt: impl Into<String>,
        toolset: Toolset,
        max_turns: usize,
    ) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            toolset,
            max_turns: max_turns.max(1),
        }
    }

    /// Run the conversation for `prompt` and return the final text answer.
    ///
    /// Tool failures are reported back to the model as text so it can
    /// recover; only provider errors and running out of turns end the run.
    #[instrument(skip(self, prompt), fields(provider = self.provider.name(), model = self.provider.model(), codebase = %self.toolset.codebase().identifier()))]
    pub async fn run(&self, prompt: &str) -> Result<String, LlmError> {
        let tools = self.toolset.specs();
        let mut messages = vec![ChatMessage::system(&self.system_prompt), ChatMessage::user(prompt)];

        for turn in 1..=self.max_turns {
            let request = ChatRequest::new(messages.clone())
                .with_tools(tools.clone())
                .with_max_tokens(MAX_OUTPUT_TOKENS);
            let response = self.provider.chat(&request).await?;

            if response.tool_calls.is_empty() {
                info!(turns = turn, "agent finished");
                return Ok(response.text);
            }

            debug!(turn, calls = response.tool_calls.len(), "model requested tools");
            messages.push(ChatMessage::assistant_with_tools(
                response.text.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let output = match self.toolset.invoke(&call.name, &call.arguments).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool call failed");
                        format!("Error: {}", e)
                    }
                };
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }

        warn!(max_turns = self.max_turns, "agent ran out of turns");
        Err(LlmError::TurnLimit(self.max_turns))
    }
}
