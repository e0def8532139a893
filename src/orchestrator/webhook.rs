//! GitHub webhook handling: PR reviews on the `Codegen` label.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use super::PrAgent;
use crate::codebase::{CodebaseError, CodebaseStats};
use crate::llm::LlmError;

const REVIEW_LABEL: &str = "Codegen";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("{0}")]
    Codebase(#[from] CodebaseError),

    #[error("Review failed: {0}")]
    Review(#[from] LlmError),

    #[error("Failed to post review: {0}")]
    Comment(String),
}

/// JSON body returned to GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_functions: Option<usize>,
}

impl WebhookResponse {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            num_files: None,
            num_functions: None,
        }
    }

    fn with_stats(message: impl Into<String>, stats: CodebaseStats) -> Self {
        Self {
            message: message.into(),
            num_files: Some(stats.num_files),
            num_functions: Some(stats.num_functions),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Head {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    html_url: String,
    head: Head,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: String,
    #[serde(default)]
    label: Option<Label>,
    pull_request: PullRequest,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct IssuesEvent {
    action: String,
    repository: Repository,
}

impl PrAgent {
    /// Dispatch on the `X-GitHub-Event` name.
    #[instrument(skip(self, payload), fields(event = %event))]
    pub async fn handle_github_event(&self, event: &str, payload: &[u8]) -> Result<WebhookResponse, WebhookError> {
        match event {
            "pull_request" => self.handle_pull_request(serde_json::from_slice(payload)?).await,
            "issues" => self.handle_issue(serde_json::from_slice(payload)?).await,
            other => Ok(WebhookResponse::message(format!("Ignored event: {}", other))),
        }
    }

    async fn handle_pull_request(&self, event: PullRequestEvent) -> Result<WebhookResponse, WebhookError> {
        if event.action != "labeled" {
            return Ok(WebhookResponse::message(format!("Ignored action: {}", event.action)));
        }
        let label = event.label.map(|l| l.name).unwrap_or_default();
        if label != REVIEW_LABEL {
            return Ok(WebhookResponse::message(format!("Ignored label: {}", label)));
        }

        let repo = event.repository.full_name;
        let pull = event.pull_request;
        info!(repo = %repo, pr = pull.number, sha = %pull.head.sha, "reviewing labeled pull request");

        let codebase = self
            .analyzer
            .get_codebase(&repo, None, Some(&pull.head.sha))
            .await?;
        let stats = codebase.stats().await?;

        let review = self
            .analyzer
            .review_pull_request(codebase, self.github.host().clone(), &repo, pull.number, &pull.html_url)
            .await?;
        self.github
            .add_pr_comment(&repo, pull.number, &review)
            .await
            .map_err(|f| WebhookError::Comment(f.to_string()))?;

        Ok(WebhookResponse::with_stats("PR event handled", stats))
    }

    async fn handle_issue(&self, event: IssuesEvent) -> Result<WebhookResponse, WebhookError> {
        if event.action != "created" {
            return Ok(WebhookResponse::message(format!("Ignored action: {}", event.action)));
        }
        let codebase = self
            .analyzer
            .get_codebase(&event.repository.full_name, None, None)
            .await?;
        let stats = codebase.stats().await?;
        Ok(WebhookResponse::with_stats("Issue event handled", stats))
    }
}
