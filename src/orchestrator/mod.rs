pub mod webhook;

pub use webhook::WebhookError;

use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::analyzer::{AnalysisResult, CodebaseAnalyzer, GenerationFailure};
use crate::format;
use crate::github::{GitHubHandler, PrFailure, PrResult};
use crate::request::{is_pr_creation_request, strip_mentions, IncomingMention, RequestExtractor};
use crate::slack::{Messenger, SlackError};

const NO_REPOSITORY: &str =
    "Could not determine the repository. Please specify the repository name in your request.";
const NO_CHANGES: &str = "Could not determine what changes to make. Please provide more details in your request.";
const PR_APOLOGY: &str =
    "I encountered an error while processing your PR creation request. Please try again later.";
const GENERAL_APOLOGY: &str = "I encountered an error while processing your request. Please try again later.";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to send chat message: {0}")]
    Slack(#[from] SlackError),
}

/// How a mention was dealt with. Every variant has already been reported
/// in the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionOutcome {
    /// A general question was answered.
    Answered,
    /// No repository to answer against; usage help was sent.
    Help,
    PrCreated(PrResult),
    /// The request ended early with the given reason.
    Rejected(String),
}

/// Updating an existing PR from a request stopped at some step.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Change generation failed: {0}")]
    Generation(GenerationFailure),

    #[error("{}", .0.error)]
    Apply(PrFailure),
}

/// Routes chat mentions and repository webhooks to the analyzer and GitHub.
pub struct PrAgent {
    extractor: RequestExtractor,
    analyzer: Arc<CodebaseAnalyzer>,
    github: Arc<GitHubHandler>,
    messenger: Arc<dyn Messenger>,
    general_repo: Option<String>,
}

impl PrAgent {
    /// `general_repo` is the repository general questions are answered
    /// against; without one the bot only explains how to use it.
    pub fn new(
        extractor: RequestExtractor,
        analyzer: Arc<CodebaseAnalyzer>,
        github: Arc<GitHubHandler>,
        messenger: Arc<dyn Messenger>,
        general_repo: Option<String>,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            github,
            messenger,
            general_repo,
        }
    }

    /// Handle one mention end to end. Failures are reported in the thread,
    /// never returned.
    #[instrument(skip(self, mention), fields(user = %mention.user_id, channel = %mention.channel_id))]
    pub async fn handle_mention(&self, mention: &IncomingMention) -> MentionOutcome {
        let is_pr_request = is_pr_creation_request(&mention.text);
        let result = if is_pr_request {
            info!("handling PR creation request");
            self.create_pr_from_mention(mention).await
        } else {
            self.answer_mention(mention).await
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "mention handling failed");
                let apology = if is_pr_request { PR_APOLOGY } else { GENERAL_APOLOGY };
                if let Err(e) = self.reply(mention, apology).await {
                    warn!(error = %e, "could not deliver apology");
                }
                MentionOutcome::Rejected(e.to_string())
            }
        }
    }

    /// Run [`handle_mention`](Self::handle_mention) on its own task. If that
    /// task panics the thread still gets an apology.
    pub fn spawn_mention(self: &Arc<Self>, mention: IncomingMention) -> JoinHandle<()> {
        let agent = self.clone();
        tokio::spawn(async move {
            let worker = {
                let agent = agent.clone();
                let mention = mention.clone();
                tokio::spawn(async move {
                    agent.handle_mention(&mention).await;
                })
            };
            if let Err(e) = worker.await {
                error!(error = %e, user = %mention.user_id, "mention task crashed");
                let apology = if is_pr_creation_request(&mention.text) {
                    PR_APOLOGY
                } else {
                    GENERAL_APOLOGY
                };
                if let Err(e) = agent.reply(&mention, apology).await {
                    warn!(error = %e, "could not deliver apology");
                }
            }
        })
    }

    async fn create_pr_from_mention(&self, mention: &IncomingMention) -> Result<MentionOutcome, OrchestratorError> {
        self.reply(
            mention,
            &format!("I'll work on creating a PR based on your request, <@{}>!", mention.user_id),
        )
        .await?;

        let request = self.extractor.parse(&mention.text).await;
        if !request.repository.is_resolved() {
            self.reply(mention, NO_REPOSITORY).await?;
            return Ok(MentionOutcome::Rejected(NO_REPOSITORY.to_string()));
        }
        if request.description.is_empty() {
            self.reply(mention, NO_CHANGES).await?;
            return Ok(MentionOutcome::Rejected(NO_CHANGES.to_string()));
        }

        let repo = request.repository.full_name.as_str();
        info!(repo = %repo, "request resolved");
        let status = self
            .reply(
                mention,
                &format!(
                    "I'm analyzing the repository `{}` and generating changes based on your request...",
                    repo
                ),
            )
            .await?;

        let analysis = self.analyzer.analyze_repository(repo, &request.description).await;
        if let AnalysisResult::Error { error, .. } = &analysis {
            self.progress(mention, &status, &format::format_analysis(&analysis))
                .await?;
            return Ok(MentionOutcome::Rejected(error.clone()));
        }

        self.progress(mention, &status, &format::format_loading("Generating changes"))
            .await?;
        let changes = match self
            .analyzer
            .generate_changes(repo, &request.description, &analysis)
            .await
        {
            Ok(changes) => changes,
            Err(failure) => {
                let text = format!("I encountered an error while analyzing the codebase: {}", failure.error);
                self.progress(mention, &status, &text).await?;
                return Ok(MentionOutcome::Rejected(failure.error));
            }
        };

        self.progress(mention, &status, "I've generated the changes and I'm creating a PR...")
            .await?;
        match self
            .github
            .create_pr(repo, &changes, &mention.user_id, None, None)
            .await
        {
            Ok(result) => {
                self.reply(mention, &format::format_pr_creation(&result)).await?;
                Ok(MentionOutcome::PrCreated(result))
            }
            Err(failure) => {
                let text = if failure.files_modified.is_empty() {
                    format!("I encountered an error while creating the PR: {}", failure.error)
                } else {
                    format::format_pr_failure(&failure)
                };
                self.reply(mention, &text).await?;
                Ok(MentionOutcome::Rejected(failure.error))
            }
        }
    }

    async fn answer_mention(&self, mention: &IncomingMention) -> Result<MentionOutcome, OrchestratorError> {
        let question = strip_mentions(&mention.text);
        let repo = match &self.general_repo {
            Some(repo) if !question.is_empty() => repo,
            _ => {
                self.reply(mention, &help_text(&mention.user_id)).await?;
                return Ok(MentionOutcome::Help);
            }
        };

        let codebase = match self.analyzer.get_codebase(repo, None, None).await {
            Ok(codebase) => codebase,
            Err(e) => {
                warn!(repo = %repo, error = %e, "could not load repository for question");
                let text = format!("Could not load repository {}: {}", repo, e);
                self.reply(mention, &format::format_error(&text)).await?;
                return Ok(MentionOutcome::Rejected(text));
            }
        };

        match self.analyzer.answer(codebase, &question).await {
            Ok(answer) => {
                self.reply(mention, &answer).await?;
                Ok(MentionOutcome::Answered)
            }
            Err(e) => {
                warn!(error = %e, "general agent failed");
                self.reply(mention, &format::format_error(&e.to_string())).await?;
                Ok(MentionOutcome::Rejected(e.to_string()))
            }
        }
    }

    /// Analyze, generate and push changes for `request_text` onto an open PR.
    #[instrument(skip(self, request_text), fields(repo = %repo, pr = pr_number))]
    pub async fn update_pull_request(
        &self,
        repo: &str,
        pr_number: u64,
        request_text: &str,
        user_id: &str,
    ) -> Result<PrResult, UpdateError> {
        let analysis = self.analyzer.analyze_repository(repo, request_text).await;
        if let AnalysisResult::Error { error, .. } = &analysis {
            return Err(UpdateError::Analysis(error.clone()));
        }
        let changes = self
            .analyzer
            .generate_changes(repo, request_text, &analysis)
            .await
            .map_err(UpdateError::Generation)?;
        self.github
            .update_pr(repo, pr_number, &changes, user_id)
            .await
            .map_err(UpdateError::Apply)
    }

    /// Materialize the general repository ahead of the first question.
    pub async fn warm_default_repo(&self) {
        let Some(repo) = &self.general_repo else {
            return;
        };
        match self.analyzer.get_codebase(repo, None, None).await {
            Ok(codebase) => info!(repo = %repo, root = %codebase.root().display(), "default repository ready"),
            Err(e) => warn!(repo = %repo, error = %e, "could not warm default repository"),
        }
    }

    async fn reply(&self, mention: &IncomingMention, text: &str) -> Result<String, SlackError> {
        self.messenger
            .post_message(&mention.channel_id, Some(&mention.thread_timestamp), text)
            .await
    }

    /// Replace the status message in place.
    async fn progress(&self, mention: &IncomingMention, status_ts: &str, text: &str) -> Result<(), SlackError> {
        self.messenger
            .update_message(&mention.channel_id, status_ts, text)
            .await
    }
}

fn help_text(user_id: &str) -> String {
    format!(
        "Hi <@{}>! I'm a PR creation bot. To create a PR, mention me with 'create PR' or \
         'create pull request' followed by your request.",
        user_id
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codebase::CodebaseCache;
    use crate::test_support::{FakeHost, RecordingMessenger, ScriptedProvider, StubLoader};

    pub(crate) struct Harness {
        pub agent: Arc<PrAgent>,
        pub provider: Arc<ScriptedProvider>,
        pub host: Arc<FakeHost>,
        pub loader: Arc<StubLoader>,
        pub messenger: Arc<RecordingMessenger>,
    }

    pub(crate) fn harness(responses: Vec<&str>, host: FakeHost, general_repo: Option<&str>) -> Harness {
        harness_with_messenger(responses, host, general_repo, RecordingMessenger::default())
    }

    fn harness_with_messenger(
        responses: Vec<&str>,
        host: FakeHost,
        general_repo: Option<&str>,
        messenger: RecordingMessenger,
    ) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(responses));
        let host = Arc::new(host);
        let loader = Arc::new(StubLoader::default());
        let messenger = Arc::new(messenger);
        let cache = Arc::new(CodebaseCache::new(loader.clone(), 4));
        let analyzer = Arc::new(CodebaseAnalyzer::new(provider.clone(), cache, 5));
        let github = Arc::new(GitHubHandler::new(host.clone(), "main"));
        let agent = Arc::new(PrAgent::new(
            RequestExtractor::new(None, None, None),
            analyzer,
            github,
            messenger.clone(),
            general_repo.map(str::to_string),
        ));
        Harness {
            agent,
            provider,
            host,
            loader,
            messenger,
        }
    }

    fn mention(text: &str) -> IncomingMention {
        IncomingMention {
            text: text.to_string(),
            user_id: "U42".to_string(),
            channel_id: "C1".to_string(),
            thread_timestamp: "1700000000.000100".to_string(),
        }
    }

    const ANALYSIS: &str = r#"{"analysis": {"summary": "Flask app", "modification_plan": {"files_to_modify": ["src/app.py"]}}}"#;
    const CHANGES: &str = r#"{"pr_title": "Add logging", "files_modified": [
        {"path": "src/app.py", "action": "modify", "content": "import logging\n"}]}"#;

    #[tokio::test]
    async fn test_pr_request_end_to_end() {
        let h = harness(vec![ANALYSIS, CHANGES], FakeHost::default(), None);
        let outcome = h
            .agent
            .handle_mention(&mention("<@UBOT> create a PR in acme/widgets to add logging"))
            .await;

        let MentionOutcome::PrCreated(result) = outcome else {
            panic!("expected a PR, got {outcome:?}");
        };
        assert_eq!(result.pr_title, "Add logging");
        assert_eq!(result.repo, "acme/widgets");
        assert_eq!(h.provider.calls(), 2);
        assert_eq!(h.host.commits().len(), 1);

        let posts = h.messenger.posts();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].text, "I'll work on creating a PR based on your request, <@U42>!");
        assert!(posts.iter().all(|p| p.ts.as_deref() == Some("1700000000.000100")));
        assert!(posts[2].text.starts_with(":tada:"));

        let updates = h.messenger.updates();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.ts.as_deref() == Some("1002.000")));
        assert_eq!(updates[1].text, "I've generated the changes and I'm creating a PR...");
    }

    #[tokio::test]
    async fn test_unresolved_repository_is_reported() {
        let h = harness(vec![], FakeHost::default(), None);
        let outcome = h.agent.handle_mention(&mention("<@UBOT> create a PR please")).await;
        assert_eq!(outcome, MentionOutcome::Rejected(NO_REPOSITORY.to_string()));
        assert_eq!(h.messenger.texts().last().map(String::as_str), Some(NO_REPOSITORY));
        assert_eq!(h.provider.calls(), 0);
        assert_eq!(h.loader.loads(), 0);
    }

    #[tokio::test]
    async fn test_missing_details_are_reported() {
        let h = harness(vec![], FakeHost::default(), None);
        let outcome = h
            .agent
            .handle_mention(&mention("<@UBOT> create a PR in acme/widgets"))
            .await;
        assert_eq!(outcome, MentionOutcome::Rejected(NO_CHANGES.to_string()));
    }

    #[tokio::test]
    async fn test_analysis_failure_edits_status() {
        let h = harness(vec!["no idea"], FakeHost::default(), None);
        let outcome = h
            .agent
            .handle_mention(&mention("<@UBOT> create a PR in acme/widgets to add logging"))
            .await;
        assert!(matches!(outcome, MentionOutcome::Rejected(_)));
        let updates = h.messenger.updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0]
            .text
            .starts_with(":warning: *Error analyzing repository*: Failed to parse analysis result"));
        assert!(updates[0].text.ends_with("*Raw analysis:*\n```\nno idea\n```"));
        assert!(h.host.commits().is_empty());
    }

    #[tokio::test]
    async fn test_crashed_mention_still_gets_apology() {
        let h = harness_with_messenger(vec![], FakeHost::default(), None, RecordingMessenger::panicking_once());
        h.agent
            .spawn_mention(mention("<@UBOT> create a PR in acme/widgets to add logging"))
            .await
            .unwrap();
        let posts = h.messenger.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, PR_APOLOGY);
        assert_eq!(posts[0].ts.as_deref(), Some("1700000000.000100"));
    }

    #[tokio::test]
    async fn test_general_question_without_repo_gets_help() {
        let h = harness(vec![], FakeHost::default(), None);
        let outcome = h.agent.handle_mention(&mention("<@UBOT> what can you do?")).await;
        assert_eq!(outcome, MentionOutcome::Help);
        assert!(h.messenger.texts()[0].starts_with("Hi <@U42>! I'm a PR creation bot."));
    }

    #[tokio::test]
    async fn test_general_question_is_answered_from_default_repo() {
        let h = harness(vec!["It is a small Flask app."], FakeHost::default(), Some("acme/widgets"));
        let outcome = h
            .agent
            .handle_mention(&mention("<@UBOT> what does app.py do?"))
            .await;
        assert_eq!(outcome, MentionOutcome::Answered);
        assert_eq!(h.messenger.texts(), vec!["It is a small Flask app.".to_string()]);

        let request = &h.provider.requests()[0];
        assert_eq!(request.messages[1].content, "what does app.py do?");
        assert!(!request.tools.iter().any(|t| t.name == "edit_file"));
    }

    #[tokio::test]
    async fn test_update_pull_request() {
        let h = harness(vec![ANALYSIS, CHANGES], FakeHost::default().with_existing_pr(5), None);
        let result = h
            .agent
            .update_pull_request("acme/widgets", 5, "add logging", "cli")
            .await
            .unwrap();
        assert_eq!(result.pr_number, 5);
        assert_eq!(h.host.comments().len(), 1);
    }

    #[tokio::test]
    async fn test_warm_default_repo_loads_once() {
        let h = harness(vec![], FakeHost::default(), Some("acme/widgets"));
        h.agent.warm_default_repo().await;
        h.agent.warm_default_repo().await;
        assert_eq!(h.loader.loads(), 1);
    }
}
