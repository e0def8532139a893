pub mod prompts;
pub mod types;

pub use types::{
    AnalysisResult, ChangeSet, FileAction, FileChange, GenerationFailure, PlannedFile, RepositoryAnalysis,
};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::codebase::{Codebase, CodebaseCache, CodebaseError, Language};
use crate::github::RepoHost;
use crate::llm::{json, CodeAgent, LlmError, LlmProvider};
use crate::tools::{PullRequestTarget, Toolset};
use types::RawChangeSet;

/// Drives the coding agent over materialized codebases.
pub struct CodebaseAnalyzer {
    provider: Arc<dyn LlmProvider>,
    cache: Arc<CodebaseCache>,
    max_turns: usize,
    workspace_dir: PathBuf,
}

impl CodebaseAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, cache: Arc<CodebaseCache>, max_turns: usize) -> Self {
        Self {
            provider,
            cache,
            max_turns,
            workspace_dir: std::env::temp_dir(),
        }
    }

    /// Directory that per-request editing copies are created under.
    pub fn with_workspace_dir(mut self, dir: PathBuf) -> Self {
        self.workspace_dir = dir;
        self
    }

    pub async fn get_codebase(
        &self,
        identifier: &str,
        language: Option<Language>,
        commit: Option<&str>,
    ) -> Result<Arc<Codebase>, CodebaseError> {
        self.cache.get_codebase(identifier, language, commit).await
    }

    /// Inspect `repo` with read-only tools and return a structured plan.
    #[instrument(skip(self, request_text), fields(repo = %repo))]
    pub async fn analyze_repository(&self, repo: &str, request_text: &str) -> AnalysisResult {
        let failed = |error: String, raw_response: Option<String>| AnalysisResult::Error {
            repository: repo.to_string(),
            error,
            raw_response,
        };

        let codebase = match self.get_codebase(repo, None, None).await {
            Ok(codebase) => codebase,
            Err(e) => {
                error!(error = %e, "could not load codebase for analysis");
                return failed(e.to_string(), None);
            }
        };

        let agent = CodeAgent::new(
            self.provider.clone(),
            prompts::INSPECTOR_SYSTEM,
            Toolset::inspection(codebase.clone()),
            self.max_turns,
        );
        let prompt = prompts::analysis(repo, codebase.language(), request_text);
        let response = match agent.run(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "analysis agent failed");
                return failed(e.to_string(), None);
            }
        };

        match json::parse_json_response::<RepositoryAnalysis>(&response) {
            Ok(analysis) => {
                info!(
                    files_to_modify = analysis.analysis.modification_plan.files_to_modify.len(),
                    files_to_create = analysis.analysis.modification_plan.files_to_create.len(),
                    "analysis complete"
                );
                AnalysisResult::Success {
                    repository: repo.to_string(),
                    analysis,
                }
            }
            Err(e) => {
                warn!(error = %e, "could not parse analysis");
                failed(format!("Failed to parse analysis result: {}", e), Some(response))
            }
        }
    }

    /// Let the agent implement the request and report the resulting files.
    ///
    /// The agent edits a private copy of the cached tree, which is removed
    /// afterwards; the returned change set is the source of truth.
    #[instrument(skip(self, request_text, analysis), fields(repo = %repo))]
    pub async fn generate_changes(
        &self,
        repo: &str,
        request_text: &str,
        analysis: &AnalysisResult,
    ) -> Result<ChangeSet, GenerationFailure> {
        let failed = |error: String, raw_response: Option<String>| GenerationFailure {
            repository: repo.to_string(),
            error,
            raw_response,
        };

        let shared = self.get_codebase(repo, None, None).await.map_err(|e| {
            error!(error = %e, "could not load codebase for generation");
            failed(e.to_string(), None)
        })?;
        let workspace = shared.fork(&self.workspace_dir).await.map_err(|e| {
            error!(error = %e, "could not copy codebase for generation");
            failed(e.to_string(), None)
        })?;

        let plan = analysis
            .analysis()
            .map(|a| a.analysis.modification_plan.clone())
            .unwrap_or_default();
        let plan_json = serde_json::to_string_pretty(&plan).unwrap_or_else(|_| "{}".to_string());

        let agent = CodeAgent::new(
            self.provider.clone(),
            prompts::EDITOR_SYSTEM,
            Toolset::editing(Arc::new(workspace)),
            self.max_turns,
        );
        let response = agent
            .run(&prompts::generation(repo, request_text, &plan_json))
            .await
            .map_err(|e| {
                error!(error = %e, "generation agent failed");
                failed(e.to_string(), None)
            })?;

        let raw: RawChangeSet = json::parse_json_response(&response).map_err(|e| {
            warn!(error = %e, "could not parse generated changes");
            failed(format!("Failed to parse changes: {}", e), Some(response.clone()))
        })?;

        let changes = ChangeSet::from_raw(raw, request_text);
        info!(files = changes.files.len(), title = %changes.pr_title, "changes generated");
        Ok(changes)
    }

    /// Review a pull request and return the review text.
    #[instrument(skip(self, codebase, host), fields(repo = %repo, pr = pr_number))]
    pub async fn review_pull_request(
        &self,
        codebase: Arc<Codebase>,
        host: Arc<dyn RepoHost>,
        repo: &str,
        pr_number: u64,
        pr_url: &str,
    ) -> Result<String, LlmError> {
        let target = PullRequestTarget {
            host,
            repo: repo.to_string(),
            number: pr_number,
        };
        let agent = CodeAgent::new(
            self.provider.clone(),
            prompts::REVIEWER_SYSTEM,
            Toolset::review(codebase, target),
            self.max_turns,
        );
        agent.run(&prompts::review(pr_url)).await
    }

    /// Answer a free-form question about `codebase`.
    #[instrument(skip(self, codebase, question), fields(codebase = %codebase.identifier()))]
    pub async fn answer(&self, codebase: Arc<Codebase>, question: &str) -> Result<String, LlmError> {
        let agent = CodeAgent::new(
            self.provider.clone(),
            prompts::GENERAL_SYSTEM,
            Toolset::inspection(codebase),
            self.max_turns,
        );
        agent.run(question).await
    }
}
