pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{
    CommentResult, FileOperationResult, FileStatus, GitHubFailure, MergeMethod, MergeResponse, MergeResult,
    PrFailure, PrResult, PullRequestDetails, TreeEntry,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::analyzer::{ChangeSet, FileAction, FileChange};

pub const PR_EXISTS_MESSAGE: &str = "PR already exists";
const DEFAULT_UPDATE_COMMENT: &str = "Updated PR with new changes.";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Rejected(String),
}

impl GitHubError {
    /// 422 from PR creation because the head branch already has an open PR.
    pub fn is_pr_already_exists(&self) -> bool {
        matches!(self, GitHubError::Api { status: 422, message } if message.contains("A pull request already exists"))
    }

    /// 422 from ref creation because the branch is already there.
    pub fn is_reference_exists(&self) -> bool {
        matches!(self, GitHubError::Api { status: 422, message } if message.contains("Reference already exists"))
    }
}

/// The repository-hosting operations the bot needs. `GitHubClient` talks
/// to the REST API; tests substitute an in-memory host.
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError>;

    /// Commit SHA at the tip of `branch`
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, GitHubError>;

    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> Result<(), GitHubError>;

    /// Upload file content, returning the blob SHA
    async fn create_blob(&self, repo: &str, content: &str) -> Result<String, GitHubError>;

    async fn file_exists(&self, repo: &str, path: &str, branch: &str) -> Result<bool, GitHubError>;

    /// Commit `entries` on top of `parent_sha` and advance `branch` to it.
    async fn commit_tree(
        &self,
        repo: &str,
        branch: &str,
        parent_sha: &str,
        entries: &[TreeEntry],
        message: &str,
    ) -> Result<String, GitHubError>;

    async fn create_pull(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestDetails, GitHubError>;

    /// Open PRs whose head is `owner:branch`
    async fn list_open_pulls(&self, repo: &str, head: &str) -> Result<Vec<PullRequestDetails>, GitHubError>;

    async fn get_pull(&self, repo: &str, number: u64) -> Result<PullRequestDetails, GitHubError>;

    async fn pull_diff(&self, repo: &str, number: u64) -> Result<String, GitHubError>;

    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        message: &str,
        method: MergeMethod,
    ) -> Result<MergeResponse, GitHubError>;

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<CommentResult, GitHubError>;
}

/// Turns change sets into branches, commits and pull requests.
pub struct GitHubHandler {
    host: Arc<dyn RepoHost>,
    default_base_branch: String,
}

impl GitHubHandler {
    pub fn new(host: Arc<dyn RepoHost>, default_base_branch: impl Into<String>) -> Self {
        Self {
            host,
            default_base_branch: default_base_branch.into(),
        }
    }

    pub fn host(&self) -> &Arc<dyn RepoHost> {
        &self.host
    }

    /// Apply `changes` to a new branch and open a pull request for it.
    ///
    /// Files are staged one at a time and every outcome is recorded; a
    /// failing file does not stop the rest. When GitHub reports that a PR
    /// for the branch already exists, that PR is returned instead.
    #[instrument(skip(self, changes), fields(repo = %repo, user = %user_id, files = changes.files.len()))]
    pub async fn create_pr(
        &self,
        repo: &str,
        changes: &ChangeSet,
        user_id: &str,
        base_branch: Option<&str>,
        head_branch: Option<&str>,
    ) -> Result<PrResult, PrFailure> {
        let base = match base_branch {
            Some(base) => base.to_string(),
            None => self.resolve_base_branch(repo).await,
        };
        let head = head_branch
            .map(str::to_string)
            .unwrap_or_else(|| generate_branch_name(user_id));
        let failure = |error: String, files_modified: Vec<FileOperationResult>| PrFailure {
            error,
            files_modified,
            user: user_id.to_string(),
            repo: repo.to_string(),
            head_branch: Some(head.clone()),
            base_branch: Some(base.clone()),
            pr_number: None,
        };

        let parent = match self.prepare_branch(repo, &base, &head).await {
            Ok(sha) => sha,
            Err(e) => {
                error!(error = %e, branch = %head, "failed to create branch");
                return Err(failure(format!("Failed to create branch: {}", e), Vec::new()));
            }
        };

        let (entries, files_modified) = self.stage_files(repo, &head, &changes.files).await;

        if !entries.is_empty() {
            if let Err(e) = self
                .host
                .commit_tree(repo, &head, &parent, &entries, &changes.commit_message)
                .await
            {
                error!(error = %e, "failed to commit changes");
                return Err(failure(format!("Failed to commit changes: {}", e), files_modified));
            }
        }

        match self
            .host
            .create_pull(repo, &changes.pr_title, &changes.pr_description, &head, &base)
            .await
        {
            Ok(pull) => {
                info!(pr = pull.number, url = %pull.url, "created pull request");
                Ok(PrResult {
                    pr_number: pull.number,
                    pr_url: pull.url,
                    pr_title: pull.title,
                    pr_body: Some(changes.pr_description.clone()),
                    files_modified,
                    user: user_id.to_string(),
                    head_branch: head.clone(),
                    base_branch: base.clone(),
                    repo: repo.to_string(),
                    message: None,
                })
            }
            Err(e) if e.is_pr_already_exists() => {
                let owner = repo.split('/').next().unwrap_or(repo);
                let existing = self
                    .host
                    .list_open_pulls(repo, &format!("{}:{}", owner, head))
                    .await
                    .ok()
                    .and_then(|pulls| pulls.into_iter().next());
                match existing {
                    Some(pull) => {
                        info!(pr = pull.number, "pull request already exists for branch");
                        Ok(PrResult {
                            pr_number: pull.number,
                            pr_url: pull.url,
                            pr_title: pull.title,
                            pr_body: pull.body,
                            files_modified,
                            user: user_id.to_string(),
                            head_branch: head.clone(),
                            base_branch: base.clone(),
                            repo: repo.to_string(),
                            message: Some(PR_EXISTS_MESSAGE.to_string()),
                        })
                    }
                    None => Err(failure(format!("Failed to create PR: {}", e), files_modified)),
                }
            }
            Err(e) => {
                error!(error = %e, "failed to create pull request");
                Err(failure(format!("Failed to create PR: {}", e), files_modified))
            }
        }
    }

    /// Apply `changes` to the head branch of an open PR and leave a summary comment.
    #[instrument(skip(self, changes), fields(repo = %repo, pr = pr_number, files = changes.files.len()))]
    pub async fn update_pr(
        &self,
        repo: &str,
        pr_number: u64,
        changes: &ChangeSet,
        user_id: &str,
    ) -> Result<PrResult, PrFailure> {
        let failure = |error: String, files_modified: Vec<FileOperationResult>, head: Option<String>| PrFailure {
            error,
            files_modified,
            user: user_id.to_string(),
            repo: repo.to_string(),
            head_branch: head,
            base_branch: None,
            pr_number: Some(pr_number),
        };

        let pull = self
            .host
            .get_pull(repo, pr_number)
            .await
            .map_err(|e| failure(e.to_string(), Vec::new(), None))?;
        let head = pull.head_branch.clone();
        let parent = self
            .host
            .branch_head(repo, &head)
            .await
            .map_err(|e| failure(e.to_string(), Vec::new(), Some(head.clone())))?;

        let (entries, files_modified) = self.stage_files(repo, &head, &changes.files).await;

        if !entries.is_empty() {
            let message = if changes.commit_message.trim().is_empty() {
                format!("Update PR #{}", pr_number)
            } else {
                changes.commit_message.clone()
            };
            if let Err(e) = self.host.commit_tree(repo, &head, &parent, &entries, &message).await {
                return Err(failure(
                    format!("Failed to commit changes: {}", e),
                    files_modified,
                    Some(head),
                ));
            }
        }

        let comment = update_comment(changes.pr_comment.as_deref(), &files_modified);
        if let Err(e) = self.host.comment(repo, pr_number, &comment).await {
            warn!(error = %e, "failed to post update comment");
        }

        info!(head = %head, "updated pull request");
        Ok(PrResult {
            pr_number,
            pr_url: pull.url,
            pr_title: pull.title,
            pr_body: pull.body,
            files_modified,
            user: user_id.to_string(),
            head_branch: head,
            base_branch: pull.base_branch,
            repo: repo.to_string(),
            message: None,
        })
    }

    pub async fn get_pr(&self, repo: &str, pr_number: u64) -> Result<PullRequestDetails, GitHubFailure> {
        self.host
            .get_pull(repo, pr_number)
            .await
            .map_err(|e| wrap_failure(e.to_string(), repo, pr_number))
    }

    /// Merge a PR, refusing unless GitHub reports it as mergeable.
    #[instrument(skip(self), fields(repo = %repo, pr = pr_number))]
    pub async fn merge_pr(
        &self,
        repo: &str,
        pr_number: u64,
        method: MergeMethod,
    ) -> Result<MergeResult, GitHubFailure> {
        let pull = self.get_pr(repo, pr_number).await?;
        if pull.mergeable != Some(true) {
            warn!(mergeable = ?pull.mergeable, "refusing to merge");
            return Err(wrap_failure("PR is not mergeable", repo, pr_number));
        }

        let title = format!("Merge PR #{}: {}", pr_number, pull.title);
        let message = pull.body.unwrap_or_default();
        let response = self
            .host
            .merge_pull(repo, pr_number, &title, &message, method)
            .await
            .map_err(|e| wrap_failure(e.to_string(), repo, pr_number))?;

        info!(merged = response.merged, sha = ?response.sha, "merge finished");
        Ok(MergeResult {
            pr_number,
            repo: repo.to_string(),
            merged: response.merged,
            message: response.message,
            sha: response.sha,
        })
    }

    pub async fn add_pr_comment(
        &self,
        repo: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<CommentResult, GitHubFailure> {
        self.host
            .comment(repo, pr_number, body)
            .await
            .map_err(|e| wrap_failure(e.to_string(), repo, pr_number))
    }

    async fn resolve_base_branch(&self, repo: &str) -> String {
        match self.host.default_branch(repo).await {
            Ok(branch) => branch,
            Err(e) => {
                warn!(error = %e, fallback = %self.default_base_branch, "could not read default branch");
                self.default_base_branch.clone()
            }
        }
    }

    /// Create `head` from `base`, reusing it if it already exists. Returns
    /// the commit new work should build on.
    async fn prepare_branch(&self, repo: &str, base: &str, head: &str) -> Result<String, GitHubError> {
        let base_sha = self.host.branch_head(repo, base).await?;
        match self.host.create_branch(repo, head, &base_sha).await {
            Ok(()) => Ok(base_sha),
            Err(e) if e.is_reference_exists() => {
                info!(branch = %head, "branch already exists, reusing it");
                self.host.branch_head(repo, head).await
            }
            Err(e) => Err(e),
        }
    }

    /// Stage each file independently. Returns the tree entries to commit and
    /// one result per input file.
    async fn stage_files(
        &self,
        repo: &str,
        branch: &str,
        files: &[FileChange],
    ) -> (Vec<TreeEntry>, Vec<FileOperationResult>) {
        let mut entries = Vec::new();
        let mut results = Vec::with_capacity(files.len());

        for file in files {
            match self.stage_file(repo, branch, file).await {
                Ok(entry) => {
                    entries.push(entry);
                    results.push(FileOperationResult::success(&file.path, file.action));
                }
                Err(e) => {
                    error!(path = %file.path, action = %file.action, error = %e, "failed to stage file");
                    results.push(FileOperationResult::failure(&file.path, file.action, e.to_string()));
                }
            }
        }
        (entries, results)
    }

    async fn stage_file(&self, repo: &str, branch: &str, file: &FileChange) -> Result<TreeEntry, GitHubError> {
        match file.action {
            FileAction::Create | FileAction::Modify => {
                let content = file
                    .content
                    .as_deref()
                    .ok_or_else(|| GitHubError::Rejected(format!("No content provided for {}", file.path)))?;
                let sha = self.host.create_blob(repo, content).await?;
                Ok(TreeEntry {
                    path: file.path.clone(),
                    sha: Some(sha),
                })
            }
            FileAction::Delete => {
                if !self.host.file_exists(repo, &file.path, branch).await? {
                    return Err(GitHubError::Rejected(format!("File not found: {}", file.path)));
                }
                Ok(TreeEntry {
                    path: file.path.clone(),
                    sha: None,
                })
            }
        }
    }
}

/// `codegen-pr-{user}-{unix seconds}-{8 hex chars}`
pub fn generate_branch_name(user_id: &str) -> String {
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "codegen-pr-{}-{}-{}",
        user_id,
        chrono::Utc::now().timestamp(),
        &unique[..8]
    )
}

fn wrap_failure(error: impl Into<String>, repo: &str, pr_number: u64) -> GitHubFailure {
    GitHubFailure {
        error: error.into(),
        pr_number,
        repo: repo.to_string(),
    }
}

fn update_comment(pr_comment: Option<&str>, files: &[FileOperationResult]) -> String {
    let mut comment = pr_comment.unwrap_or(DEFAULT_UPDATE_COMMENT).to_string();
    if !files.is_empty() {
        comment.push_str("\n\n");
        for file in files {
            match &file.error {
                None => comment.push_str(&format!("- {} `{}`\n", file.action.past_tense(), file.path)),
                Some(e) => comment.push_str(&format!("- Failed to {} `{}`: {}\n", file.action, file.path, e)),
            }
        }
    }
    comment.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_changeset, FakeHost};

    fn handler(host: Arc<FakeHost>) -> GitHubHandler {
        GitHubHandler::new(host, "main")
    }

    #[test]
    fn test_branch_name_shape() {
        let name = generate_branch_name("U123");
        let parts: Vec<&str> = name.rsplitn(3, '-').collect();
        assert!(name.starts_with("codegen-pr-U123-"));
        assert_eq!(parts[0].len(), 8);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts[1].parse::<i64>().is_ok());
    }

    #[test]
    fn test_error_classification() {
        let exists = GitHubError::Api {
            status: 422,
            message: "Validation Failed: A pull request already exists for acme:feature.".to_string(),
        };
        assert!(exists.is_pr_already_exists());
        assert!(!exists.is_reference_exists());

        let other = GitHubError::Api {
            status: 404,
            message: "A pull request already exists".to_string(),
        };
        assert!(!other.is_pr_already_exists());
    }

    #[tokio::test]
    async fn test_create_pr_commits_and_opens() {
        let host = Arc::new(FakeHost::default());
        let changes = sample_changeset(&["src/a.py", "src/b.py"]);
        let result = handler(host.clone())
            .create_pr("acme/widgets", &changes, "U1", None, Some("feature"))
            .await
            .unwrap();

        assert_eq!(result.head_branch, "feature");
        assert_eq!(result.base_branch, "main");
        assert_eq!(result.files_modified.len(), 2);
        assert!(result.files_modified.iter().all(|f| f.is_success()));
        assert!(result.message.is_none());
        assert_eq!(host.commits(), vec![("feature".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_per_file_failures_do_not_stop_the_rest() {
        let host = Arc::new(FakeHost::default());
        let mut changes = sample_changeset(&["ok1.py", "bad.py", "ok2.py"]);
        changes.files[1].content = Some("<<fail>>".to_string());

        let result = handler(host.clone())
            .create_pr("acme/widgets", &changes, "U1", Some("main"), None)
            .await
            .unwrap();

        assert_eq!(result.files_modified.len(), 3);
        assert!(result.files_modified[0].is_success());
        assert_eq!(result.files_modified[1].status, FileStatus::Error);
        assert!(result.files_modified[2].is_success());
        assert_eq!(host.commits().len(), 1);
        assert_eq!(host.commits()[0].1, 2);
    }

    #[tokio::test]
    async fn test_delete_of_missing_file_is_recorded() {
        let host = Arc::new(FakeHost::default());
        let mut changes = sample_changeset(&[]);
        changes.files.push(FileChange {
            path: "nope.py".to_string(),
            action: FileAction::Delete,
            content: None,
        });

        let result = handler(host)
            .create_pr("acme/widgets", &changes, "U1", None, None)
            .await
            .unwrap();
        assert_eq!(result.files_modified[0].status, FileStatus::Error);
    }

    #[tokio::test]
    async fn test_existing_pr_is_returned() {
        let host = Arc::new(FakeHost::default().with_existing_pr(17));
        let changes = sample_changeset(&["a.py"]);
        let result = handler(host.clone())
            .create_pr("acme/widgets", &changes, "U1", None, Some("feature"))
            .await
            .unwrap();

        assert_eq!(result.pr_number, 17);
        assert_eq!(result.message.as_deref(), Some(PR_EXISTS_MESSAGE));
        assert_eq!(host.listed_heads(), vec!["acme:feature".to_string()]);
    }

    #[tokio::test]
    async fn test_existing_branch_is_reused() {
        let host = Arc::new(FakeHost::default().with_branch("feature"));
        let changes = sample_changeset(&["a.py"]);
        let result = handler(host)
            .create_pr("acme/widgets", &changes, "U1", None, Some("feature"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_base_branch_fails_before_staging() {
        let host = Arc::new(FakeHost::default());
        let changes = sample_changeset(&["a.py"]);
        let failure = handler(host.clone())
            .create_pr("acme/widgets", &changes, "U1", Some("does-not-exist"), None)
            .await
            .unwrap_err();
        assert!(failure.error.starts_with("Failed to create branch"));
        assert!(failure.files_modified.is_empty());
        assert!(host.commits().is_empty());
    }

    #[tokio::test]
    async fn test_update_pr_comments_with_summary() {
        let host = Arc::new(FakeHost::default().with_existing_pr(5));
        let mut changes = sample_changeset(&["a.py"]);
        changes.commit_message.clear();

        let result = handler(host.clone())
            .update_pr("acme/widgets", 5, &changes, "U1")
            .await
            .unwrap();
        assert_eq!(result.pr_number, 5);

        let comments = host.comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].1.starts_with(DEFAULT_UPDATE_COMMENT));
        assert!(comments[0].1.contains("- Modified `a.py`"));
        assert_eq!(host.commit_messages(), vec!["Update PR #5".to_string()]);
    }

    #[tokio::test]
    async fn test_merge_refuses_unmergeable() {
        let host = Arc::new(FakeHost::default().with_existing_pr(5).with_mergeable(None));
        let failure = handler(host)
            .merge_pr("acme/widgets", 5, MergeMethod::Squash)
            .await
            .unwrap_err();
        assert_eq!(failure.error, "PR is not mergeable");
        assert_eq!(failure.pr_number, 5);
    }

    #[tokio::test]
    async fn test_merge_uses_title_and_body() {
        let host = Arc::new(FakeHost::default().with_existing_pr(5));
        let result = handler(host.clone())
            .merge_pr("acme/widgets", 5, MergeMethod::Squash)
            .await
            .unwrap();
        assert!(result.merged);
        let merges = host.merges();
        assert_eq!(merges[0].0, "Merge PR #5: Existing PR");
        assert_eq!(merges[0].1, MergeMethod::Squash);
    }

    #[tokio::test]
    async fn test_get_pr_failure_is_wrapped() {
        let host = Arc::new(FakeHost::default());
        let failure = handler(host).get_pr("acme/widgets", 99).await.unwrap_err();
        assert_eq!(failure.pr_number, 99);
        assert_eq!(failure.repo, "acme/widgets");
    }
}
