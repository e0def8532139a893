use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::FileAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Error,
}

/// What happened to one file of a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOperationResult {
    pub path: String,
    pub action: FileAction,
    pub status: FileStatus,
    pub error: Option<String>,
}

impl FileOperationResult {
    pub fn success(path: impl Into<String>, action: FileAction) -> Self {
        Self {
            path: path.into(),
            action,
            status: FileStatus::Success,
            error: None,
        }
    }

    pub fn failure(path: impl Into<String>, action: FileAction, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action,
            status: FileStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Success
    }
}

/// A pull request that was opened, found, or updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrResult {
    pub pr_number: u64,
    pub pr_url: String,
    pub pr_title: String,
    pub pr_body: Option<String>,
    pub files_modified: Vec<FileOperationResult>,
    pub user: String,
    pub head_branch: String,
    pub base_branch: String,
    pub repo: String,
    /// Set when an existing PR was returned instead of a new one
    pub message: Option<String>,
}

/// PR creation or update stopped part-way. Files already staged are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrFailure {
    pub error: String,
    pub files_modified: Vec<FileOperationResult>,
    pub user: String,
    pub repo: String,
    pub head_branch: Option<String>,
    pub base_branch: Option<String>,
    pub pr_number: Option<u64>,
}

/// Failure of a single pass-through call (get, merge, comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubFailure {
    pub error: String,
    pub pr_number: u64,
    pub repo: String,
}

impl std::fmt::Display for GitHubFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}: {}", self.repo, self.pr_number, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDetails {
    pub number: u64,
    pub url: String,
    pub title: String,
    pub body: Option<String>,
    pub head_branch: String,
    pub head_sha: String,
    pub base_branch: String,
    pub state: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` while GitHub is still computing mergeability
    pub mergeable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub pr_number: u64,
    pub repo: String,
    pub merged: bool,
    pub message: String,
    pub sha: Option<String>,
}

/// Raw response of the merge endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeResponse {
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub message: String,
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentResult {
    pub id: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

/// One path in a new tree. `sha: None` removes the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: Option<String>,
}
