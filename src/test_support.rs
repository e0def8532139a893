//! In-memory fakes for the seam traits, shared by unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::analyzer::{ChangeSet, FileAction, FileChange};
use crate::codebase::{Codebase, CodebaseError, CodebaseLoader, Language};
use crate::github::{
    CommentResult, GitHubError, MergeMethod, MergeResponse, PullRequestDetails, RepoHost, TreeEntry,
};
use crate::llm::{ChatRequest, ChatResponse, LlmError, LlmProvider};
use crate::slack::{Messenger, SlackError};

/// Working tree with `src/app.py` (4 lines) and `README.md`.
pub fn sample_codebase() -> Codebase {
    let dir = tempfile::tempdir().unwrap();
    write_sample_files(dir.path());
    Codebase::from_workspace("acme/widgets", dir, Language::Python, None)
}

fn write_sample_files(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("src/app.py"),
        "import sys\ndef main():\n    run()\nmain()\n",
    )
    .unwrap();
    std::fs::write(root.join("README.md"), "# widgets\n").unwrap();
}

/// Change set modifying each of `paths` with placeholder content.
pub fn sample_changeset(paths: &[&str]) -> ChangeSet {
    ChangeSet {
        pr_title: "Add feature".to_string(),
        pr_description: "Adds the feature".to_string(),
        commit_message: "Add feature".to_string(),
        pr_comment: None,
        files: paths
            .iter()
            .map(|path| FileChange {
                path: path.to_string(),
                action: FileAction::Modify,
                content: Some(format!("# {}\n", path)),
            })
            .collect(),
    }
}

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(texts: Vec<&str>) -> Self {
        Self::with_responses(texts.into_iter().map(ChatResponse::text).collect())
    }

    pub fn with_responses(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

/// Hands out fresh sample working trees, or fails every load.
#[derive(Default)]
pub struct StubLoader {
    fail: bool,
    loads: AtomicUsize,
}

impl StubLoader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodebaseLoader for StubLoader {
    async fn load(
        &self,
        identifier: &str,
        language: Language,
        commit: Option<&str>,
    ) -> Result<Codebase, CodebaseError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CodebaseError::Unavailable {
                identifier: identifier.to_string(),
                attempts: vec!["stub: refused".to_string()],
            });
        }
        let dir = tempfile::tempdir().unwrap();
        write_sample_files(dir.path());
        Ok(Codebase::from_workspace(
            identifier,
            dir,
            language,
            commit.map(str::to_string),
        ))
    }
}

#[derive(Default)]
struct HostState {
    branches: HashMap<String, String>,
    files: HashSet<String>,
    pulls: HashMap<u64, PullRequestDetails>,
    next_pull: u64,
    next_sha: u64,
    conflicting_branches: HashSet<String>,
    pr_conflict: bool,
    commits: Vec<(String, usize)>,
    commit_messages: Vec<String>,
    listed_heads: Vec<String>,
    comments: Vec<(u64, String)>,
    merges: Vec<(String, MergeMethod)>,
}

/// In-memory GitHub with a `main` branch and a `README.md`.
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl Default for FakeHost {
    fn default() -> Self {
        let mut state = HostState {
            next_pull: 1,
            ..HostState::default()
        };
        state.branches.insert("main".to_string(), "sha-main".to_string());
        state.files.insert("README.md".to_string());
        Self {
            state: Mutex::new(state),
        }
    }
}

fn not_found(what: &str) -> GitHubError {
    GitHubError::Api {
        status: 404,
        message: format!("Not Found: {}", what),
    }
}

impl FakeHost {
    /// Adds open PR `number` titled "Existing PR". Opening another PR then
    /// fails with GitHub's "already exists" conflict.
    pub fn with_existing_pr(self, number: u64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let head = format!("existing-{}", number);
            state.branches.insert(head.clone(), format!("sha-{}", head));
            let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
            state.pulls.insert(
                number,
                PullRequestDetails {
                    number,
                    url: format!("https://github.com/acme/widgets/pull/{}", number),
                    title: "Existing PR".to_string(),
                    body: Some("Existing body".to_string()),
                    head_branch: head,
                    head_sha: format!("headsha{}", number),
                    base_branch: "main".to_string(),
                    state: "open".to_string(),
                    user: "octocat".to_string(),
                    created_at: created,
                    updated_at: created,
                    mergeable: Some(true),
                },
            );
            state.pr_conflict = true;
        }
        self
    }

    /// `branch` exists already, so creating it conflicts.
    pub fn with_branch(self, branch: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.branches.insert(branch.to_string(), format!("sha-{}", branch));
            state.conflicting_branches.insert(branch.to_string());
        }
        self
    }

    pub fn with_mergeable(self, mergeable: Option<bool>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for pull in state.pulls.values_mut() {
                pull.mergeable = mergeable;
            }
        }
        self
    }

    pub fn commits(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.state.lock().unwrap().commit_messages.clone()
    }

    pub fn listed_heads(&self) -> Vec<String> {
        self.state.lock().unwrap().listed_heads.clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn merges(&self) -> Vec<(String, MergeMethod)> {
        self.state.lock().unwrap().merges.clone()
    }
}

#[async_trait]
impl RepoHost for FakeHost {
    async fn default_branch(&self, _repo: &str) -> Result<String, GitHubError> {
        Ok("main".to_string())
    }

    async fn branch_head(&self, _repo: &str, branch: &str) -> Result<String, GitHubError> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| not_found(branch))
    }

    async fn create_branch(&self, _repo: &str, branch: &str, sha: &str) -> Result<(), GitHubError> {
        let mut state = self.state.lock().unwrap();
        if state.conflicting_branches.contains(branch) {
            return Err(GitHubError::Api {
                status: 422,
                message: "Reference already exists".to_string(),
            });
        }
        state.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn create_blob(&self, _repo: &str, content: &str) -> Result<String, GitHubError> {
        if content.contains("<<fail>>") {
            return Err(GitHubError::Api {
                status: 422,
                message: "Invalid blob content".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.next_sha += 1;
        Ok(format!("blob-{}", state.next_sha))
    }

    async fn file_exists(&self, _repo: &str, path: &str, _branch: &str) -> Result<bool, GitHubError> {
        Ok(self.state.lock().unwrap().files.contains(path))
    }

    async fn commit_tree(
        &self,
        _repo: &str,
        branch: &str,
        _parent_sha: &str,
        entries: &[TreeEntry],
        message: &str,
    ) -> Result<String, GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.next_sha += 1;
        let sha = format!("commit-{}", state.next_sha);
        state.branches.insert(branch.to_string(), sha.clone());
        state.commits.push((branch.to_string(), entries.len()));
        state.commit_messages.push(message.to_string());
        Ok(sha)
    }

    async fn create_pull(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestDetails, GitHubError> {
        let mut state = self.state.lock().unwrap();
        if state.pr_conflict {
            return Err(GitHubError::Api {
                status: 422,
                message: format!("Validation Failed: A pull request already exists for acme:{}.", head),
            });
        }
        let number = state.next_pull;
        state.next_pull += 1;
        let now = Utc::now();
        let pull = PullRequestDetails {
            number,
            url: format!("https://github.com/{}/pull/{}", repo, number),
            title: title.to_string(),
            body: Some(body.to_string()),
            head_branch: head.to_string(),
            head_sha: state.branches.get(head).cloned().unwrap_or_default(),
            base_branch: base.to_string(),
            state: "open".to_string(),
            user: "pr-agent[bot]".to_string(),
            created_at: now,
            updated_at: now,
            mergeable: None,
        };
        state.pulls.insert(number, pull.clone());
        Ok(pull)
    }

    async fn list_open_pulls(&self, _repo: &str, head: &str) -> Result<Vec<PullRequestDetails>, GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.listed_heads.push(head.to_string());
        let mut pulls: Vec<_> = state.pulls.values().cloned().collect();
        pulls.sort_by_key(|p| p.number);
        Ok(pulls)
    }

    async fn get_pull(&self, _repo: &str, number: u64) -> Result<PullRequestDetails, GitHubError> {
        self.state
            .lock()
            .unwrap()
            .pulls
            .get(&number)
            .cloned()
            .ok_or_else(|| not_found(&format!("pull {}", number)))
    }

    async fn pull_diff(&self, repo: &str, number: u64) -> Result<String, GitHubError> {
        self.get_pull(repo, number).await?;
        Ok("diff --git a/src/app.py b/src/app.py\n--- a/src/app.py\n+++ b/src/app.py\n@@ -1 +1 @@\n-import sys\n+import os\n"
            .to_string())
    }

    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        _message: &str,
        method: MergeMethod,
    ) -> Result<MergeResponse, GitHubError> {
        self.get_pull(repo, number).await?;
        self.state
            .lock()
            .unwrap()
            .merges
            .push((title.to_string(), method));
        Ok(MergeResponse {
            merged: true,
            message: "Pull Request successfully merged".to_string(),
            sha: Some("6dcb09b5b57875f334f61aebed695e2e4193db5e".to_string()),
        })
    }

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<CommentResult, GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.comments.push((number, body.to_string()));
        let id = state.comments.len() as u64;
        Ok(CommentResult {
            id,
            html_url: format!("https://github.com/{}/pull/{}#issuecomment-{}", repo, number, id),
        })
    }
}

/// One message the bot sent, and whether it was an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    /// Thread for posts, edited message for updates
    pub ts: Option<String>,
    pub text: String,
    pub is_update: bool,
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    panic_on_first_post: AtomicBool,
}

impl RecordingMessenger {
    /// The first `post_message` call panics; later calls are recorded.
    pub fn panicking_once() -> Self {
        Self {
            sent: Mutex::default(),
            panic_on_first_post: AtomicBool::new(true),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn posts(&self) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| !m.is_update).collect()
    }

    pub fn updates(&self) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.is_update).collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn post_message(&self, channel: &str, thread_ts: Option<&str>, text: &str) -> Result<String, SlackError> {
        if self.panic_on_first_post.swap(false, Ordering::SeqCst) {
            panic!("messenger crashed");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentMessage {
            channel: channel.to_string(),
            ts: thread_ts.map(str::to_string),
            text: text.to_string(),
            is_update: false,
        });
        Ok(format!("100{}.000", sent.len()))
    }

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<(), SlackError> {
        self.sent.lock().unwrap().push(SentMessage {
            channel: channel.to_string(),
            ts: Some(ts.to_string()),
            text: text.to_string(),
            is_update: true,
        });
        Ok(())
    }
}
