use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::{CommentResult, MergeMethod, MergeResponse, PullRequestDetails, TreeEntry};
use super::{GitHubError, RepoHost};

const USER_AGENT: &str = "pr-agent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Deserialize)]
struct ApiBranchRef {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Deserialize)]
struct ApiPull {
    number: u64,
    html_url: String,
    title: String,
    body: Option<String>,
    head: ApiBranchRef,
    base: ApiBranchRef,
    state: String,
    user: ApiUser,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    mergeable: Option<bool>,
}

impl From<ApiPull> for PullRequestDetails {
    fn from(pull: ApiPull) -> Self {
        PullRequestDetails {
            number: pull.number,
            url: pull.html_url,
            title: pull.title,
            body: pull.body,
            head_branch: pull.head.name,
            head_sha: pull.head.sha,
            base_branch: pull.base.name,
            state: pull.state,
            user: pull.user.login,
            created_at: pull.created_at,
            updated_at: pull.updated_at,
            mergeable: pull.mergeable,
        }
    }
}

#[derive(Deserialize)]
struct ShaOnly {
    sha: String,
}

/// GitHub REST v3 over reqwest.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.api_url, path))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, GitHubError> {
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GitHubError> {
        Ok(self.send(builder).await?.json::<T>().await?)
    }
}

/// Build `GitHubError::Api` from an error response, preferring GitHub's own
/// `message` plus any `errors[].message` details.
async fn api_error(response: Response) -> GitHubError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<Value>(&text) {
        Ok(body) => {
            let mut parts: Vec<String> = body["message"].as_str().map(str::to_string).into_iter().collect();
            if let Some(errors) = body["errors"].as_array() {
                parts.extend(
                    errors
                        .iter()
                        .filter_map(|e| e["message"].as_str())
                        .map(str::to_string),
                );
            }
            if parts.is_empty() {
                text
            } else {
                parts.join(": ")
            }
        }
        Err(_) => text,
    };
    GitHubError::Api { status, message }
}

#[async_trait::async_trait]
impl RepoHost for GitHubClient {
    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        #[derive(Deserialize)]
        struct Repo {
            default_branch: String,
        }
        let info: Repo = self
            .send_json(self.request(Method::GET, &format!("/repos/{}", repo)))
            .await?;
        Ok(info.default_branch)
    }

    async fn branch_head(&self, repo: &str, branch: &str) -> Result<String, GitHubError> {
        #[derive(Deserialize)]
        struct GitRef {
            object: ShaOnly,
        }
        let git_ref: GitRef = self
            .send_json(self.request(Method::GET, &format!("/repos/{}/git/ref/heads/{}", repo, branch)))
            .await?;
        Ok(git_ref.object.sha)
    }

    #[instrument(skip(self), fields(repo = %repo, branch = %branch))]
    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> Result<(), GitHubError> {
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        self.send(self.request(Method::POST, &format!("/repos/{}/git/refs", repo)).json(&body))
            .await?;
        debug!("created branch");
        Ok(())
    }

    async fn create_blob(&self, repo: &str, content: &str) -> Result<String, GitHubError> {
        let body = json!({ "content": content, "encoding": "utf-8" });
        let blob: ShaOnly = self
            .send_json(self.request(Method::POST, &format!("/repos/{}/git/blobs", repo)).json(&body))
            .await?;
        Ok(blob.sha)
    }

    async fn file_exists(&self, repo: &str, path: &str, branch: &str) -> Result<bool, GitHubError> {
        let response = self
            .request(Method::GET, &format!("/repos/{}/contents/{}", repo, path))
            .query(&[("ref", branch)])
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(api_error(response).await),
        }
    }

    #[instrument(skip(self, entries, message), fields(repo = %repo, branch = %branch, files = entries.len()))]
    async fn commit_tree(
        &self,
        repo: &str,
        branch: &str,
        parent_sha: &str,
        entries: &[TreeEntry],
        message: &str,
    ) -> Result<String, GitHubError> {
        #[derive(Deserialize)]
        struct Commit {
            tree: ShaOnly,
        }
        let parent: Commit = self
            .send_json(self.request(Method::GET, &format!("/repos/{}/git/commits/{}", repo, parent_sha)))
            .await?;

        let tree: Vec<Value> = entries
            .iter()
            .map(|entry| json!({ "path": entry.path, "mode": "100644", "type": "blob", "sha": entry.sha }))
            .collect();
        let new_tree: ShaOnly = self
            .send_json(
                self.request(Method::POST, &format!("/repos/{}/git/trees", repo))
                    .json(&json!({ "base_tree": parent.tree.sha, "tree": tree })),
            )
            .await?;

        let commit: ShaOnly = self
            .send_json(
                self.request(Method::POST, &format!("/repos/{}/git/commits", repo)).json(&json!({
                    "message": message,
                    "tree": new_tree.sha,
                    "parents": [parent_sha],
                })),
            )
            .await?;

        self.send(
            self.request(Method::PATCH, &format!("/repos/{}/git/refs/heads/{}", repo, branch))
                .json(&json!({ "sha": commit.sha, "force": false })),
        )
        .await?;
        debug!(commit = %commit.sha, "branch advanced");
        Ok(commit.sha)
    }

    #[instrument(skip(self, body), fields(repo = %repo, head = %head, base = %base))]
    async fn create_pull(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequestDetails, GitHubError> {
        let payload = json!({ "title": title, "body": body, "head": head, "base": base });
        let pull: ApiPull = self
            .send_json(self.request(Method::POST, &format!("/repos/{}/pulls", repo)).json(&payload))
            .await?;
        Ok(pull.into())
    }

    async fn list_open_pulls(&self, repo: &str, head: &str) -> Result<Vec<PullRequestDetails>, GitHubError> {
        let pulls: Vec<ApiPull> = self
            .send_json(
                self.request(Method::GET, &format!("/repos/{}/pulls", repo))
                    .query(&[("state", "open"), ("head", head)]),
            )
            .await?;
        Ok(pulls.into_iter().map(PullRequestDetails::from).collect())
    }

    async fn get_pull(&self, repo: &str, number: u64) -> Result<PullRequestDetails, GitHubError> {
        let pull: ApiPull = self
            .send_json(self.request(Method::GET, &format!("/repos/{}/pulls/{}", repo, number)))
            .await?;
        Ok(pull.into())
    }

    async fn pull_diff(&self, repo: &str, number: u64) -> Result<String, GitHubError> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/pulls/{}", repo, number))
                    .header("Accept", "application/vnd.github.diff"),
            )
            .await?;
        let diff = response.text().await?;
        debug!(diff_bytes = diff.len(), "received PR diff");
        Ok(diff)
    }

    #[instrument(skip(self, title, message), fields(repo = %repo, pr = number, method = method.as_str()))]
    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        message: &str,
        method: MergeMethod,
    ) -> Result<MergeResponse, GitHubError> {
        let payload = json!({
            "commit_title": title,
            "commit_message": message,
            "merge_method": method.as_str(),
        });
        self.send_json(
            self.request(Method::PUT, &format!("/repos/{}/pulls/{}/merge", repo, number)).json(&payload),
        )
        .await
    }

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<CommentResult, GitHubError> {
        self.send_json(
            self.request(Method::POST, &format!("/repos/{}/issues/{}/comments", repo, number))
                .json(&json!({ "body": body })),
        )
        .await
    }
}
