use serde_json::{Map, Value};
use tracing::info;

use super::{required_str, PullRequestTarget, ToolError};

const MAX_DIFF_CHARS: usize = 60_000;

pub async fn view(target: Option<&PullRequestTarget>) -> Result<String, ToolError> {
    let target = target.ok_or(ToolError::NoPullRequest)?;
    let diff = target.host.pull_diff(&target.repo, target.number).await?;
    if diff.chars().count() <= MAX_DIFF_CHARS {
        return Ok(diff);
    }
    let truncated: String = diff.chars().take(MAX_DIFF_CHARS).collect();
    Ok(format!(
        "{}\n... diff truncated; use view_file for the remaining changes",
        truncated
    ))
}

pub async fn comment(target: Option<&PullRequestTarget>, args: &Map<String, Value>) -> Result<String, ToolError> {
    let target = target.ok_or(ToolError::NoPullRequest)?;
    let body = required_str(args, "body")?;
    let posted = target.host.comment(&target.repo, target.number, body).await?;
    info!(repo = %target.repo, pr = target.number, comment = posted.id, "posted review comment");
    Ok(format!("Comment posted: {}", posted.html_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHost;
    use serde_json::json;
    use std::sync::Arc;

    fn target(host: Arc<FakeHost>) -> PullRequestTarget {
        PullRequestTarget {
            host,
            repo: "acme/widgets".to_string(),
            number: 5,
        }
    }

    #[tokio::test]
    async fn test_view_without_target() {
        assert!(matches!(view(None).await, Err(ToolError::NoPullRequest)));
    }

    #[tokio::test]
    async fn test_view_returns_diff() {
        let host = Arc::new(FakeHost::default().with_existing_pr(5));
        let diff = view(Some(&target(host))).await.unwrap();
        assert!(diff.starts_with("diff --git"));
    }

    #[tokio::test]
    async fn test_comment_posts_to_pr() {
        let host = Arc::new(FakeHost::default().with_existing_pr(5));
        let args = json!({"body": "Looks good"}).as_object().cloned().unwrap();
        let output = comment(Some(&target(host.clone())), &args).await.unwrap();
        assert!(output.starts_with("Comment posted: "));
        assert_eq!(host.comments(), vec![(5, "Looks good".to_string())]);
    }
}
