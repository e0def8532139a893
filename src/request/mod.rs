pub mod types;

pub use types::{ChangeRequest, IncomingMention, RepoReference};

use once_cell::sync::Lazy;
use regex::{Match, Regex};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::llm::{self, json, LlmProvider};

const PLACEHOLDER: &str = "default";

static PR_REQUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:create|make|submit|open)\s+(?:a\s+)?(?:pr|pull\s+request)\b")
        .expect("pr request pattern is valid")
});

static QUALIFIED_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:in|for|to|on|at)\s+(?:the\s+)?(?:repo(?:sitory)?|project)?\s*["']?([a-zA-Z0-9_.-]+/[a-zA-Z0-9_.-]+)["']?"#,
    )
    .expect("qualified repo pattern is valid")
});

static BARE_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:in|for|to|on|at)\s+(?:the\s+)?(?:repo(?:sitory)?|project)?\s*["']?([a-zA-Z0-9_.-]+)["']?"#,
    )
    .expect("bare repo pattern is valid")
});

static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@[A-Z0-9]+(?:\|[^>]*)?>").expect("mention pattern is valid"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Does the message ask for a pull request ("create a PR", "open pull request", ...)?
pub fn is_pr_creation_request(text: &str) -> bool {
    PR_REQUEST.is_match(text)
}

/// Message text with `<@U..>` mention tokens removed and whitespace collapsed.
pub fn strip_mentions(text: &str) -> String {
    let text = USER_MENTION.replace_all(text, " ");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

#[derive(Debug, Deserialize)]
struct ExtractedRepo {
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    repo: Option<String>,
}

/// Pulls the target repository and the requested change out of chat text.
pub struct RequestExtractor {
    default_org: Option<String>,
    default_repo: Option<String>,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl RequestExtractor {
    pub fn new(
        default_org: Option<String>,
        default_repo: Option<String>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            default_org,
            default_repo,
            llm,
        }
    }

    /// Resolve the repository a request targets.
    ///
    /// Tries an explicit `org/repo`, then a bare name under the default org,
    /// then the configured default repository, then asks the model. Returns
    /// an empty reference when nothing works.
    #[instrument(skip(self, text))]
    pub async fn extract_repo_info(&self, text: &str) -> RepoReference {
        if let Some((_, reference)) = self.repository_phrase(text) {
            debug!(repo = %reference.full_name, "repository named in message");
            return reference;
        }

        if let Some(reference) = self.configured_default() {
            debug!(repo = %reference.full_name, "using default repository");
            return reference;
        }

        match self.extract_with_llm(text).await {
            Some(reference) => reference,
            None => RepoReference::unresolved(),
        }
    }

    /// The change the user asked for, with the command phrase, repository
    /// phrase and user mentions removed. Empty means nothing usable was said.
    pub fn extract_change_details(&self, text: &str) -> String {
        let mut remaining = PR_REQUEST.replace(text, "").into_owned();
        if let Some((span, _)) = self.repository_phrase(&remaining) {
            remaining.replace_range(span, "");
        }
        let remaining = USER_MENTION.replace_all(&remaining, " ");
        WHITESPACE.replace_all(remaining.trim(), " ").into_owned()
    }

    /// Resolve both halves of a PR request.
    pub async fn parse(&self, text: &str) -> ChangeRequest {
        ChangeRequest {
            repository: self.extract_repo_info(text).await,
            description: self.extract_change_details(text),
        }
    }

    fn configured_default(&self) -> Option<RepoReference> {
        match (&self.default_org, &self.default_repo) {
            (Some(org), Some(repo)) => Some(RepoReference::new(org, repo)),
            _ => None,
        }
    }

    /// The regex-resolved repository and the byte span of the phrase naming it.
    fn repository_phrase(&self, text: &str) -> Option<(std::ops::Range<usize>, RepoReference)> {
        if let Some(caps) = QUALIFIED_REPO.captures(text) {
            let whole = caps.get(0)?;
            let name = clean_name(caps.get(1)?);
            if let Some((org, repo)) = name.split_once('/') {
                if !org.is_empty() && !repo.is_empty() {
                    return Some((whole.range(), RepoReference::new(org, repo)));
                }
            }
        }

        let org = self.default_org.as_ref()?;
        let caps = BARE_REPO.captures(text)?;
        let whole = caps.get(0)?;
        let repo = clean_name(caps.get(1)?);
        if repo.is_empty() {
            return None;
        }
        Some((whole.range(), RepoReference::new(org, repo)))
    }

    async fn extract_with_llm(&self, text: &str) -> Option<RepoReference> {
        let provider = self.llm.as_ref()?;
        let prompt = format!(
            r#"Extract the repository name from the following text:

{text}

Return the result as a JSON object with the following structure:
{{
    "org": "organization_name",
    "repo": "repository_name"
}}

If the organization name is not explicitly mentioned, use "default" as the organization name.
If the repository name is not explicitly mentioned, use "default" as the repository name."#
        );

        let response = match llm::complete(provider.as_ref(), &prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "repository extraction call failed");
                return None;
            }
        };

        let extracted: ExtractedRepo = match json::parse_json_response(&response) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(error = %e, response = %response, "could not parse repository extraction");
                return None;
            }
        };

        let org = self.fill_placeholder(extracted.org, &self.default_org)?;
        let repo = self.fill_placeholder(extracted.repo, &self.default_repo)?;
        debug!(org = %org, repo = %repo, "repository extracted by model");
        Some(RepoReference::new(org, repo))
    }

    fn fill_placeholder(&self, value: Option<String>, fallback: &Option<String>) -> Option<String> {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        if value.eq_ignore_ascii_case(PLACEHOLDER) {
            fallback.clone()
        } else {
            Some(value)
        }
    }
}

fn clean_name(m: Match<'_>) -> &str {
    m.as_str().trim_end_matches('.')
}
