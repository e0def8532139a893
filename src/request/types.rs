/// A chat message in which the bot was tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMention {
    /// Raw message text, including the `<@BOT>` mention token
    pub text: String,
    /// Slack user ID of the author
    pub user_id: String,
    /// Channel the message was posted in
    pub channel_id: String,
    /// Thread to reply into (`thread_ts`, or the message `ts` for top-level messages)
    pub thread_timestamp: String,
}

/// Repository named (or implied) by a request.
///
/// Either fully resolved, with `full_name == "{org}/{repo}"`, or entirely
/// empty. Callers must treat an empty `full_name` as a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoReference {
    pub org: String,
    pub repo: String,
    pub full_name: String,
}

impl RepoReference {
    pub fn new(org: impl Into<String>, repo: impl Into<String>) -> Self {
        let org = org.into();
        let repo = repo.into();
        let full_name = format!("{}/{}", org, repo);
        Self {
            org,
            repo,
            full_name,
        }
    }

    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        !self.full_name.is_empty()
    }
}

/// A PR request reduced to its target repository and what should change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    pub repository: RepoReference,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_reference_full_name() {
        let reference = RepoReference::new("acme", "widgets");
        assert_eq!(reference.full_name, "acme/widgets");
        assert!(reference.is_resolved());
    }

    #[test]
    fn test_unresolved_reference_is_empty() {
        let reference = RepoReference::unresolved();
        assert!(reference.org.is_empty());
        assert!(reference.repo.is_empty());
        assert!(!reference.is_resolved());
    }
}
