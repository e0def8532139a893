use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::git::{run_git, run_git_with_config};
use super::{Codebase, CodebaseError, Language};

/// Source of materialized codebases. The cache sits in front of this.
#[async_trait]
pub trait CodebaseLoader: Send + Sync {
    async fn load(
        &self,
        identifier: &str,
        language: Language,
        commit: Option<&str>,
    ) -> Result<Codebase, CodebaseError>;
}

/// Materializes repositories with the `git` CLI.
///
/// Strategies, in order: shallow clone from GitHub, an existing local path,
/// conventional local checkout locations, and finally an empty scratch
/// workspace.
pub struct GitCodebaseLoader {
    github_token: Option<String>,
    clone_base_url: String,
    tmp_dir: PathBuf,
    search_roots: Vec<PathBuf>,
}

impl GitCodebaseLoader {
    pub fn new(github_token: Option<String>, tmp_dir: PathBuf) -> Self {
        let search_roots = default_search_roots(&tmp_dir);
        Self {
            github_token,
            clone_base_url: "https://github.com".to_string(),
            tmp_dir,
            search_roots,
        }
    }

    #[cfg(test)]
    pub fn with_clone_base_url(mut self, url: impl Into<String>) -> Self {
        self.clone_base_url = url.into();
        self
    }

    #[cfg(test)]
    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    fn clone_url(&self, identifier: &str) -> String {
        format!("{}/{}.git", self.clone_base_url.trim_end_matches('/'), identifier)
    }

    /// Git settings that authenticate HTTPS transfers without writing the
    /// token into the remote URL.
    fn auth_config(&self) -> Vec<(&'static str, String)> {
        match &self.github_token {
            Some(token) => {
                let credentials = STANDARD.encode(format!("x-access-token:{}", token));
                vec![("http.extraHeader", format!("Authorization: Basic {}", credentials))]
            }
            None => Vec::new(),
        }
    }

    async fn new_workspace(&self, prefix: &str) -> Result<tempfile::TempDir, CodebaseError> {
        let io_err = |source| CodebaseError::Io {
            path: self.tmp_dir.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.tmp_dir).await.map_err(io_err)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.tmp_dir)
            .map_err(io_err)
    }

    async fn clone_remote(
        &self,
        identifier: &str,
        language: Language,
        commit: Option<&str>,
    ) -> Result<Codebase, CodebaseError> {
        let workspace = self.new_workspace("pr-agent-").await?;
        let url = self.clone_url(identifier);
        let dest = workspace.path();
        let auth = self.auth_config();
        let auth: Vec<(&str, &str)> = auth.iter().map(|(k, v)| (*k, v.as_str())).collect();

        match commit {
            None => {
                let dest_str = dest.to_string_lossy().to_string();
                run_git_with_config(
                    &self.tmp_dir,
                    &["clone", "--depth", "1", "--quiet", &url, &dest_str],
                    &auth,
                )
                .await?;
            }
            Some(sha) => {
                run_git(dest, &["init", "--quiet"]).await?;
                run_git(dest, &["remote", "add", "origin", &url]).await?;
                run_git_with_config(dest, &["fetch", "--depth", "1", "--quiet", "origin", sha], &auth).await?;
                run_git(dest, &["checkout", "--quiet", "--detach", "FETCH_HEAD"]).await?;
            }
        }

        info!(identifier, commit = ?commit, root = %dest.display(), "cloned repository");
        Ok(Codebase::from_workspace(
            identifier,
            workspace,
            language,
            commit.map(str::to_string),
        ))
    }

    async fn open_local(
        &self,
        identifier: &str,
        path: &Path,
        language: Language,
        commit: Option<&str>,
    ) -> Result<Codebase, CodebaseError> {
        if let Some(sha) = commit {
            run_git(path, &["checkout", "--quiet", "--detach", sha]).await?;
        }
        info!(identifier, path = %path.display(), "using local checkout");
        Ok(Codebase::from_path(
            identifier,
            path,
            language,
            commit.map(str::to_string),
        ))
    }

    fn conventional_locations(&self, identifier: &str) -> Vec<PathBuf> {
        let name = identifier.rsplit('/').next().unwrap_or(identifier);
        let mut candidates = Vec::new();
        for root in &self.search_roots {
            for candidate in [root.join(identifier), root.join(name)] {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    async fn empty_workspace(
        &self,
        identifier: &str,
        language: Language,
    ) -> Result<Codebase, CodebaseError> {
        let workspace = self.new_workspace("pr-agent-scratch-").await?;
        if let Err(e) = run_git(workspace.path(), &["init", "--quiet"]).await {
            warn!(identifier, error = %e, "scratch workspace is not a git repository");
        }
        warn!(identifier, root = %workspace.path().display(), "falling back to an empty workspace");
        Ok(Codebase::from_workspace(identifier, workspace, language, None))
    }
}

#[async_trait]
impl CodebaseLoader for GitCodebaseLoader {
    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn load(
        &self,
        identifier: &str,
        language: Language,
        commit: Option<&str>,
    ) -> Result<Codebase, CodebaseError> {
        let mut attempts = Vec::new();

        if is_remote_identifier(identifier) {
            match self.clone_remote(identifier, language, commit).await {
                Ok(codebase) => return Ok(codebase),
                Err(e) => attempts.push(format!("remote clone: {}", e)),
            }
        } else {
            attempts.push(format!("remote clone: '{}' is not an org/repo name", identifier));
        }

        let local = Path::new(identifier);
        if local.is_dir() {
            match self.open_local(identifier, local, language, commit).await {
                Ok(codebase) => return Ok(codebase),
                Err(e) => attempts.push(format!("local path: {}", e)),
            }
        } else {
            attempts.push(format!("local path: {} is not a directory", identifier));
        }

        let candidates = self.conventional_locations(identifier);
        for candidate in candidates.iter().filter(|c| c.is_dir()) {
            match self.open_local(identifier, candidate, language, commit).await {
                Ok(codebase) => return Ok(codebase),
                Err(e) => attempts.push(format!("{}: {}", candidate.display(), e)),
            }
        }
        if !candidates.iter().any(|c| c.is_dir()) {
            attempts.push(format!(
                "conventional locations: none of {} exist",
                candidates
                    .iter()
                    .map(|c| c.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        match self.empty_workspace(identifier, language).await {
            Ok(codebase) => Ok(codebase),
            Err(e) => {
                attempts.push(format!("empty workspace: {}", e));
                Err(CodebaseError::Unavailable {
                    identifier: identifier.to_string(),
                    attempts,
                })
            }
        }
    }
}

fn default_search_roots(tmp_dir: &Path) -> Vec<PathBuf> {
    let mut roots = vec![tmp_dir.to_path_buf()];
    if let Some(home) = dirs::home_dir() {
        roots.extend(["code", "projects", "src"].iter().map(|d| home.join(d)));
    }
    roots
}

/// `org/repo` with GitHub-safe characters on both sides.
fn is_remote_identifier(identifier: &str) -> bool {
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match identifier.split_once('/') {
        Some((org, repo)) => valid(org) && valid(repo) && !repo.contains('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_identifier_detection() {
        assert!(is_remote_identifier("acme/widgets"));
        assert!(is_remote_identifier("acme-corp/widgets.js"));
        assert!(!is_remote_identifier("widgets"));
        assert!(!is_remote_identifier("/home/me/widgets"));
        assert!(!is_remote_identifier("a/b/c"));
    }

    #[test]
    fn test_clone_url_carries_no_credentials() {
        let loader = GitCodebaseLoader::new(Some("ghp_x".to_string()), std::env::temp_dir());
        assert_eq!(loader.clone_url("acme/widgets"), "https://github.com/acme/widgets.git");

        let auth = loader.auth_config();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].0, "http.extraHeader");
        let encoded = auth[0].1.strip_prefix("Authorization: Basic ").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), b"x-access-token:ghp_x");

        let anonymous = GitCodebaseLoader::new(None, std::env::temp_dir());
        assert!(anonymous.auth_config().is_empty());
    }

    #[tokio::test]
    async fn test_cloned_config_holds_no_token() {
        let tmp = tempfile::tempdir().unwrap();
        let remotes = tempfile::tempdir().unwrap();
        let upstream = remotes.path().join("acme/widgets.git");
        std::fs::create_dir_all(&upstream).unwrap();
        run_git(&upstream, &["init", "--quiet"]).await.unwrap();
        std::fs::write(upstream.join("main.py"), "print('hi')\n").unwrap();
        run_git(&upstream, &["add", "."]).await.unwrap();
        run_git(
            &upstream,
            &["-c", "user.name=t", "-c", "user.email=t@example.com", "commit", "--quiet", "-m", "init"],
        )
        .await
        .unwrap();

        let base = format!("file://{}", remotes.path().display());
        let loader = GitCodebaseLoader::new(Some("ghp_SECRET".to_string()), tmp.path().to_path_buf())
            .with_clone_base_url(base)
            .with_search_roots(vec![]);
        let codebase = loader.load("acme/widgets", Language::Python, None).await.unwrap();
        assert!(codebase.root().join("main.py").exists());

        let config = std::fs::read_to_string(codebase.root().join(".git/config")).unwrap();
        assert!(!config.contains("ghp_SECRET"));
        assert!(!config.contains("extraHeader"));
    }

    #[test]
    fn test_conventional_locations_include_bare_name() {
        let loader = GitCodebaseLoader::new(None, PathBuf::from("/tmp/agent"))
            .with_search_roots(vec![PathBuf::from("/srv/code")]);
        let candidates = loader.conventional_locations("acme/widgets");
        assert_eq!(
            candidates,
            vec![PathBuf::from("/srv/code/acme/widgets"), PathBuf::from("/srv/code/widgets")]
        );
    }

    #[tokio::test]
    async fn test_local_path_is_used_when_clone_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let checkout = tempfile::tempdir().unwrap();
        std::fs::write(checkout.path().join("main.py"), "def main():\n    pass\n").unwrap();

        let loader = GitCodebaseLoader::new(None, tmp.path().to_path_buf()).with_search_roots(vec![]);
        let identifier = checkout.path().to_string_lossy().to_string();
        let codebase = loader.load(&identifier, Language::Python, None).await.unwrap();
        assert_eq!(codebase.root(), checkout.path());
        assert!(!codebase.is_owned());
    }

    #[tokio::test]
    async fn test_conventional_location_found() {
        let tmp = tempfile::tempdir().unwrap();
        let roots = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(roots.path().join("widgets")).unwrap();

        let loader = GitCodebaseLoader::new(None, tmp.path().to_path_buf())
            .with_clone_base_url("file:///nonexistent-remote")
            .with_search_roots(vec![roots.path().to_path_buf()]);
        let codebase = loader.load("acme/widgets", Language::Python, None).await.unwrap();
        assert_eq!(codebase.root(), roots.path().join("widgets"));
    }

    #[tokio::test]
    async fn test_falls_back_to_empty_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = GitCodebaseLoader::new(None, tmp.path().to_path_buf())
            .with_clone_base_url("file:///nonexistent-remote")
            .with_search_roots(vec![]);
        let codebase = loader.load("acme/widgets", Language::Go, None).await.unwrap();
        assert!(codebase.is_owned());
        assert!(codebase.root().starts_with(tmp.path()));
        assert_eq!(codebase.language(), Language::Go);
    }

    #[tokio::test]
    async fn test_all_strategies_failing_aggregates_errors() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        // tmp_dir is a regular file, so no workspace can be created under it
        let loader = GitCodebaseLoader::new(None, blocker.path().to_path_buf())
            .with_clone_base_url("file:///nonexistent-remote")
            .with_search_roots(vec![]);
        let err = loader.load("acme/widgets", Language::Python, None).await.unwrap_err();
        match err {
            CodebaseError::Unavailable { identifier, attempts } => {
                assert_eq!(identifier, "acme/widgets");
                assert!(attempts.iter().any(|a| a.starts_with("remote clone")));
                assert!(attempts.iter().any(|a| a.starts_with("local path")));
                assert!(attempts.iter().any(|a| a.starts_with("empty workspace")));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
