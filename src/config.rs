use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = ".pr-agent.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-agent.toml.
///
/// Every field has a default so the bot starts with zero config; secrets
/// normally arrive through the environment (see [`Config::apply_env`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConfig {
    /// Bot token (xoxb-...). Falls back to SLACK_BOT_TOKEN.
    pub bot_token: Option<String>,
    /// Signing secret used to verify Events API requests.
    pub signing_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. Falls back to GITHUB_TOKEN.
    pub token: Option<String>,
    /// Secret for X-Hub-Signature-256 verification of webhooks.
    pub webhook_secret: Option<String>,
    /// Base branch used when the repository default cannot be resolved.
    #[serde(default = "default_base_branch")]
    pub default_base_branch: String,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            webhook_secret: None,
            default_base_branch: default_base_branch(),
            api_url: default_github_api_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// "anthropic" or "openai"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    /// Override for the provider base URL (proxies, compatible gateways).
    pub api_url: Option<String>,
    /// Upper bound on tool-calling round trips per agent run.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub default_org: Option<String>,
    pub default_repo: Option<String>,
    /// Repository used for general questions when no default repo is set.
    #[serde(default = "default_sdk_repo")]
    pub default_sdk_repo: Option<String>,
    /// Where clones and scratch workspaces are created.
    pub tmp_dir: Option<PathBuf>,
    /// Maximum number of materialized codebases kept alive.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_org: None,
            default_repo: None,
            default_sdk_repo: default_sdk_repo(),
            tmp_dir: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_max_turns() -> usize {
    25
}

fn default_sdk_repo() -> Option<String> {
    Some("codegen-sh/codegen-sdk".to_string())
}

fn default_cache_capacity() -> usize {
    8
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Config {
    /// Load configuration from .pr-agent.toml in the current directory, then
    /// overlay environment variables. Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Overlay values from the environment. Tokens only fill gaps left by the
    /// file; model and repository settings from the environment win.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if self.slack.bot_token.is_none() {
            self.slack.bot_token = non_empty("SLACK_BOT_TOKEN");
        }
        if self.slack.signing_secret.is_none() {
            self.slack.signing_secret = non_empty("SLACK_SIGNING_SECRET");
        }
        if self.github.token.is_none() {
            self.github.token = non_empty("GITHUB_TOKEN");
        }
        if self.github.webhook_secret.is_none() {
            self.github.webhook_secret = non_empty("GITHUB_WEBHOOK_SECRET");
        }

        if let Some(provider) = non_empty("CODEGEN_MODEL_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = non_empty("CODEGEN_MODEL_NAME") {
            self.llm.model = model;
        }
        if self.llm.api_key.is_none() {
            let key_var = if self.llm.provider.eq_ignore_ascii_case("openai") {
                "OPENAI_API_KEY"
            } else {
                "ANTHROPIC_API_KEY"
            };
            self.llm.api_key = non_empty(key_var);
        }

        if let Some(org) = non_empty("DEFAULT_ORG") {
            self.repository.default_org = Some(org);
        }
        if let Some(repo) = non_empty("DEFAULT_REPO") {
            self.repository.default_repo = Some(repo);
        }
        if let Some(sdk) = non_empty("DEFAULT_SDK_REPO") {
            self.repository.default_sdk_repo = Some(sdk);
        }
        if let Some(dir) = non_empty("CODEGEN_TMP_DIR") {
            self.repository.tmp_dir = Some(PathBuf::from(dir));
        }
        if let Some(bind) = non_empty("PR_AGENT_BIND") {
            self.server.bind = bind;
        }
    }

    /// Directory for clones and scratch workspaces.
    pub fn tmp_dir(&self) -> PathBuf {
        self.repository
            .tmp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// `org/repo` of the configured default repository, when both halves are set.
    pub fn default_full_name(&self) -> Option<String> {
        match (&self.repository.default_org, &self.repository.default_repo) {
            (Some(org), Some(repo)) => Some(format!("{}/{}", org, repo)),
            _ => None,
        }
    }
}
