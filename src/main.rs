mod analyzer;
mod codebase;
mod config;
mod format;
mod github;
mod llm;
mod orchestrator;
mod request;
mod server;
mod slack;
#[cfg(test)]
mod test_support;
mod tools;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use crate::analyzer::CodebaseAnalyzer;
use crate::codebase::{CodebaseCache, GitCodebaseLoader};
use crate::config::Config;
use crate::github::{GitHubClient, GitHubHandler, MergeMethod};
use crate::orchestrator::{MentionOutcome, PrAgent};
use crate::request::{IncomingMention, RequestExtractor};
use crate::slack::{ConsoleMessenger, Messenger, SlackClient};

const CLI_CHANNEL: &str = "cli";

/// PR Agent: a chat bot that turns requests into GitHub pull requests
/// with an LLM coding agent.
#[derive(Parser, Debug)]
#[command(name = "pr-agent", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Slack and GitHub webhook server
    Serve {
        /// Address to bind, overriding the configured one
        #[arg(long)]
        bind: Option<String>,
    },
    /// Handle one request as if the bot had been mentioned, printing replies
    Ask {
        text: String,
        /// User ID replies and branch names are attributed to
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Show a pull request
    Show { repo: String, number: u64 },
    /// Merge a pull request if GitHub reports it mergeable
    Merge {
        repo: String,
        number: u64,
        #[arg(long, value_enum, default_value_t = MergeMethod::Merge)]
        method: MergeMethod,
    },
    /// Generate changes for a request and push them onto an open pull request
    Update {
        repo: String,
        number: u64,
        request: String,
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;

    match cli.command {
        Command::Serve { bind } => {
            let messenger: Arc<dyn Messenger> = Arc::new(SlackClient::new(config.slack.bot_token.clone())?);
            let agent = Arc::new(build_agent(&config, messenger)?);

            let warm = agent.clone();
            tokio::spawn(async move { warm.warm_default_repo().await }.instrument(info_span!("warm_default_repo")));

            let state = Arc::new(server::AppState {
                agent,
                slack_signing_secret: config.slack.signing_secret.clone(),
                github_webhook_secret: config.github.webhook_secret.clone(),
            });
            let addr = bind.unwrap_or_else(|| config.server.bind.clone());
            server::serve(state, &addr).await?;
        }
        Command::Ask { text, user } => {
            let agent = build_agent(&config, Arc::new(ConsoleMessenger::new()))?;
            let mention = IncomingMention {
                text,
                user_id: user,
                channel_id: CLI_CHANNEL.to_string(),
                thread_timestamp: chrono::Utc::now().timestamp().to_string(),
            };
            let outcome = agent.handle_mention(&mention).await;
            info!(outcome = outcome_name(&outcome), "request finished");
            if let MentionOutcome::Rejected(reason) = outcome {
                return Err(reason.into());
            }
        }
        Command::Show { repo, number } => {
            let github = build_github(&config)?;
            let console = ConsoleMessenger::new();
            let details = github.get_pr(&repo, number).await.map_err(|f| f.to_string())?;
            console
                .post_message(CLI_CHANNEL, None, &format::format_pr_details(&details))
                .await?;
        }
        Command::Merge { repo, number, method } => {
            let github = build_github(&config)?;
            let console = ConsoleMessenger::new();
            match github.merge_pr(&repo, number, method).await {
                Ok(result) => {
                    console
                        .post_message(CLI_CHANNEL, None, &format::format_merge_result(&result))
                        .await?;
                }
                Err(failure) => {
                    console
                        .post_message(CLI_CHANNEL, None, &format::format_error(&failure.error))
                        .await?;
                    return Err(failure.to_string().into());
                }
            }
        }
        Command::Update {
            repo,
            number,
            request,
            user,
        } => {
            let console: Arc<dyn Messenger> = Arc::new(ConsoleMessenger::new());
            let agent = build_agent(&config, console.clone())?;
            console
                .post_message(CLI_CHANNEL, None, &format::format_loading("Updating pull request"))
                .await?;
            match agent.update_pull_request(&repo, number, &request, &user).await {
                Ok(result) => {
                    console
                        .post_message(CLI_CHANNEL, None, &format::format_pr_update(&result))
                        .await?;
                }
                Err(e) => {
                    console
                        .post_message(CLI_CHANNEL, None, &format::format_error(&e.to_string()))
                        .await?;
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn build_github(config: &Config) -> Result<GitHubHandler, Box<dyn std::error::Error>> {
    let client = GitHubClient::new(&config.github.api_url, config.github.token.clone())?;
    Ok(GitHubHandler::new(
        Arc::new(client),
        config.github.default_base_branch.clone(),
    ))
}

/// Wire the provider, codebase cache, analyzer and GitHub handler together.
fn build_agent(config: &Config, messenger: Arc<dyn Messenger>) -> Result<PrAgent, Box<dyn std::error::Error>> {
    let provider = llm::build_provider(&config.llm)?;
    info!(provider = provider.name(), model = provider.model(), "model provider ready");

    let loader = GitCodebaseLoader::new(config.github.token.clone(), config.tmp_dir());
    let cache = Arc::new(CodebaseCache::new(
        Arc::new(loader),
        config.repository.cache_capacity,
    ));
    let analyzer = Arc::new(
        CodebaseAnalyzer::new(provider.clone(), cache, config.llm.max_turns)
            .with_workspace_dir(config.tmp_dir()),
    );
    let extractor = RequestExtractor::new(
        config.repository.default_org.clone(),
        config.repository.default_repo.clone(),
        Some(provider),
    );
    let general_repo = config
        .default_full_name()
        .or_else(|| config.repository.default_sdk_repo.clone());

    Ok(PrAgent::new(
        extractor,
        analyzer,
        Arc::new(build_github(config)?),
        messenger,
        general_repo,
    ))
}

fn outcome_name(outcome: &MentionOutcome) -> &'static str {
    match outcome {
        MentionOutcome::Answered => "answered",
        MentionOutcome::Help => "help",
        MentionOutcome::PrCreated(_) => "pr_created",
        MentionOutcome::Rejected(_) => "rejected",
    }
}
