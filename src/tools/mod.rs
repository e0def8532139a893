pub mod files;
pub mod pull_request;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::codebase::{Codebase, CodebaseError};
use crate::github::{GitHubError, RepoHost};
use crate::llm::ToolSpec;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("{0}")]
    Codebase(#[from] CodebaseError),

    #[error("{0}")]
    GitHub(#[from] GitHubError),

    #[error("No pull request is attached to this conversation")]
    NoPullRequest,
}

/// A capability the agent can call. Arguments arrive as the JSON object the
/// model produced; the result is plain text fed back to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the argument object
    fn input_schema(&self) -> Value;

    async fn invoke(&self, context: &ToolContext, args: &Map<String, Value>) -> Result<String, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// The pull request a review conversation is about.
#[derive(Clone)]
pub struct PullRequestTarget {
    pub host: Arc<dyn RepoHost>,
    pub repo: String,
    pub number: u64,
}

/// What tools operate on.
#[derive(Clone)]
pub struct ToolContext {
    pub codebase: Arc<Codebase>,
    pub pull_request: Option<PullRequestTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ListDirectory,
    ViewFile,
    Search,
    CreateFile,
    EditFile,
    DeleteFile,
    ViewPullRequest,
    CommentOnPullRequest,
}

const INSPECTION: &[ToolKind] = &[ToolKind::ListDirectory, ToolKind::ViewFile, ToolKind::Search];
const EDITING: &[ToolKind] = &[ToolKind::CreateFile, ToolKind::EditFile, ToolKind::DeleteFile];
const REVIEW: &[ToolKind] = &[ToolKind::ViewPullRequest, ToolKind::CommentOnPullRequest];

#[async_trait]
impl Tool for ToolKind {
    fn name(&self) -> &'static str {
        match self {
            ToolKind::ListDirectory => "list_directory",
            ToolKind::ViewFile => "view_file",
            ToolKind::Search => "search",
            ToolKind::CreateFile => "create_file",
            ToolKind::EditFile => "edit_file",
            ToolKind::DeleteFile => "delete_file",
            ToolKind::ViewPullRequest => "view_pull_request",
            ToolKind::CommentOnPullRequest => "comment_on_pull_request",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ToolKind::ListDirectory => "List files and directories under a path in the repository. Directories end with '/'.",
            ToolKind::ViewFile => "Show the contents of a file with line numbers, optionally limited to a line range.",
            ToolKind::Search => "Search file contents with a regular expression. Returns path:line: text for each match.",
            ToolKind::CreateFile => "Create a new file with the given content. Fails if the file already exists.",
            ToolKind::EditFile => "Replace one exact occurrence of old_text with new_text in a file.",
            ToolKind::DeleteFile => "Delete a file from the repository.",
            ToolKind::ViewPullRequest => "Show the unified diff of the pull request under review.",
            ToolKind::CommentOnPullRequest => "Post a review comment on the pull request under review.",
        }
    }

    fn input_schema(&self) -> Value {
        match self {
            ToolKind::ListDirectory => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory relative to the repository root (default: root)"},
                    "depth": {"type": "integer", "description": "How many levels to descend (1-5, default 2)"}
                }
            }),
            ToolKind::ViewFile => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "start_line": {"type": "integer", "description": "First line to show (1-based)"},
                    "end_line": {"type": "integer", "description": "Last line to show (inclusive)"}
                },
                "required": ["path"]
            }),
            ToolKind::Search => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Regular expression (invalid patterns are matched literally)"},
                    "path": {"type": "string", "description": "Directory to search in (default: root)"},
                    "max_results": {"type": "integer"}
                },
                "required": ["query"]
            }),
            ToolKind::CreateFile => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
            ToolKind::EditFile => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "old_text": {"type": "string", "description": "Exact text to replace; must occur exactly once"},
                    "new_text": {"type": "string"}
                },
                "required": ["path", "old_text", "new_text"]
            }),
            ToolKind::DeleteFile => json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
            ToolKind::ViewPullRequest => json!({"type": "object", "properties": {}}),
            ToolKind::CommentOnPullRequest => json!({
                "type": "object",
                "properties": {"body": {"type": "string", "description": "Markdown comment body"}},
                "required": ["body"]
            }),
        }
    }

    async fn invoke(&self, context: &ToolContext, args: &Map<String, Value>) -> Result<String, ToolError> {
        let codebase = context.codebase.as_ref();
        match self {
            ToolKind::ListDirectory => files::list_directory(codebase, args).await,
            ToolKind::ViewFile => files::view_file(codebase, args).await,
            ToolKind::Search => files::search(codebase, args).await,
            ToolKind::CreateFile => files::create_file(codebase, args).await,
            ToolKind::EditFile => files::edit_file(codebase, args).await,
            ToolKind::DeleteFile => files::delete_file(codebase, args).await,
            ToolKind::ViewPullRequest => pull_request::view(context.pull_request.as_ref()).await,
            ToolKind::CommentOnPullRequest => pull_request::comment(context.pull_request.as_ref(), args).await,
        }
    }
}

/// A fixed set of tools bound to one codebase (and optionally one PR).
pub struct Toolset {
    context: ToolContext,
    tools: Vec<ToolKind>,
}

impl Toolset {
    /// Read-only: list, view, search.
    pub fn inspection(codebase: Arc<Codebase>) -> Self {
        Self::build(codebase, None, &[INSPECTION])
    }

    /// Inspection plus create, edit and delete.
    pub fn editing(codebase: Arc<Codebase>) -> Self {
        Self::build(codebase, None, &[INSPECTION, EDITING])
    }

    /// Inspection plus viewing and commenting on one pull request.
    pub fn review(codebase: Arc<Codebase>, target: PullRequestTarget) -> Self {
        Self::build(codebase, Some(target), &[INSPECTION, REVIEW])
    }

    fn build(codebase: Arc<Codebase>, pull_request: Option<PullRequestTarget>, groups: &[&[ToolKind]]) -> Self {
        Self {
            context: ToolContext {
                codebase,
                pull_request,
            },
            tools: groups.iter().flat_map(|g| g.iter().copied()).collect(),
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn codebase(&self) -> &Arc<Codebase> {
        &self.context.codebase
    }

    /// Run the tool called `name`. Non-object arguments are treated as empty.
    #[instrument(skip(self, arguments), fields(codebase = %self.context.codebase.identifier()))]
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let empty = Map::new();
        let args = arguments.as_object().unwrap_or(&empty);
        let output = tool.invoke(&self.context, args).await?;
        debug!(tool = name, output_bytes = output.len(), "tool finished");
        Ok(output)
    }
}

pub(crate) fn required_str<'a>(args: &'a Map<String, Value>, name: &'static str) -> Result<&'a str, ToolError> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ToolError::InvalidArgument {
            name,
            reason: format!("expected a string, got {}", other),
        }),
        None => Err(ToolError::MissingArgument(name)),
    }
}

pub(crate) fn optional_str<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

/// Integers sometimes arrive as strings from weaker models.
pub(crate) fn optional_usize(args: &Map<String, Value>, name: &str) -> Option<usize> {
    match args.get(name)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
