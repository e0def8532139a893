use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Where the interesting parts of a repository live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStructure {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub key_files: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub key_directories: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub key_components: Vec<String>,
}

/// One file the plan intends to touch. Models return either a bare path or
/// an object with a reason; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlannedFile {
    pub path: String,
    /// Why the file is touched (`reason` or `purpose` in model output)
    pub reason: Option<String>,
    /// What changes (`suggested_changes` or `content_description`)
    pub details: Option<String>,
}

impl<'de> Deserialize<'de> for PlannedFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Path(String),
            Detailed {
                path: String,
                #[serde(alias = "purpose")]
                reason: Option<String>,
                #[serde(alias = "content_description")]
                suggested_changes: Option<String>,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Path(path) => PlannedFile {
                path,
                ..PlannedFile::default()
            },
            Raw::Detailed {
                path,
                reason,
                suggested_changes,
            } => PlannedFile {
                path,
                reason,
                details: suggested_changes,
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModificationPlan {
    #[serde(default)]
    pub files_to_modify: Vec<PlannedFile>,
    #[serde(default)]
    pub files_to_create: Vec<PlannedFile>,
    #[serde(default)]
    pub files_to_delete: Vec<PlannedFile>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub implementation_steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    #[serde(default)]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub key_findings: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub modification_plan: ModificationPlan,
}

/// Structured output of the inspection agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    #[serde(default)]
    pub repository_structure: RepositoryStructure,
    #[serde(default)]
    pub analysis: Findings,
}

/// Outcome of analyzing a repository for a request. Never an `Err`: failures
/// carry whatever the model said so it can still be shown.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Success {
        repository: String,
        analysis: RepositoryAnalysis,
    },
    Error {
        repository: String,
        error: String,
        raw_response: Option<String>,
    },
}

impl AnalysisResult {
    pub fn repository(&self) -> &str {
        match self {
            AnalysisResult::Success { repository, .. } | AnalysisResult::Error { repository, .. } => {
                repository
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }

    pub fn analysis(&self) -> Option<&RepositoryAnalysis> {
        match self {
            AnalysisResult::Success { analysis, .. } => Some(analysis),
            AnalysisResult::Error { .. } => None,
        }
    }
}

/// What to do with one file. Unknown strings from the model become `Modify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

impl From<String> for FileAction {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => FileAction::Create,
            "modify" => FileAction::Modify,
            "delete" => FileAction::Delete,
            other => {
                warn!(action = %other, "unknown file action, treating as modify");
                FileAction::Modify
            }
        }
    }
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Create => "create",
            FileAction::Modify => "modify",
            FileAction::Delete => "delete",
        }
    }

    /// "Created", "Modified", "Deleted"
    pub fn past_tense(&self) -> &'static str {
        match self {
            FileAction::Create => "Created",
            FileAction::Modify => "Modified",
            FileAction::Delete => "Deleted",
        }
    }
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default = "default_action")]
    pub action: FileAction,
    /// Full new content; absent for deletions
    #[serde(default)]
    pub content: Option<String>,
}

fn default_action() -> FileAction {
    FileAction::Modify
}

/// Everything needed to open (or update) a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub pr_title: String,
    pub pr_description: String,
    pub commit_message: String,
    pub pr_comment: Option<String>,
    pub files: Vec<FileChange>,
}

/// Model output before defaults are applied.
#[derive(Debug, Deserialize)]
pub(crate) struct RawChangeSet {
    #[serde(default)]
    pr_title: Option<String>,
    #[serde(default)]
    pr_description: Option<String>,
    #[serde(default)]
    commit_message: Option<String>,
    #[serde(default)]
    pr_comment: Option<String>,
    #[serde(default, alias = "files")]
    files_modified: Vec<FileChange>,
}

impl ChangeSet {
    /// Fill anything the model left out from the original request text.
    pub(crate) fn from_raw(raw: RawChangeSet, request_text: &str) -> Self {
        let short: String = request_text.chars().take(50).collect();
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        ChangeSet {
            pr_title: non_empty(raw.pr_title).unwrap_or_else(|| format!("Automated PR: {}...", short)),
            pr_description: non_empty(raw.pr_description).unwrap_or_else(|| {
                format!(
                    "This PR was automatically created based on the request: {}",
                    request_text
                )
            }),
            commit_message: non_empty(raw.commit_message)
                .unwrap_or_else(|| format!("Automated commit: {}...", short)),
            pr_comment: non_empty(raw.pr_comment),
            files: raw.files_modified,
        }
    }
}

/// Change generation failed; `raw_response` keeps the model output when there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    pub repository: String,
    pub error: String,
    pub raw_response: Option<String>,
}

impl std::fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Accept a list of strings, or a list of anything, rendering non-strings
/// by their `name`/`path` field or as compact JSON.
fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => s,
            Value::Object(ref map) => ["name", "path", "description"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            other => other.to_string(),
        })
        .collect())
}
