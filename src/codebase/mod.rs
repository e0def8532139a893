pub mod cache;
pub mod git;
pub mod loader;
pub mod types;

pub use cache::CodebaseCache;
pub use loader::{CodebaseLoader, GitCodebaseLoader};
pub use types::{CodebaseStats, Language, SearchHit};

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

const MAX_LISTING_ENTRIES: usize = 500;
const MAX_LINE_CHARS: usize = 200;
const SOURCE_EXTENSIONS: &[&str] = &["py", "js", "jsx", "ts", "tsx", "go", "java", "rs", "rb"];

static FUNCTION_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:def|fn|func|function)\s+\w+")
        .expect("function pattern is valid")
});

#[derive(Debug, Error)]
pub enum CodebaseError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path escapes the repository root: {0}")]
    InvalidPath(String),

    #[error("Path is not accessible: {0}")]
    Restricted(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Could not materialize codebase '{identifier}': {}", .attempts.join("; "))]
    Unavailable {
        identifier: String,
        attempts: Vec<String>,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A materialized working tree for one repository at one commit.
///
/// Clones and scratch workspaces are owned by the handle and removed from
/// disk when the last reference is dropped; local checkouts are borrowed.
#[derive(Debug)]
pub struct Codebase {
    identifier: String,
    root: PathBuf,
    language: Language,
    commit: Option<String>,
    workspace: Option<TempDir>,
}

/// How `write_file` treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    CreateNew,
    Overwrite,
}

impl Codebase {
    /// Wrap an existing directory without taking ownership of it.
    pub fn from_path(
        identifier: impl Into<String>,
        root: impl Into<PathBuf>,
        language: Language,
        commit: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            root: root.into(),
            language,
            commit,
            workspace: None,
        }
    }

    /// Take ownership of a temporary working tree.
    pub fn from_workspace(
        identifier: impl Into<String>,
        workspace: TempDir,
        language: Language,
        commit: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            root: workspace.path().to_path_buf(),
            language,
            commit,
            workspace: Some(workspace),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref()
    }

    pub fn is_owned(&self) -> bool {
        self.workspace.is_some()
    }

    /// Resolve a repository-relative path, refusing anything that could
    /// leave the root or reach git metadata.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, CodebaseError> {
        let trimmed = relative.trim();
        let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
        let path = Path::new(trimmed);
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(CodebaseError::InvalidPath(relative.to_string()));
        }
        let touches_git = path.components().any(|c| match c {
            Component::Normal(name) => name.to_str().is_some_and(|n| n.eq_ignore_ascii_case(".git")),
            _ => false,
        });
        if touches_git {
            return Err(CodebaseError::Restricted(relative.to_string()));
        }
        Ok(self.root.join(path))
    }

    /// List entries under `relative` up to `depth` levels; directories end in `/`.
    pub async fn list_directory(
        &self,
        relative: &str,
        depth: usize,
    ) -> Result<Vec<String>, CodebaseError> {
        let base = self.resolve(relative)?;
        let root = self.root.clone();
        let depth = depth.clamp(1, 5);
        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            let walker = WalkDir::new(&base)
                .min_depth(1)
                .max_depth(depth)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_git_dir(e));
            for entry in walker {
                let entry = entry.map_err(|e| CodebaseError::Io {
                    path: base.clone(),
                    source: e.into(),
                })?;
                let mut name = relative_to(&root, entry.path());
                if entry.file_type().is_dir() {
                    name.push('/');
                }
                entries.push(name);
                if entries.len() >= MAX_LISTING_ENTRIES {
                    break;
                }
            }
            Ok(entries)
        })
        .await?
    }

    pub async fn read_file(&self, relative: &str) -> Result<String, CodebaseError> {
        let path = self.resolve(relative)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CodebaseError::Io { path, source })
    }

    #[instrument(skip(self, content), fields(codebase = %self.identifier, bytes = content.len()))]
    pub async fn write_file(
        &self,
        relative: &str,
        content: &str,
        mode: WriteMode,
    ) -> Result<(), CodebaseError> {
        let path = self.resolve(relative)?;
        if mode == WriteMode::CreateNew && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CodebaseError::AlreadyExists(relative.to_string()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CodebaseError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| CodebaseError::Io { path, source })
    }

    #[instrument(skip(self), fields(codebase = %self.identifier))]
    pub async fn delete_file(&self, relative: &str) -> Result<(), CodebaseError> {
        let path = self.resolve(relative)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| CodebaseError::Io { path, source })
    }

    /// Regex search over text files under `relative`, at most `limit` hits.
    pub async fn search(
        &self,
        pattern: Regex,
        relative: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, CodebaseError> {
        let base = self.resolve(relative)?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut hits = Vec::new();
            for entry in source_files(&base) {
                let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                for (index, line) in contents.lines().enumerate() {
                    if pattern.is_match(line) {
                        hits.push(SearchHit {
                            path: relative_to(&root, entry.path()),
                            line_number: index + 1,
                            line: line.trim().chars().take(MAX_LINE_CHARS).collect(),
                        });
                        if hits.len() >= limit {
                            return hits;
                        }
                    }
                }
            }
            hits
        })
        .await
        .map_err(CodebaseError::from)
    }

    /// Count files and function definitions in the working tree.
    pub async fn stats(&self) -> Result<CodebaseStats, CodebaseError> {
        let root = self.root.clone();
        let stats = tokio::task::spawn_blocking(move || {
            let mut stats = CodebaseStats::default();
            for entry in source_files(&root) {
                stats.num_files += 1;
                let is_source = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
                if !is_source {
                    continue;
                }
                if let Ok(contents) = std::fs::read_to_string(entry.path()) {
                    stats.num_functions +=
                        contents.lines().filter(|l| FUNCTION_DEF.is_match(l)).count();
                }
            }
            stats
        })
        .await?;
        debug!(codebase = %self.identifier, files = stats.num_files, functions = stats.num_functions, "computed codebase stats");
        Ok(stats)
    }

    /// Copy the working tree, without git metadata, into a new owned
    /// workspace under `parent`. Edits to the copy never reach this tree.
    #[instrument(skip(self, parent), fields(codebase = %self.identifier))]
    pub async fn fork(&self, parent: &Path) -> Result<Codebase, CodebaseError> {
        let io_err = |source| CodebaseError::Io {
            path: parent.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        let workspace = tempfile::Builder::new()
            .prefix("pr-agent-edit-")
            .tempdir_in(parent)
            .map_err(io_err)?;

        let source = self.root.clone();
        let dest = workspace.path().to_path_buf();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &dest)).await??;
        debug!(files = copied, root = %workspace.path().display(), "forked working tree");

        Ok(Codebase::from_workspace(
            self.identifier.clone(),
            workspace,
            self.language,
            self.commit.clone(),
        ))
    }
}

impl Drop for Codebase {
    fn drop(&mut self) {
        if self.is_owned() {
            debug!(codebase = %self.identifier, root = %self.root.display(), "removing workspace");
        }
    }
}

fn is_git_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == ".git"
}

/// Copy regular files and directories from `source` into `dest`, skipping
/// `.git` and symlinks. Returns the number of files copied.
fn copy_tree(source: &Path, dest: &Path) -> Result<usize, CodebaseError> {
    let mut copied = 0;
    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_git_dir(e));
    for entry in walker {
        let entry = entry.map_err(|e| CodebaseError::Io {
            path: source.to_path_buf(),
            source: e.into(),
        })?;
        let target = dest.join(entry.path().strip_prefix(source).unwrap_or(entry.path()));
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|source| CodebaseError::Io {
                path: target.clone(),
                source,
            })?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target).map_err(|source| CodebaseError::Io {
                path: target.clone(),
                source,
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn source_files(base: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(base)
        .into_iter()
        .filter_entry(|e| !is_git_dir(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
