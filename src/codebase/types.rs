/// Primary language of a repository. Only used as a prompt hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
}

impl Language {
    /// Guess from the repository name alone, before anything is cloned.
    /// Checks run in a fixed order and default to Python.
    pub fn guess_from_name(identifier: &str) -> Language {
        let lower = identifier.to_ascii_lowercase();
        if lower.ends_with(".py") || lower.contains("python") {
            Language::Python
        } else if lower.ends_with(".js") || lower.contains("javascript") || lower.contains("node") {
            Language::JavaScript
        } else if lower.ends_with(".ts") || lower.contains("typescript") {
            Language::TypeScript
        } else if lower.ends_with(".go") || lower.contains("go") {
            Language::Go
        } else if lower.ends_with(".java") || lower.contains("java") {
            Language::Java
        } else {
            Language::Python
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "Python"),
            Language::JavaScript => write!(f, "JavaScript"),
            Language::TypeScript => write!(f, "TypeScript"),
            Language::Go => write!(f, "Go"),
            Language::Java => write!(f, "Java"),
        }
    }
}

/// File and function counts reported back to webhook callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodebaseStats {
    pub num_files: usize,
    pub num_functions: usize,
}

/// A single regex match from a codebase search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}
