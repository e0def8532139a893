use regex::Regex;
use serde_json::{Map, Value};

use super::{optional_str, optional_usize, required_str, ToolError};
use crate::codebase::{Codebase, WriteMode};

const DEFAULT_DEPTH: usize = 2;
const DEFAULT_MAX_RESULTS: usize = 50;
const MAX_VIEW_LINES: usize = 1000;

pub async fn list_directory(codebase: &Codebase, args: &Map<String, Value>) -> Result<String, ToolError> {
    let path = optional_str(args, "path").unwrap_or("");
    let depth = optional_usize(args, "depth").unwrap_or(DEFAULT_DEPTH);
    let entries = codebase.list_directory(path, depth).await?;
    if entries.is_empty() {
        return Ok(format!("{} is empty", display_path(path)));
    }
    Ok(entries.join("\n"))
}

pub async fn view_file(codebase: &Codebase, args: &Map<String, Value>) -> Result<String, ToolError> {
    let path = required_str(args, "path")?;
    let contents = codebase.read_file(path).await?;
    let total = contents.lines().count();

    let start = optional_usize(args, "start_line").unwrap_or(1).max(1);
    if total > 0 && start > total {
        return Err(ToolError::InvalidArgument {
            name: "start_line",
            reason: format!("{} has only {} lines", path, total),
        });
    }
    let end = optional_usize(args, "end_line")
        .unwrap_or(total)
        .min(total)
        .min(start.saturating_add(MAX_VIEW_LINES - 1));

    let mut output = format!("{} ({} lines)\n", path, total);
    for (index, line) in contents.lines().enumerate().skip(start - 1).take(end.saturating_sub(start - 1)) {
        output.push_str(&format!("{:>5} | {}\n", index + 1, line));
    }
    if end < total {
        output.push_str(&format!("... {} more lines\n", total - end));
    }
    Ok(output)
}

pub async fn search(codebase: &Codebase, args: &Map<String, Value>) -> Result<String, ToolError> {
    let query = required_str(args, "query")?;
    let path = optional_str(args, "path").unwrap_or("");
    let limit = optional_usize(args, "max_results").unwrap_or(DEFAULT_MAX_RESULTS).max(1);

    let pattern = Regex::new(query).or_else(|_| Regex::new(&regex::escape(query))).map_err(|e| {
        ToolError::InvalidArgument {
            name: "query",
            reason: e.to_string(),
        }
    })?;

    let hits = codebase.search(pattern, path, limit).await?;
    if hits.is_empty() {
        return Ok(format!("No matches for '{}' in {}", query, display_path(path)));
    }
    Ok(hits
        .iter()
        .map(|hit| format!("{}:{}: {}", hit.path, hit.line_number, hit.line))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub async fn create_file(codebase: &Codebase, args: &Map<String, Value>) -> Result<String, ToolError> {
    let path = required_str(args, "path")?;
    let content = required_str(args, "content")?;
    codebase.write_file(path, content, WriteMode::CreateNew).await?;
    Ok(format!("Created {} ({} bytes)", path, content.len()))
}

pub async fn edit_file(codebase: &Codebase, args: &Map<String, Value>) -> Result<String, ToolError> {
    let path = required_str(args, "path")?;
    let old_text = required_str(args, "old_text")?;
    let new_text = required_str(args, "new_text")?;
    if old_text.is_empty() {
        return Err(ToolError::InvalidArgument {
            name: "old_text",
            reason: "must not be empty".to_string(),
        });
    }

    let contents = codebase.read_file(path).await?;
    match contents.matches(old_text).count() {
        0 => Err(ToolError::InvalidArgument {
            name: "old_text",
            reason: format!("text not found in {}", path),
        }),
        1 => {
            let updated = contents.replacen(old_text, new_text, 1);
            codebase.write_file(path, &updated, WriteMode::Overwrite).await?;
            Ok(format!("Edited {}", path))
        }
        n => Err(ToolError::InvalidArgument {
            name: "old_text",
            reason: format!("text occurs {} times in {}; include more context", n, path),
        }),
    }
}

pub async fn delete_file(codebase: &Codebase, args: &Map<String, Value>) -> Result<String, ToolError> {
    let path = required_str(args, "path")?;
    codebase.delete_file(path).await?;
    Ok(format!("Deleted {}", path))
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "the repository root"
    } else {
        path
    }
}
