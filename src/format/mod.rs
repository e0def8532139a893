//! Slack mrkdwn rendering of bot results. Everything here is pure and
//! tolerates missing data.

use crate::analyzer::{AnalysisResult, PlannedFile};
use crate::github::{FileOperationResult, MergeResult, PrFailure, PrResult, PullRequestDetails};

const MAX_LISTED: usize = 5;

/// Message posted when a PR was opened (or an existing one found).
pub fn format_pr_creation(result: &PrResult) -> String {
    let mut message = String::from(":tada: *PR Created Successfully!* :tada:\n\n");
    match &result.message {
        Some(note) => message.push_str(&format!(
            "<@{}>, {}. Here is the existing Pull Request:\n\n",
            result.user, note
        )),
        None => message.push_str(&format!(
            "<@{}>, I've created a new Pull Request for you:\n\n",
            result.user
        )),
    }
    message.push_str(&pr_link(result));
    message.push_str("\n\n*Changes:*\n");
    message.push_str(&format_file_changes(&result.files_modified));
    message.push_str("\n\nYou can review and merge the PR using the link above.");
    message
}

pub fn format_pr_update(result: &PrResult) -> String {
    let mut message = String::from(":white_check_mark: *PR Updated Successfully!* :white_check_mark:\n\n");
    message.push_str(&format!("<@{}>, I've updated the Pull Request for you:\n\n", result.user));
    message.push_str(&pr_link(result));
    message.push_str("\n\n*Changes:*\n");
    message.push_str(&format_file_changes(&result.files_modified));
    message.push_str("\n\nYou can review the updated PR using the link above.");
    message
}

/// One line per file with a status icon, at most five, then a count of the rest.
pub fn format_file_changes(files: &[FileOperationResult]) -> String {
    if files.is_empty() {
        return "No files were modified.".to_string();
    }
    let mut lines: Vec<String> = files
        .iter()
        .take(MAX_LISTED)
        .map(|file| {
            let icon = if file.is_success() { "✅" } else { "❌" };
            format!("{} {} `{}`", icon, file.action.past_tense(), file.path)
        })
        .collect();
    if files.len() > MAX_LISTED {
        lines.push(format!("... and {} more files", files.len() - MAX_LISTED));
    }
    lines.join("\n")
}

pub fn format_error(message: &str) -> String {
    format!(
        ":x: *Error*\n\nI encountered an error while processing your request:\n\n```\n{}\n```\n\n\
         Please try again or contact an administrator if the problem persists.",
        message
    )
}

/// PR creation stopped part-way: the error plus whatever was already staged.
pub fn format_pr_failure(failure: &PrFailure) -> String {
    let mut message = format!(":warning: *Error creating PR*: {}\n", failure.error);
    if !failure.files_modified.is_empty() {
        message.push_str("\n*Files that were modified before the error*:\n");
        for file in &failure.files_modified {
            match &file.error {
                None => message.push_str(&format!("• Successfully modified `{}`\n", file.path)),
                Some(e) => message.push_str(&format!("• Failed to modify `{}`: {}\n", file.path, e)),
            }
        }
    }
    message.trim_end().to_string()
}

pub fn format_loading(action: &str) -> String {
    format!(":hourglass_flowing_sand: {}... Please wait.", action)
}

pub fn format_pr_details(details: &PullRequestDetails) -> String {
    let mergeable = match details.mergeable {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    };
    let mut message = format!(
        ":mag: *<{}|#{}: {}>*\n\n*State*: {}\n*Author*: {}\n*Branches*: `{}` → `{}`\n*Mergeable*: {}\n*Created*: {}\n*Updated*: {}",
        details.url,
        details.number,
        details.title,
        details.state,
        details.user,
        details.head_branch,
        details.base_branch,
        mergeable,
        details.created_at.format("%Y-%m-%d %H:%M UTC"),
        details.updated_at.format("%Y-%m-%d %H:%M UTC"),
    );
    match details.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => message.push_str(&format!("\n\n*Description*:\n{}", body)),
        _ => message.push_str("\n\n*Description*: No description provided."),
    }
    message
}

pub fn format_merge_result(result: &MergeResult) -> String {
    if result.merged {
        let sha = result
            .sha
            .as_deref()
            .map(|s| format!(" (`{}`)", &s[..s.len().min(7)]))
            .unwrap_or_default();
        format!(
            ":white_check_mark: *PR #{} merged* in {}{}\n{}",
            result.pr_number, result.repo, sha, result.message
        )
    } else {
        format!(
            ":warning: *PR #{} was not merged* in {}: {}",
            result.pr_number, result.repo, result.message
        )
    }
}

/// Repository analysis for chat. Failed analyses show the raw model output
/// when there is any.
pub fn format_analysis(result: &AnalysisResult) -> String {
    let analysis = match result {
        AnalysisResult::Error {
            error, raw_response, ..
        } => {
            let mut message = format!(":warning: *Error analyzing repository*: {}", error);
            if let Some(raw) = raw_response.as_deref().filter(|r| !r.trim().is_empty()) {
                message.push_str(&format!("\n\n*Raw analysis:*\n```\n{}\n```", raw.trim()));
            }
            return message;
        }
        AnalysisResult::Success { analysis, .. } => analysis,
    };

    let structure = &analysis.repository_structure;
    let findings = &analysis.analysis;
    let plan = &findings.modification_plan;

    let mut message = format!(":mag: *Repository Analysis for {}*\n\n", result.repository());
    let summary = findings.summary.trim();
    message.push_str(&format!(
        "*Summary*: {}\n\n",
        if summary.is_empty() { "No summary available." } else { summary }
    ));

    let code = |items: &[String]| items.iter().map(|i| format!("`{}`", i)).collect::<Vec<_>>();
    section(&mut message, "Key Files", &code(&structure.key_files), "key files", "files");
    section(&mut message, "Key Directories", &code(&structure.key_directories), "key directories", "directories");
    section(&mut message, "Key Components", &structure.key_components, "key components", "components");
    section(&mut message, "Key Findings", &findings.key_findings, "key findings", "findings");
    section(&mut message, "Dependencies", &findings.dependencies, "dependencies", "dependencies");
    section(&mut message, "Files to Modify", &planned(&plan.files_to_modify), "files to modify", "files");
    section(&mut message, "Files to Create", &planned(&plan.files_to_create), "files to create", "files");
    section(&mut message, "Files to Delete", &planned(&plan.files_to_delete), "files to delete", "files");
    section(
        &mut message,
        "Implementation Steps",
        &plan.implementation_steps,
        "implementation steps",
        "steps",
    );
    message.trim_end().to_string()
}

fn pr_link(result: &PrResult) -> String {
    format!("*<{}|#{}: {}>*", result.pr_url, result.pr_number, result.pr_title)
}

fn section(message: &mut String, title: &str, items: &[String], empty_name: &str, unit: &str) {
    message.push_str(&format!("*{}*:\n", title));
    if items.is_empty() {
        message.push_str(&format!("No {} found.\n\n", empty_name));
        return;
    }
    for item in items.iter().take(MAX_LISTED) {
        message.push_str(&format!("• {}\n", item));
    }
    if items.len() > MAX_LISTED {
        message.push_str(&format!("• ... and {} more {}\n", items.len() - MAX_LISTED, unit));
    }
    message.push('\n');
}

fn planned(files: &[PlannedFile]) -> Vec<String> {
    files
        .iter()
        .map(|file| match file.reason.as_deref().or(file.details.as_deref()) {
            Some(reason) => format!("`{}`: {}", file.path, reason),
            None => format!("`{}`", file.path),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FileAction, RepositoryAnalysis};
    use crate::github::PR_EXISTS_MESSAGE;

    fn pr_result(files: Vec<FileOperationResult>) -> PrResult {
        PrResult {
            pr_number: 42,
            pr_url: "https://github.com/acme/widgets/pull/42".to_string(),
            pr_title: "Add retries".to_string(),
            pr_body: None,
            files_modified: files,
            user: "U123".to_string(),
            head_branch: "feature".to_string(),
            base_branch: "main".to_string(),
            repo: "acme/widgets".to_string(),
            message: None,
        }
    }

    fn files(n: usize) -> Vec<FileOperationResult> {
        (0..n)
            .map(|i| FileOperationResult::success(format!("src/f{}.py", i), FileAction::Modify))
            .collect()
    }

    #[test]
    fn test_creation_lists_files() {
        let mut changed = files(2);
        changed.push(FileOperationResult::failure("gone.py", FileAction::Delete, "not found"));
        let message = format_pr_creation(&pr_result(changed));
        assert!(message.starts_with(":tada: *PR Created Successfully!* :tada:"));
        assert!(message.contains("<@U123>, I've created a new Pull Request for you:"));
        assert!(message.contains("*<https://github.com/acme/widgets/pull/42|#42: Add retries>*"));
        assert!(message.contains("✅ Modified `src/f0.py`"));
        assert!(message.contains("❌ Deleted `gone.py`"));
    }

    #[test]
    fn test_truncates_to_five_files() {
        let rendered = format_file_changes(&files(7));
        assert_eq!(rendered.lines().count(), 6);
        assert!(rendered.contains("`src/f4.py`"));
        assert!(!rendered.contains("`src/f5.py`"));
        assert!(rendered.ends_with("... and 2 more files"));
    }

    #[test]
    fn test_no_files() {
        assert_eq!(format_file_changes(&[]), "No files were modified.");
        assert!(format_pr_creation(&pr_result(vec![])).contains("*Changes:*\nNo files were modified."));
    }

    #[test]
    fn test_existing_pr_annotation() {
        let mut result = pr_result(files(1));
        result.message = Some(PR_EXISTS_MESSAGE.to_string());
        let message = format_pr_creation(&result);
        assert!(message.contains("PR already exists"));
        assert!(!message.contains("I've created a new Pull Request"));
    }

    #[test]
    fn test_error_and_loading() {
        let error = format_error("boom");
        assert!(error.contains("```\nboom\n```"));
        assert!(error.ends_with("contact an administrator if the problem persists."));
        assert_eq!(
            format_loading("Analyzing repository"),
            ":hourglass_flowing_sand: Analyzing repository... Please wait."
        );
    }

    #[test]
    fn test_failure_lists_partial_files() {
        let failure = PrFailure {
            error: "Failed to create PR: 500".to_string(),
            files_modified: vec![
                FileOperationResult::success("a.py", FileAction::Create),
                FileOperationResult::failure("b.py", FileAction::Modify, "blob rejected"),
            ],
            user: "U1".to_string(),
            repo: "acme/widgets".to_string(),
            head_branch: None,
            base_branch: None,
            pr_number: None,
        };
        let message = format_pr_failure(&failure);
        assert!(message.starts_with(":warning: *Error creating PR*: Failed to create PR: 500"));
        assert!(message.contains("• Successfully modified `a.py`"));
        assert!(message.contains("• Failed to modify `b.py`: blob rejected"));
    }

    #[test]
    fn test_empty_analysis_uses_placeholders() {
        let result = AnalysisResult::Success {
            repository: "acme/widgets".to_string(),
            analysis: RepositoryAnalysis::default(),
        };
        let message = format_analysis(&result);
        assert!(message.contains("No summary available."));
        assert!(message.contains("No key files found."));
        assert!(message.contains("No dependencies found."));
        assert!(message.contains("No implementation steps found."));
    }

    #[test]
    fn test_failed_analysis_shows_raw() {
        let result = AnalysisResult::Error {
            repository: "acme/widgets".to_string(),
            error: "Failed to parse analysis result".to_string(),
            raw_response: Some("free text".to_string()),
        };
        let message = format_analysis(&result);
        assert!(message.contains("```\nfree text\n```"));
    }

    #[test]
    fn test_merge_result() {
        let merged = MergeResult {
            pr_number: 5,
            repo: "acme/widgets".to_string(),
            merged: true,
            message: "Pull Request successfully merged".to_string(),
            sha: Some("0123456789abcdef".to_string()),
        };
        assert!(format_merge_result(&merged).contains("*PR #5 merged* in acme/widgets (`0123456`)"));
    }
}
