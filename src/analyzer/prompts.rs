use crate::codebase::Language;

pub const INSPECTOR_SYSTEM: &str = "You are a senior engineer exploring an unfamiliar repository. \
Use the tools to list directories, read files and search the code before drawing conclusions. \
You cannot modify anything. When you are done, reply with the requested JSON only.";

pub const EDITOR_SYSTEM: &str = "You are an expert software engineer making changes to a repository. \
Read the relevant code first, then implement the change with the file tools. \
Keep changes minimal and consistent with the surrounding code. \
When you are done, reply with the requested JSON only. Every created or modified file must appear \
in files_modified with its complete final content.";

pub const REVIEWER_SYSTEM: &str = "You are a careful code reviewer. Use view_pull_request to read the diff \
and the file tools for surrounding context. Be concrete and brief.";

pub const GENERAL_SYSTEM: &str = "You are a helpful coding assistant with read access to a repository. \
Use the tools to ground your answers in the actual code. Answer in Slack-friendly markdown.";

pub fn analysis(repo: &str, language: Language, request_text: &str) -> String {
    format!(
        r#"Analyze this repository: {repo} (primary language: {language})

The user has requested: "{request_text}"

Please analyze the repository structure and identify the key components that would need to be modified to fulfill this request.

Provide a detailed analysis including:
1. Key files and directories
2. Important classes and functions
3. Dependencies and relationships
4. Potential areas that need modification

Format your response as a JSON object with the following structure:
{{
    "repository_structure": {{
        "key_files": ["file1", "file2"],
        "key_directories": ["dir1", "dir2"],
        "key_components": ["component1", "component2"]
    }},
    "analysis": {{
        "summary": "Brief summary of the repository",
        "key_findings": ["finding1", "finding2"],
        "dependencies": ["dependency1", "dependency2"],
        "modification_plan": {{
            "files_to_modify": [
                {{"path": "path/to/file1", "reason": "Reason for modification", "suggested_changes": "Description of changes"}}
            ],
            "files_to_create": [
                {{"path": "path/to/new_file", "purpose": "Purpose of the new file", "content_description": "Description of the content"}}
            ],
            "files_to_delete": ["path/to/file_to_delete"],
            "implementation_steps": ["step1", "step2"]
        }}
    }}
}}"#
    )
}

pub fn generation(repo: &str, request_text: &str, plan_json: &str) -> String {
    format!(
        r#"Generate changes for repository: {repo}

The user has requested: "{request_text}"

Based on the analysis, the following modifications are needed:
{plan_json}

Please generate the necessary changes to fulfill the user's request.

For each file that needs to be modified or created, provide the path and the complete new content of the file.
For each file that needs to be deleted, provide only the path.

Format your response as a JSON object with the following structure:
{{
    "pr_title": "Title for the PR",
    "pr_description": "Description for the PR",
    "commit_message": "Commit message",
    "files_modified": [
        {{
            "path": "path/to/file",
            "action": "modify|create|delete",
            "content": "New content of the file"
        }}
    ]
}}"#
    )
}

pub fn review(pr_url: &str) -> String {
    format!(
        "Analyze this pull request:\n{pr_url}\n\n\
Provide a summary of the changes and any potential issues or improvements.\n\
Be specific about the changes, produce a short summary, and point out possible improvements.\n\
Use the tools at your disposal to create proper PR reviews."
    )
}
