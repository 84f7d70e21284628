//! Prompt formatting
//!
//! Attached files are appended after the user's message as fenced code
//! blocks, in the order they were sent.

use parley_gateway::FileAttachment;

/// Inserted between the message and the first attached file
pub const FILE_HEADER: &str = "\n\nHere are the relevant files:\n\n";

/// Fence language for a file name, by extension; empty when unknown
pub fn language_for(filename: &str) -> &'static str {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return "";
    };

    match ext.to_lowercase().as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "rs" => "rust",
        "go" => "go",
        "rb" => "ruby",
        "sh" => "bash",
        "json" => "json",
        "html" => "html",
        "css" => "css",
        "md" => "markdown",
        _ => "",
    }
}

/// Build the prompt that goes into the session history
pub fn format_prompt(message: &str, files: &[FileAttachment]) -> String {
    let mut prompt = message.to_string();
    if files.is_empty() {
        return prompt;
    }

    prompt.push_str(FILE_HEADER);
    for file in files {
        prompt.push_str(&format!(
            "File: {}\n```{}\n{}\n```\n\n",
            file.filename,
            language_for(&file.filename),
            file.content
        ));
    }
    prompt
}
