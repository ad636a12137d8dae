//! Input validation for values interpolated into sandbox shell commands.

use crate::error::ConfigurationError;

/// Validates a git ref (commit SHA, branch, tag) before it reaches a shell.
pub fn validate_git_ref(git_ref: &str) -> Result<(), ConfigurationError> {
    if git_ref.is_empty() {
        return Err(invalid("git ref is empty"));
    }
    if git_ref.len() > 256 {
        return Err(invalid(format!(
            "git ref too long ({} chars, max 256)",
            git_ref.len()
        )));
    }
    if git_ref.starts_with('-') {
        return Err(invalid(format!("git ref '{}' must not start with '-'", git_ref)));
    }
    if git_ref.contains("..") {
        return Err(invalid(format!("git ref '{}' must not contain '..'", git_ref)));
    }
    for ch in git_ref.chars() {
        if !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '/' | '.' | '_' | '-' | '~' | '^') {
            return Err(invalid(format!(
                "invalid character '{}' in git ref '{}'",
                ch, git_ref
            )));
        }
    }
    Ok(())
}

/// Validates a path relative to the sandbox working directory.
pub fn validate_file_path(path: &str) -> Result<(), ConfigurationError> {
    if path.is_empty() {
        return Err(invalid("file path is empty"));
    }
    if path.len() > 4096 {
        return Err(invalid(format!(
            "file path too long ({} chars, max 4096)",
            path.len()
        )));
    }
    if path.contains('\0') {
        return Err(invalid("file path contains null byte"));
    }
    if path.contains("..") {
        return Err(invalid(format!(
            "file path '{}' contains '..' (path traversal not allowed)",
            path
        )));
    }
    if path.starts_with('/') {
        return Err(invalid(format!(
            "file path '{}' must be relative (no leading '/')",
            path
        )));
    }
    for ch in path.chars() {
        if matches!(
            ch,
            '\'' | '"' | '`' | '$' | '!' | '&' | '|' | ';' | '(' | ')' | '{' | '}' | '<' | '>'
                | '\\' | '\n' | '\r'
        ) {
            return Err(invalid(format!(
                "invalid character '{}' in file path '{}': shell metacharacters not allowed",
                ch, path
            )));
        }
    }
    Ok(())
}

/// Quotes a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn invalid(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::Invalid(message.into())
}
