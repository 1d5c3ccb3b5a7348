//! Error type and small helpers shared by the resolution pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for client construction.
pub type Result<T> = std::result::Result<T, DebuggerError>;

/// Errors raised while resolving configuration and building a client.
///
/// All of them are fatal to construction; nothing here is retried.
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// No project id from arguments, configuration, environment or credentials.
    #[error("[Cloud Debugger] project_id is missing")]
    MissingProject,

    /// Key file path does not exist, is not a regular file, or cannot be read.
    #[error("[Cloud Debugger] cannot read credentials file {}: {source}", path.display())]
    CredentialsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Key material (from a file or an inline string) is not valid JSON.
    #[error("[Cloud Debugger] invalid credentials JSON in {origin}: {source}")]
    CredentialsParse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// Key material parsed but is not usable as credentials.
    #[error("[Cloud Debugger] invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Default discovery was requested and the environment offers nothing.
    #[error("[Cloud Debugger] could not find default credentials")]
    NoDefaultCredentials,

    /// Transport construction failure, passed through untouched.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Treat `None` and the empty string alike.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Inline key material starts with an object brace; anything else is a path.
pub fn looks_like_json(value: &str) -> bool {
    value.trim_start().starts_with('{')
}

/// Check the shape of a GCP project id.
///
/// 6-30 characters of lowercase letters, digits and hyphens, starting with a
/// letter and not ending with a hyphen.
pub fn is_valid_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }
    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    if project.ends_with('-') {
        return false;
    }
    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
