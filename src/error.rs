//! Error taxonomy for the question-answering pipeline.
//!
//! Degrading paths (optional sub-fetches, router parsing) never surface these
//! to callers; they are logged and replaced with safe defaults. Mandatory
//! paths (identifier parsing, credentials, repository metadata) propagate
//! them as user-readable failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("invalid repository identifier: '{0}' (expected owner/name or a github.com URL)")]
    InvalidIdentifier(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not access repository {repo}: {reason}")]
    RepositoryUnavailable { repo: String, reason: String },

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("snapshot store error: {0}")]
    Store(String),
}

impl ScoutError {
    /// Text shown to the end user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ScoutError::RepositoryUnavailable { repo, .. } => format!(
                "Could not access repository {}. Please check the URL and that the repository is public.",
                repo
            ),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        ScoutError::Upstream(err.to_string())
    }
}

impl From<sqlx::Error> for ScoutError {
    fn from(err: sqlx::Error) -> Self {
        ScoutError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Store(err.to_string())
    }
}
