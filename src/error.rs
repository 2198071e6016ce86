use crate::recon::Origin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GhReportError {
    #[error("Not authenticated. Run `ghreport auth`, set GITHUB_TOKEN, or log in with `gh auth login`.")]
    NotAuthenticated,

    #[error("{0}")]
    Usage(String),

    #[error("Not authorized to read {resource}: {reason}")]
    Auth { resource: String, reason: String },

    #[error("Failed to fetch {resource}: {reason}")]
    Fetch { resource: String, reason: String },

    #[error("Duplicate {origin} record for login `{key}`")]
    DuplicateKey { origin: Origin, key: String },

    #[error("{count} enterprise user(s) without a Copilot seat exceeds the threshold of {threshold}")]
    GapThresholdExceeded { count: usize, threshold: usize },

    #[error("{failed} of {total} owner(s) could not be restored")]
    RestoreIncomplete { failed: usize, total: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GitHub API error: {0}")]
    GitHub(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl GhReportError {
    /// Process exit code: 2 for usage and authorization problems, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            GhReportError::NotAuthenticated
            | GhReportError::Usage(_)
            | GhReportError::Auth { .. }
            | GhReportError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl From<octocrab::Error> for GhReportError {
    fn from(err: octocrab::Error) -> Self {
        GhReportError::GitHub(err.to_string())
    }
}

impl From<csv::Error> for GhReportError {
    fn from(err: csv::Error) -> Self {
        GhReportError::Csv(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GhReportError>;
