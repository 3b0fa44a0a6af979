use std::path::PathBuf;

use thiserror::Error;

/// Error type for shock generation, workbook handling and solver runs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{what} must lie in [{lo}, {hi}]. Range: {min} to {max}")]
    OutOfRange {
        what: String,
        lo: f64,
        hi: f64,
        min: f64,
        max: f64,
    },
    #[error("Unrecognised key: {0}")]
    UnknownKey(String),
    #[error("Cannot log-transform a non-positive value: {0}")]
    Domain(String),
    #[error("No data sources configured for: {}", .0.join(", "))]
    MissingSources(Vec<String>),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("File already exists: {}", .0.display())]
    FileExists(PathBuf),
    #[error("Solver exceeded the timeout of {secs} s and produced no output")]
    Timeout { secs: u64 },
    #[error("Solver failed: {0}")]
    Solver(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True when the failure means the solver left no output behind.
    /// The ensemble driver skips these runs instead of aborting.
    pub fn is_missing_output(&self) -> bool {
        matches!(self, Error::FileNotFound(_) | Error::Timeout { .. })
    }
}

/// Convenience type for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
