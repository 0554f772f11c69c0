use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OrthoError {
    #[error("invalid gene identifier: {0}")]
    InvalidGeneId(String),

    #[error("invalid organism code: {0}")]
    InvalidOrganismCode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request to {path} failed after {attempts} attempts: {cause}")]
    TransientFetch {
        path: String,
        attempts: u32,
        cause: String,
    },

    #[error("resource not found upstream: {0}")]
    NotFound(String),

    #[error("upstream returned status {status} for {path}: {message}")]
    UpstreamStatus {
        status: u16,
        path: String,
        message: String,
    },

    #[error("malformed response at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("organism not found: {0}")]
    OrganismNotFound(String),

    #[error("no progress recorded for organism {0}")]
    ProgressNotFound(String),

    #[error("job aborted: {0}")]
    PipelineFatal(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl OrthoError {
    /// Failures worth another attempt inside the API client.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrthoError::Http(_) | OrthoError::TransientFetch { .. })
    }
}
