//! Error types.
//!
//! Every failure the mock can hit while serving a request is converted into a
//! response at the dispatcher or admin boundary; none of these propagate as
//! panics.

use std::path::PathBuf;

/// Malformed expectation input (admin requests, inline JSON, files).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An expectation that decoded fine but is not acceptable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expectation key cannot be empty")]
    EmptyKey,
    #[error("expectation '{0}' sets both response and forward")]
    ResponseAndForward(String),
    #[error("expectation '{key}' has invalid status code {status}")]
    InvalidStatus { key: String, status: u16 },
    #[error("expectation '{0}' forwards to an empty host")]
    EmptyForwardHost(String),
}

/// Template evaluation failure. The message becomes the body of a 500.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("template execution failed: {0}")]
    Execution(String),
}

/// Failure of a forwarded call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("cannot build outbound request: {0}")]
    InvalidRequest(String),
    #[error("outbound request failed: {0}")]
    Request(String),
    #[error("failed to read upstream body: {0}")]
    Body(String),
}

/// Errors surfaced by store loading and the admin operations.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("expectation #{index}: {source}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: ValidationError,
    },
}
