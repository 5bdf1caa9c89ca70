use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CbioError {
    #[error("configuration error: {0}")]
    #[diagnostic(code(kira_cbio::configuration))]
    Configuration(String),

    #[error("API descriptor checksum mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(kira_cbio::integrity),
        help("the remote API changed; review the operations in use and pin the new checksum")
    )]
    Integrity { expected: String, actual: String },

    #[error("unknown API operation: {0}")]
    #[diagnostic(code(kira_cbio::unknown_operation))]
    UnknownOperation(String),

    #[error("{0}")]
    #[diagnostic(code(kira_cbio::remote_empty))]
    RemoteEmpty(RemoteEmptyResult),

    #[error("cBioPortal request failed: {0}")]
    #[diagnostic(code(kira_cbio::transport))]
    Transport(String),

    #[error("cBioPortal returned status {status}: {message}")]
    #[diagnostic(code(kira_cbio::transport_status))]
    TransportStatus { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

/// A remote call that succeeded transport-wise but carried no rows, or an
/// error payload, for `identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEmptyResult {
    pub identifier: String,
    pub message: Option<String>,
}

impl RemoteEmptyResult {
    pub fn new(identifier: impl Into<String>, message: Option<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message,
        }
    }

    pub fn no_data(identifier: impl Into<String>) -> Self {
        Self::new(identifier, None)
    }
}

impl fmt::Display for RemoteEmptyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.identifier),
            None => write!(f, "no data for {}", self.identifier),
        }
    }
}

impl From<RemoteEmptyResult> for CbioError {
    fn from(value: RemoteEmptyResult) -> Self {
        CbioError::RemoteEmpty(value)
    }
}
