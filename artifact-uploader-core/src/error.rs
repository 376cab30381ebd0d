//! Error types shared by the resolver, the collaborator traits and the pipeline.
//!
//! Each failure family gets its own type so callers branch on the variant
//! rather than inspecting response shapes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One structured error as returned by the ingestion API.
///
/// Older endpoints name the code field `error`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    #[serde(alias = "error")]
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The substitute used when an error response carries no usable body.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new("unexpected_error", message)
    }
}

fn join_messages(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bulk registration was rejected (or never reached the server).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_messages(.errors))]
pub struct RegistrationError {
    pub errors: Vec<ApiError>,
}

impl RegistrationError {
    pub fn new(errors: Vec<ApiError>) -> Self {
        Self { errors }
    }
}

/// The status report could not be delivered. Logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_messages(.errors))]
pub struct ReportError {
    pub errors: Vec<ApiError>,
}

impl ReportError {
    pub fn new(errors: Vec<ApiError>) -> Self {
        Self { errors }
    }
}

/// A single byte transfer to a pre-signed destination failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("destination responded with HTTP {status}")]
    Rejected { status: u16 },
    #[error("transfer could not be completed: {0}")]
    Transport(String),
}

/// Resolution failures. These abort the run before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "Only .json and .xml files are permitted. Found '{}' (declared as '{}')",
        .path.display(),
        .declared
    )]
    UnsupportedExtension { path: PathBuf, declared: String },
}
