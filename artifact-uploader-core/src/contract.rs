//! # contract: data model and collaborator interfaces
//!
//! This module defines the values that flow through an upload run and the
//! three traits the pipeline is written against:
//!
//! - [`IngestionApi`]: bulk registration and bulk status reporting against the
//!   remote ingestion service. One implementation per backend lives in the
//!   CLI crate.
//! - [`Transfer`]: one byte upload to a pre-signed destination URL.
//! - [`FileSource`]: glob expansion, existence checks and file reads.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall` so that consumers can generate
//!   deterministic mocks (`MockIngestionApi`, `MockTransfer`, `MockFileSource`).
//!   Mocks are exported with the `test-export-mocks` feature.
//!
//! ## Identity
//! - A [`CorrelationId`] is generated once per descriptor during resolution and
//!   joins registration records, transfer results and status entries back to it.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{RegistrationError, ReportError, TransferError};

/// Opaque, run-unique key for one descriptor (a random v4 UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content classification derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Json,
    Xml,
}

impl MediaKind {
    /// Classifies by the lower-cased extension. `None` for anything unrecognised.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(MediaKind::Json),
            "xml" => Some(MediaKind::Xml),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Json => "application/json",
            MediaKind::Xml => "application/xml",
        }
    }
}

/// Pass-through fields forwarded verbatim to registration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtifactMetadata {
    /// Display name (the test-suite identifier for test-suite backends).
    pub name: String,
    pub kind: Option<String>,
    /// Content-format hint, e.g. `rspec_json` or `junit_xml`.
    pub parser: Option<String>,
}

/// One artifact as declared by the caller, before glob expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredArtifact {
    pub group_key: String,
    /// Literal path or glob pattern.
    pub path: String,
    pub metadata: ArtifactMetadata,
}

/// One file-level unit of work, immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub correlation_id: CorrelationId,
    pub group_key: String,
    /// Concrete path after glob expansion (or the literal declared path).
    pub source_path: PathBuf,
    /// The path exactly as declared, kept for diagnostics.
    pub declared_path: String,
    pub media_kind: MediaKind,
    pub metadata: ArtifactMetadata,
}

/// CI job context forwarded to registration. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunContext {
    pub account_name: String,
    pub repository_name: String,
    pub job_name: String,
    pub job_matrix: Option<serde_json::Value>,
    pub run_id: String,
    pub run_attempt: u32,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub attempted_by: Option<String>,
}

/// Server-assigned destination for one registered descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUpload {
    pub correlation_id: CorrelationId,
    /// Some backends key status updates by this instead of the correlation id.
    pub server_record_id: Option<String>,
    pub destination_url: String,
}

/// Status vocabulary sent back to the ingestion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    UploadFailed,
    UploadSkippedFileMissing,
}

/// Why a descriptor with a file on disk did not end up uploaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("file could not be read: {0}")]
    UnreadableFile(String),
    #[error("no upload destination was registered for this file")]
    NotRegistered,
}

/// Terminal classification of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    TransferFailed(FailureReason),
    SkippedMissing,
}

impl UploadOutcome {
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadOutcome::Uploaded => UploadStatus::Uploaded,
            UploadOutcome::TransferFailed(_) => UploadStatus::UploadFailed,
            UploadOutcome::SkippedMissing => UploadStatus::UploadSkippedFileMissing,
        }
    }
}

/// One line of the reconciled status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub correlation_id: CorrelationId,
    pub server_record_id: Option<String>,
    pub name: String,
    pub source_path: PathBuf,
    pub outcome: UploadOutcome,
}

/// What to do, besides classification, about declared files that do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingFilePolicy {
    Ignore,
    #[default]
    Warn,
    Error,
}

impl FromStr for MissingFilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(MissingFilePolicy::Ignore),
            "warn" => Ok(MissingFilePolicy::Warn),
            "error" => Ok(MissingFilePolicy::Error),
            other => Err(format!(
                "Unexpected value {other} for 'if_files_not_found'. Acceptable values are 'ignore', 'warn', and 'error'"
            )),
        }
    }
}

/// How user-facing notices name the files of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminology {
    #[default]
    Artifacts,
    /// Files belong to test suites; the group key is the suite identifier.
    TestResults,
}

impl Terminology {
    pub fn missing_file_notice(&self, descriptor: &ArtifactDescriptor) -> String {
        let path = descriptor.source_path.display();
        match self {
            Terminology::Artifacts => format!(
                "Artifact file not found at '{path}' for artifact '{}'",
                descriptor.metadata.name
            ),
            Terminology::TestResults => format!(
                "Test results file not found at '{path}' for test suite '{}'",
                descriptor.group_key
            ),
        }
    }

    pub fn missing_files_summary(&self) -> &'static str {
        match self {
            Terminology::Artifacts => "Artifact(s) are missing file(s)",
            Terminology::TestResults => "Test result(s) are missing file(s)",
        }
    }
}

/// Bulk registration and status reporting against one ingestion backend.
///
/// Both calls are made once per group. Implementations never retry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Register every descriptor of a group, including those whose file is missing.
    async fn register(
        &self,
        group_key: &str,
        descriptors: &[ArtifactDescriptor],
        context: &RunContext,
    ) -> Result<Vec<RegisteredUpload>, RegistrationError>;

    /// Send the reconciled statuses of a group. Best effort.
    async fn report_statuses(
        &self,
        group_key: &str,
        statuses: &[StatusEntry],
    ) -> Result<(), ReportError>;
}

/// Uploads raw bytes to a pre-signed destination.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Ok iff the destination answered with a 2xx status.
    async fn put(&self, destination_url: &str, body: Vec<u8>) -> Result<(), TransferError>;
}

/// Filesystem access used during resolution and upload.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Existing paths matching `pattern`; empty when nothing matches.
    fn expand_glob(&self, pattern: &str) -> Vec<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}
