#![doc = "Ingestion API client: implements the core `IngestionApi` trait over HTTP for every supported backend."]
//
//! # Ingestion client (CLI <-> Core)
//!
//! This module wires the [`IngestionApi`] trait from `artifact-uploader-core` to the
//! real remote service. One [`IngestionClient`] serves all backends; the [`Backend`]
//! value selects endpoint paths, request field mappings, the status vocabulary
//! and how descriptors are grouped.
//!
//! - `test_suites`: one registration per test suite, statuses keyed by server id
//! - `artifacts`: one registration per run, statuses keyed by correlation id
//! - `legacy_artifacts`: like `artifacts`, but only uploaded ids are reported
//!
//! Request bodies and response parsing are plain functions so they can be tested
//! without a server. Calls are made once; nothing here retries.

use artifact_uploader_core::contract::{
    ArtifactDescriptor, IngestionApi, RegisteredUpload, RunContext, StatusEntry, Terminology,
    UploadOutcome, UploadStatus,
};
use artifact_uploader_core::error::{ApiError, RegistrationError, ReportError};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which ingestion endpoint family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    TestSuites,
    Artifacts,
    LegacyArtifacts,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test_suites" => Ok(Backend::TestSuites),
            "artifacts" => Ok(Backend::Artifacts),
            "legacy_artifacts" => Ok(Backend::LegacyArtifacts),
            other => Err(format!(
                "Unexpected value {other} for 'backend'. Acceptable values are 'test_suites', 'artifacts', and 'legacy_artifacts'"
            )),
        }
    }
}

const ARTIFACTS_GROUP: &str = "artifacts";
const BULK_ARTIFACTS_PATH: &str = "/api/organization/integrations/github/bulk_artifacts";
const BULK_TEST_RESULTS_PATH: &str = "/api/test_suites/bulk_test_results";

impl Backend {
    /// Test-suite backends batch by suite name; artifact backends send one batch.
    pub fn group_key_for(&self, artifact_name: &str) -> String {
        match self {
            Backend::TestSuites => artifact_name.to_string(),
            Backend::Artifacts | Backend::LegacyArtifacts => ARTIFACTS_GROUP.to_string(),
        }
    }

    pub fn terminology(&self) -> Terminology {
        match self {
            Backend::TestSuites => Terminology::TestResults,
            Backend::Artifacts | Backend::LegacyArtifacts => Terminology::Artifacts,
        }
    }

    fn registration_path(&self) -> &'static str {
        match self {
            Backend::TestSuites => BULK_TEST_RESULTS_PATH,
            Backend::Artifacts | Backend::LegacyArtifacts => BULK_ARTIFACTS_PATH,
        }
    }

    fn status_path(&self) -> String {
        match self {
            Backend::TestSuites => BULK_TEST_RESULTS_PATH.to_string(),
            Backend::Artifacts => format!("{BULK_ARTIFACTS_PATH}/status"),
            Backend::LegacyArtifacts => format!("{BULK_ARTIFACTS_PATH}/uploaded"),
        }
    }

    fn registration_error_message(&self) -> &'static str {
        match self {
            Backend::TestSuites => "An unexpected error occurred while creating bulk test results",
            Backend::Artifacts | Backend::LegacyArtifacts => {
                "An unexpected error occurred while creating bulk artifacts"
            }
        }
    }

    fn report_error_message(&self) -> &'static str {
        match self {
            Backend::TestSuites => "An unexpected error occurred while updating bulk test results",
            Backend::Artifacts => {
                "An unexpected error occurred while updating bulk artifacts status"
            }
            Backend::LegacyArtifacts => {
                "An unexpected error occurred while marking bulk artifacts uploaded"
            }
        }
    }
}

/// Base URL and bearer token for the ingestion API.
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: String,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

// --- wire types: registration ---

#[derive(Serialize)]
struct CreateBulkTestResults<'a> {
    provider: &'static str,
    attempted_by: Option<&'a str>,
    branch: Option<&'a str>,
    commit_message: Option<&'a str>,
    commit_sha: Option<&'a str>,
    job_tags: GitHubJobTags<'a>,
    test_results_files: Vec<TestResultsFile<'a>>,
    test_suite_identifier: &'a str,
}

#[derive(Serialize)]
struct GitHubJobTags<'a> {
    github_account_owner: &'a str,
    github_repository_name: &'a str,
    github_run_id: &'a str,
    github_run_attempt: String,
    github_job_matrix: Option<&'a serde_json::Value>,
    github_job_name: &'a str,
}

#[derive(Serialize)]
struct TestResultsFile<'a> {
    external_identifier: &'a str,
    format: Option<&'a str>,
    original_path: &'a str,
}

#[derive(Serialize)]
struct CreateBulkArtifacts<'a> {
    account_name: &'a str,
    artifacts: Vec<BulkArtifactInput<'a>>,
    job_name: &'a str,
    job_matrix: Option<&'a serde_json::Value>,
    repository_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_attempt: Option<u32>,
    run_id: &'a str,
}

#[derive(Serialize)]
struct BulkArtifactInput<'a> {
    kind: Option<&'a str>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parser: Option<&'a str>,
    mime_type: &'static str,
    external_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_path: Option<&'a str>,
}

#[derive(Deserialize)]
struct TestResultsUploads {
    test_results_uploads: Vec<TestResultsUpload>,
}

#[derive(Deserialize)]
struct TestResultsUpload {
    id: String,
    external_identifier: String,
    upload_url: String,
}

#[derive(Deserialize)]
struct BulkArtifacts {
    bulk_artifacts: Vec<BulkArtifact>,
}

#[derive(Deserialize)]
struct BulkArtifact {
    external_id: String,
    upload_url: String,
}

// --- wire types: status ---

#[derive(Serialize)]
struct UpdateBulkTestResults<'a> {
    test_suite_identifier: &'a str,
    test_results_files: Vec<TestResultsFileStatus<'a>>,
}

#[derive(Serialize)]
struct TestResultsFileStatus<'a> {
    id: &'a str,
    upload_status: UploadStatus,
}

#[derive(Serialize)]
struct UpdateBulkArtifactsStatus<'a> {
    artifacts: Vec<BulkArtifactStatus<'a>>,
}

#[derive(Serialize)]
struct BulkArtifactStatus<'a> {
    external_id: &'a str,
    status: UploadStatus,
}

#[derive(Serialize)]
struct MarkBulkArtifactsUploaded<'a> {
    external_ids: Vec<&'a str>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Wrapped { errors: Vec<ApiError> },
    Bare(Vec<ApiError>),
}

/// Extracts structured errors from a failed response body, substituting one
/// generic error when the body is empty, unparsable or lists nothing.
pub fn parse_errors(body: &str, generic_message: &str) -> Vec<ApiError> {
    let errors = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Wrapped { errors }) | Ok(ErrorBody::Bare(errors)) => errors,
        Err(_) => Vec::new(),
    };
    if errors.is_empty() {
        vec![ApiError::unexpected(generic_message)]
    } else {
        errors
    }
}

/// JSON body of the registration request for one group.
pub fn registration_body(
    backend: Backend,
    group_key: &str,
    descriptors: &[ArtifactDescriptor],
    context: &RunContext,
) -> serde_json::Result<serde_json::Value> {
    match backend {
        Backend::TestSuites => serde_json::to_value(CreateBulkTestResults {
            provider: "github",
            attempted_by: context.attempted_by.as_deref(),
            branch: context.branch.as_deref(),
            commit_message: context.commit_message.as_deref(),
            commit_sha: context.commit_sha.as_deref(),
            job_tags: GitHubJobTags {
                github_account_owner: &context.account_name,
                github_repository_name: &context.repository_name,
                github_run_id: &context.run_id,
                github_run_attempt: context.run_attempt.to_string(),
                github_job_matrix: context.job_matrix.as_ref(),
                github_job_name: &context.job_name,
            },
            test_results_files: descriptors
                .iter()
                .map(|d| TestResultsFile {
                    external_identifier: d.correlation_id.as_str(),
                    format: d.metadata.parser.as_deref(),
                    original_path: &d.declared_path,
                })
                .collect(),
            test_suite_identifier: group_key,
        }),
        Backend::Artifacts | Backend::LegacyArtifacts => {
            let current = backend == Backend::Artifacts;
            serde_json::to_value(CreateBulkArtifacts {
                account_name: &context.account_name,
                artifacts: descriptors
                    .iter()
                    .map(|d| BulkArtifactInput {
                        kind: d.metadata.kind.as_deref(),
                        name: &d.metadata.name,
                        parser: d.metadata.parser.as_deref().filter(|_| current),
                        mime_type: d.media_kind.mime_type(),
                        external_id: d.correlation_id.as_str(),
                        original_path: Some(d.declared_path.as_str()).filter(|_| current),
                    })
                    .collect(),
                job_name: &context.job_name,
                job_matrix: context.job_matrix.as_ref(),
                repository_name: &context.repository_name,
                run_attempt: Some(context.run_attempt).filter(|_| current),
                run_id: &context.run_id,
            })
        }
    }
}

/// Parses a successful registration response into upload destinations.
pub fn parse_registration(
    backend: Backend,
    body: &str,
) -> serde_json::Result<Vec<RegisteredUpload>> {
    match backend {
        Backend::TestSuites => {
            let parsed: TestResultsUploads = serde_json::from_str(body)?;
            Ok(parsed
                .test_results_uploads
                .into_iter()
                .map(|u| RegisteredUpload {
                    correlation_id: u.external_identifier.into(),
                    server_record_id: Some(u.id),
                    destination_url: u.upload_url,
                })
                .collect())
        }
        Backend::Artifacts | Backend::LegacyArtifacts => {
            let parsed: BulkArtifacts = serde_json::from_str(body)?;
            Ok(parsed
                .bulk_artifacts
                .into_iter()
                .map(|a| RegisteredUpload {
                    correlation_id: a.external_id.into(),
                    server_record_id: None,
                    destination_url: a.upload_url,
                })
                .collect())
        }
    }
}

/// JSON body of the status report for one group.
pub fn status_body(
    backend: Backend,
    group_key: &str,
    statuses: &[StatusEntry],
) -> serde_json::Result<serde_json::Value> {
    match backend {
        Backend::TestSuites => {
            let files = statuses
                .iter()
                .filter_map(|entry| match entry.server_record_id.as_deref() {
                    Some(id) => Some(TestResultsFileStatus {
                        id,
                        upload_status: entry.outcome.status(),
                    }),
                    None => {
                        tracing::warn!(
                            correlation_id = %entry.correlation_id,
                            "[REPORT] No server id for file; leaving it out of the status report"
                        );
                        None
                    }
                })
                .collect();
            serde_json::to_value(UpdateBulkTestResults {
                test_suite_identifier: group_key,
                test_results_files: files,
            })
        }
        Backend::Artifacts => serde_json::to_value(UpdateBulkArtifactsStatus {
            artifacts: statuses
                .iter()
                .map(|entry| BulkArtifactStatus {
                    external_id: entry.correlation_id.as_str(),
                    status: entry.outcome.status(),
                })
                .collect(),
        }),
        Backend::LegacyArtifacts => serde_json::to_value(MarkBulkArtifactsUploaded {
            external_ids: statuses
                .iter()
                .filter(|entry| entry.outcome == UploadOutcome::Uploaded)
                .map(|entry| entry.correlation_id.as_str())
                .collect(),
        }),
    }
}

/// HTTP client for the ingestion API.
pub struct IngestionClient {
    http: reqwest::Client,
    config: ApiConfig,
    backend: Backend,
}

impl IngestionClient {
    pub fn new(backend: Backend, config: ApiConfig) -> Self {
        tracing::info!(
            backend = ?backend,
            base_url = %config.base_url,
            token_set = !config.token.is_empty(),
            "Initialized IngestionClient"
        );
        Self {
            http: reqwest::Client::new(),
            config,
            backend,
        }
    }

    /// Sends `body` and returns the status and the (possibly empty) response text.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(reqwest::StatusCode, String), reqwest::Error> {
        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!(%method, %url, "Sending ingestion API request");
        let response = self
            .http
            .request(method, url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

fn request_failed(generic_message: &str, detail: impl fmt::Display) -> ApiError {
    ApiError::new("request_failed", format!("{generic_message}: {detail}"))
}

#[async_trait]
impl IngestionApi for IngestionClient {
    async fn register(
        &self,
        group_key: &str,
        descriptors: &[ArtifactDescriptor],
        context: &RunContext,
    ) -> Result<Vec<RegisteredUpload>, RegistrationError> {
        let generic = self.backend.registration_error_message();
        tracing::info!(
            group = group_key,
            files = descriptors.len(),
            "Registering files with ingestion API"
        );

        let body = registration_body(self.backend, group_key, descriptors, context)
            .map_err(|e| RegistrationError::new(vec![request_failed(generic, e)]))?;
        let (status, text) = self
            .send(Method::POST, self.backend.registration_path(), &body)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, group = group_key, "Registration request failed");
                RegistrationError::new(vec![request_failed(generic, e)])
            })?;

        if !status.is_success() {
            tracing::error!(%status, group = group_key, "Registration rejected");
            return Err(RegistrationError::new(parse_errors(&text, generic)));
        }

        parse_registration(self.backend, &text).map_err(|e| {
            tracing::error!(error = ?e, group = group_key, "Registration response could not be parsed");
            RegistrationError::new(vec![ApiError::new(
                "unexpected_response",
                format!("{generic}: {e}"),
            )])
        })
    }

    async fn report_statuses(
        &self,
        group_key: &str,
        statuses: &[StatusEntry],
    ) -> Result<(), ReportError> {
        let generic = self.backend.report_error_message();
        tracing::info!(
            group = group_key,
            statuses = statuses.len(),
            "Reporting upload statuses"
        );

        let body = status_body(self.backend, group_key, statuses)
            .map_err(|e| ReportError::new(vec![request_failed(generic, e)]))?;
        let (status, text) = self
            .send(Method::PUT, &self.backend.status_path(), &body)
            .await
            .map_err(|e| ReportError::new(vec![request_failed(generic, e)]))?;

        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::new(parse_errors(&text, generic)))
        }
    }
}
