mod support;

use artifact_uploader::upload::{ApiConfig, Backend, IngestionClient};
use artifact_uploader_core::contract::{
    ArtifactMetadata, DeclaredArtifact, MissingFilePolicy, RunContext, UploadOutcome,
};
use artifact_uploader_core::files::LocalFiles;
use artifact_uploader_core::pipeline::{run, GroupOutcome, RunResult};
use artifact_uploader_core::transfer::HttpTransfer;
use serde_json::json;
use std::fs;
use std::path::Path;
use support::{RecordedRequest, StubServer};
use tempfile::tempdir;

const BULK_ARTIFACTS: &str = "/api/organization/integrations/github/bulk_artifacts";

/// Registers every artifact with a storage URL on the same server, named after
/// the artifact. Storage rejects `rejected`; the status endpoint always fails.
fn ingestion_and_storage(request: &RecordedRequest, base: &str) -> (u16, String) {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", BULK_ARTIFACTS) => {
            let body = request.json();
            let uploads: Vec<_> = body["artifacts"]
                .as_array()
                .expect("artifacts array")
                .iter()
                .map(|artifact| {
                    json!({
                        "external_id": artifact["external_id"],
                        "upload_url": format!(
                            "{base}/storage/{}",
                            artifact["name"].as_str().unwrap_or_default()
                        ),
                    })
                })
                .collect();
            (200, json!({ "bulk_artifacts": uploads }).to_string())
        }
        ("PUT", "/storage/rejected") => (403, String::new()),
        ("PUT", path) if path.starts_with("/storage/") => (200, String::new()),
        _ => (500, String::new()),
    }
}

fn declare(name: &str, path: &Path) -> DeclaredArtifact {
    DeclaredArtifact {
        group_key: Backend::Artifacts.group_key_for(name),
        path: path.display().to_string(),
        metadata: ArtifactMetadata {
            name: name.into(),
            kind: Some("test_results".into()),
            parser: Some("rspec_json".into()),
        },
    }
}

async fn upload(server: &StubServer, declared: &[DeclaredArtifact]) -> RunResult {
    let api = IngestionClient::new(
        Backend::Artifacts,
        ApiConfig {
            base_url: server.base_url.clone(),
            token: "secret-token".into(),
        },
    );
    let context = RunContext {
        account_name: "rwx-research".into(),
        repository_name: "uploader".into(),
        job_name: "tests".into(),
        run_id: "7".into(),
        run_attempt: 1,
        ..Default::default()
    };

    run(
        declared,
        &context,
        MissingFilePolicy::Warn,
        Backend::Artifacts.terminology(),
        &api,
        &HttpTransfer::new(),
        &LocalFiles,
    )
    .await
    .expect("resolution succeeds")
}

#[tokio::test]
async fn failed_status_report_still_exits_successfully() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("rspec.json");
    fs::write(&path, r#"{"examples":[]}"#).expect("write fixture");
    let server = StubServer::start(ingestion_and_storage).await;

    let result = upload(&server, &[declare("rspec", &path)]).await;

    assert!(result.success, "{:?}", result.message);
    assert_eq!(result.message, None);
    match &result.groups[0].outcome {
        GroupOutcome::Completed {
            reconciliation,
            report_delivered,
        } => {
            assert!(!report_delivered);
            assert_eq!(reconciliation.entries[0].outcome, UploadOutcome::Uploaded);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let stored = server.requests_to("PUT", "/storage/rspec");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].body, br#"{"examples":[]}"#);
    assert_eq!(
        server
            .requests_to("PUT", &format!("{BULK_ARTIFACTS}/status"))
            .len(),
        1
    );
}

#[tokio::test]
async fn only_2xx_transfers_count_as_uploaded() {
    let dir = tempdir().expect("tempdir");
    let accepted = dir.path().join("accepted.json");
    let rejected = dir.path().join("rejected.xml");
    fs::write(&accepted, "{}").expect("write fixture");
    fs::write(&rejected, "<testsuite/>").expect("write fixture");
    let server = StubServer::start(ingestion_and_storage).await;

    let result = upload(
        &server,
        &[
            declare("accepted", &accepted),
            declare("rejected", &rejected),
            declare("absent", &dir.path().join("absent.json")),
        ],
    )
    .await;

    assert!(!result.success);
    let message = result.message.expect("failure message");
    assert!(message.starts_with("Some artifacts could not be uploaded:"));
    assert!(message.contains("Name: rejected"));
    assert!(message.contains("destination responded with HTTP 403"));
    assert!(!message.contains("Name: accepted"));

    let reports = server.requests_to("PUT", &format!("{BULK_ARTIFACTS}/status"));
    let statuses: Vec<_> = reports[0].json()["artifacts"]
        .as_array()
        .expect("artifacts array")
        .iter()
        .map(|a| a["status"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        statuses,
        vec!["uploaded", "upload_failed", "upload_skipped_file_missing"]
    );
    assert!(server.requests_to("PUT", "/storage/absent").is_empty());
}
