use artifact_uploader::load_config::{load_config, COMMIT_MESSAGE_ENV, TOKEN_ENV};
use artifact_uploader::upload::Backend;
use artifact_uploader_core::contract::MissingFilePolicy;
use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::NamedTempFile;

const GITHUB_ENV: &[(&str, &str)] = &[
    ("GITHUB_REPOSITORY_OWNER", "rwx-research"),
    ("GITHUB_REPOSITORY", "rwx-research/uploader"),
    ("GITHUB_RUN_ID", "4242"),
    ("GITHUB_RUN_ATTEMPT", "3"),
    ("GITHUB_JOB", "tests"),
    ("GITHUB_REF_NAME", "main"),
    ("GITHUB_SHA", "deadbeef"),
    ("GITHUB_ACTOR", "octocat"),
];

fn set_ci_env() {
    for (key, value) in GITHUB_ENV {
        env::set_var(key, value);
    }
    env::set_var(TOKEN_ENV, "secret-token");
    env::set_var(COMMIT_MESSAGE_ENV, "Fix flaky spec");
}

fn write_config(yaml: &str) -> NamedTempFile {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), yaml).unwrap();
    config_file
}

#[test]
#[serial]
fn test_load_config_merges_yaml_and_environment() {
    set_ci_env();
    let config_file = write_config(
        r#"
backend: artifacts
base_url: "https://ingest.example.com/"
if_files_not_found: error
job_matrix:
  node: 18
artifacts:
  - name: RSpec
    path: tmp/rspec*.json
    kind: test_results
    parser: rspec_json
  - name: Cypress
    path: tmp/cypress.xml
"#,
    );

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.backend, Backend::Artifacts);
    assert_eq!(config.api.base_url, "https://ingest.example.com");
    assert_eq!(config.api.token, "secret-token");
    assert_eq!(config.missing_file_policy, MissingFilePolicy::Error);

    assert_eq!(config.artifacts.len(), 2);
    assert!(config.artifacts.iter().all(|a| a.group_key == "artifacts"));
    assert_eq!(config.artifacts[0].path, "tmp/rspec*.json");
    assert_eq!(config.artifacts[0].metadata.parser.as_deref(), Some("rspec_json"));
    assert_eq!(config.artifacts[1].metadata.kind, None);

    let context = &config.context;
    assert_eq!(context.account_name, "rwx-research");
    assert_eq!(context.repository_name, "uploader");
    assert_eq!(context.job_name, "tests");
    assert_eq!(context.run_id, "4242");
    assert_eq!(context.run_attempt, 3);
    assert_eq!(context.job_matrix, Some(serde_json::json!({"node": 18})));
    assert_eq!(context.commit_message.as_deref(), Some("Fix flaky spec"));
    assert_eq!(context.attempted_by.as_deref(), Some("octocat"));
}

#[test]
#[serial]
fn test_load_config_defaults_and_test_suite_grouping() {
    set_ci_env();
    let config_file = write_config(
        r#"
backend: test_suites
job_name: custom-job
artifacts:
  - name: rspec
    path: a.json
  - name: jest
    path: b.json
"#,
    );

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.backend, Backend::TestSuites);
    assert_eq!(config.api.base_url, "https://captain.build");
    assert_eq!(config.missing_file_policy, MissingFilePolicy::Warn);
    assert_eq!(config.context.job_name, "custom-job");
    assert_eq!(config.context.branch.as_deref(), Some("main"));
    assert_eq!(config.context.commit_sha.as_deref(), Some("deadbeef"));
    let keys: Vec<_> = config.artifacts.iter().map(|a| a.group_key.as_str()).collect();
    assert_eq!(keys, vec!["rspec", "jest"]);
}

#[test]
#[serial]
fn test_load_config_collects_every_problem() {
    set_ci_env();
    env::remove_var(TOKEN_ENV);
    let config_file = write_config(
        r#"
backend: ftp
if_files_not_found: panic
artifacts: []
"#,
    );

    let err = load_config(config_file.path())
        .expect_err("Invalid config must fail")
        .to_string();

    assert!(err.starts_with("Uploader is misconfigured and can't upload artifacts:"));
    assert!(err.contains("Unexpected value ftp for 'backend'"));
    assert!(err.contains("Unexpected value panic for 'if_files_not_found'"));
    assert!(err.contains("at least one artifact"));
    assert!(err.contains("ARTIFACT_UPLOADER_TOKEN can't be empty."));
}

#[test]
#[serial]
fn test_load_config_test_suites_require_branch_and_sha() {
    set_ci_env();
    env::remove_var("GITHUB_REF_NAME");
    env::remove_var("GITHUB_SHA");
    let yaml = r#"
backend: BACKEND
artifacts:
  - name: rspec
    path: a.json
"#;

    let suites = write_config(&yaml.replace("BACKEND", "test_suites"));
    let err = load_config(suites.path()).expect_err("Branch and SHA are required").to_string();
    assert!(err.contains("GITHUB_REF_NAME"));
    assert!(err.contains("GITHUB_SHA"));

    let artifacts = write_config(&yaml.replace("BACKEND", "artifacts"));
    let config = load_config(artifacts.path()).expect("Artifacts backend tolerates missing branch");
    assert_eq!(config.context.branch, None);
    assert_eq!(config.context.commit_sha, None);
}

#[test]
#[serial]
fn test_load_config_rejects_non_numeric_run_attempt() {
    set_ci_env();
    env::set_var("GITHUB_RUN_ATTEMPT", "first");
    let config_file = write_config("backend: artifacts\nartifacts:\n  - name: a\n    path: a.json\n");

    let err = load_config(config_file.path()).expect_err("Must fail").to_string();
    assert!(err.contains("GITHUB_RUN_ATTEMPT must be a positive integer"));
}

#[test]
#[serial]
fn test_load_config_missing_file_fails() {
    let err = load_config("/nonexistent/uploader.yml").expect_err("Missing file must fail");
    assert!(err.to_string().contains("Failed to read config file"));
}
