/// `load_config` module: Loads a static YAML config and the CI environment into one
/// [`UploaderConfig`] value.
///
/// This is the only place where ambient state (files, environment variables) is read.
/// Everything downstream receives the merged value by reference.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into intermediate types
/// - Map loosely-typed keys (backend, missing-file policy) to enums
/// - Inject the API token and the GitHub Actions job context from the environment
/// - Collect every validation problem and fail once, before any network activity
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use artifact_uploader_core::contract::{
    ArtifactMetadata, DeclaredArtifact, MissingFilePolicy, RunContext,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::upload::{ApiConfig, Backend};

pub const TOKEN_ENV: &str = "ARTIFACT_UPLOADER_TOKEN";
pub const COMMIT_MESSAGE_ENV: &str = "ARTIFACT_UPLOADER_COMMIT_MESSAGE";
const DEFAULT_BASE_URL: &str = "https://captain.build";

#[derive(Debug, Deserialize)]
struct StaticConfig {
    backend: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    if_files_not_found: Option<String>,
    #[serde(default)]
    job_name: Option<String>,
    #[serde(default)]
    job_matrix: Option<serde_json::Value>,
    #[serde(default)]
    artifacts: Vec<ArtifactSection>,
}

#[derive(Debug, Deserialize)]
struct ArtifactSection {
    name: String,
    path: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    parser: Option<String>,
}

/// Fully merged configuration for one run.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub backend: Backend,
    pub api: ApiConfig,
    pub missing_file_policy: MissingFilePolicy,
    pub context: RunContext,
    pub artifacts: Vec<DeclaredArtifact>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_env(name: &str, errors: &mut Vec<String>) -> String {
    env_var(name).unwrap_or_else(|| {
        errors.push(format!("{name} environment variable is not set"));
        String::new()
    })
}

/// Loads the YAML file at `path` and merges in environment secrets and CI context.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<UploaderConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut errors: Vec<String> = Vec::new();

    let backend = match static_conf.backend.parse::<Backend>() {
        Ok(backend) => Some(backend),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let missing_file_policy = match static_conf.if_files_not_found.as_deref() {
        None => MissingFilePolicy::default(),
        Some(raw) => raw.parse::<MissingFilePolicy>().unwrap_or_else(|e| {
            errors.push(e);
            MissingFilePolicy::default()
        }),
    };

    if static_conf.artifacts.is_empty() {
        errors.push("You must include at least one artifact in the `artifacts` field.".into());
    }

    let token = env_var(TOKEN_ENV).unwrap_or_else(|| {
        errors.push(format!("{TOKEN_ENV} can't be empty."));
        String::new()
    });

    let context = load_run_context(&static_conf, backend, &mut errors);

    if !errors.is_empty() {
        for e in &errors {
            error!(problem = %e, "Configuration problem");
        }
        anyhow::bail!(
            "Uploader is misconfigured and can't upload artifacts:\n  - {}",
            errors.join("\n  - ")
        );
    }
    // Every `None` above pushed an error, so this is reachable only with a backend.
    let backend = backend.context("backend must be configured")?;

    let artifacts = static_conf
        .artifacts
        .into_iter()
        .map(|a| DeclaredArtifact {
            group_key: backend.group_key_for(&a.name),
            path: a.path,
            metadata: ArtifactMetadata {
                name: a.name,
                kind: a.kind,
                parser: a.parser,
            },
        })
        .collect::<Vec<_>>();

    let base_url = static_conf
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    info!(
        backend = ?backend,
        base_url = %base_url,
        artifacts = artifacts.len(),
        policy = ?missing_file_policy,
        "Config loaded and merged successfully"
    );

    Ok(UploaderConfig {
        backend,
        api: ApiConfig { base_url, token },
        missing_file_policy,
        context,
        artifacts,
    })
}

fn load_run_context(
    static_conf: &StaticConfig,
    backend: Option<Backend>,
    errors: &mut Vec<String>,
) -> RunContext {
    let repository = required_env("GITHUB_REPOSITORY", errors);
    let (repo_owner, repository_name) = match repository.split_once('/') {
        Some((owner, name)) => (owner.to_string(), name.to_string()),
        None => (String::new(), repository.clone()),
    };
    let account_name = env_var("GITHUB_REPOSITORY_OWNER").unwrap_or(repo_owner);

    let job_name = match &static_conf.job_name {
        Some(name) if !name.trim().is_empty() => name.clone(),
        _ => required_env("GITHUB_JOB", errors),
    };

    let run_id = required_env("GITHUB_RUN_ID", errors);
    let run_attempt = match env_var("GITHUB_RUN_ATTEMPT") {
        Some(raw) => raw.parse::<u32>().unwrap_or_else(|e| {
            errors.push(format!("GITHUB_RUN_ATTEMPT must be a positive integer: {e}"));
            0
        }),
        None => {
            errors.push("GITHUB_RUN_ATTEMPT environment variable is not set".into());
            0
        }
    };

    let (branch, commit_sha) = if backend == Some(Backend::TestSuites) {
        (
            Some(required_env("GITHUB_REF_NAME", errors)),
            Some(required_env("GITHUB_SHA", errors)),
        )
    } else {
        (env_var("GITHUB_REF_NAME"), env_var("GITHUB_SHA"))
    };

    RunContext {
        account_name,
        repository_name,
        job_name,
        job_matrix: static_conf.job_matrix.clone(),
        run_id,
        run_attempt,
        branch,
        commit_sha,
        commit_message: env_var(COMMIT_MESSAGE_ENV),
        attempted_by: env_var("GITHUB_ACTOR"),
    }
}
