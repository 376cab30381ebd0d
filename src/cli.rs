use anyhow::Result;
use artifact_uploader_core::files::LocalFiles;
use artifact_uploader_core::pipeline::{self, GroupOutcome, GroupReport};
use artifact_uploader_core::transfer::HttpTransfer;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::load_config::load_config;
use crate::upload::IngestionClient;

/// CLI for artifact-uploader: register, upload and report CI artifacts.
#[derive(Parser)]
#[clap(
    name = "artifact-uploader",
    version,
    about = "Upload test results and other CI artifacts to an ingestion service"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload every artifact declared in the given config file
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// One human-readable line per group.
pub fn summarize(group: &GroupReport) -> String {
    match &group.outcome {
        GroupOutcome::RegistrationFailed(e) => {
            format!("Group '{}': registration failed ({e})", group.group_key)
        }
        GroupOutcome::Completed {
            reconciliation,
            report_delivered,
        } => format!(
            "Group '{}': {} uploaded, {} failed, {} missing; status report {}",
            group.group_key,
            reconciliation.uploaded_count(),
            reconciliation.failed_count(),
            reconciliation.missing_count(),
            if *report_delivered {
                "delivered"
            } else {
                "not delivered"
            }
        ),
    }
}

/// Async CLI entrypoint shared by main() and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload { config } => {
            let config = load_config(config)?;
            let api = IngestionClient::new(config.backend, config.api.clone());
            let transfer = HttpTransfer::new();

            println!("Upload starting...");
            let result = pipeline::run(
                &config.artifacts,
                &config.context,
                config.missing_file_policy,
                config.backend.terminology(),
                &api,
                &transfer,
                &LocalFiles,
            )
            .await?;

            for group in &result.groups {
                println!("{}", summarize(group));
            }

            match result.message {
                Some(message) if !result.success => Err(anyhow::Error::msg(message)),
                _ => {
                    println!("Upload complete.");
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_uploader_core::error::{ApiError, RegistrationError};

    #[test]
    fn summary_for_failed_registration_names_errors() {
        let group = GroupReport {
            group_key: "rspec".into(),
            outcome: GroupOutcome::RegistrationFailed(RegistrationError::new(vec![
                ApiError::new("bad", "Token is invalid"),
            ])),
        };
        assert_eq!(
            summarize(&group),
            "Group 'rspec': registration failed (Token is invalid)"
        );
    }
}
