//! High-level pipeline: resolve → register → upload → reconcile → report.
//!
//! This module is the run controller. Given the declared artifacts, the CI
//! context and the three collaborators, it:
//!   - Resolves declarations into descriptors and groups (fatal on a bad extension)
//!   - Applies the missing-file policy to the present/missing partition
//!   - Per group: registers, uploads concurrently, reconciles and reports
//!   - Aggregates a single [`RunResult`]
//!
//! # Error Handling
//! - Resolution errors abort before any network call and are returned as `Err`.
//! - A registration failure ends that group: nothing is uploaded or reported
//!   for it. Other groups still run.
//! - Transfer failures are collected, never thrown, so reconciliation and
//!   reporting always complete once registration succeeded.
//! - The status report is best effort. Its outcome is logged and recorded in
//!   the [`GroupReport`] but never changes [`RunResult::success`].
//!
//! # Concurrency
//! Groups run one after another. Within a group every transfer is in flight at
//! once and the controller waits for all of them before reconciling.

use tracing::{error, info, info_span, warn, Instrument};

use crate::contract::{
    DeclaredArtifact, FileSource, IngestionApi, MissingFilePolicy, RunContext, Terminology,
    Transfer, UploadOutcome,
};
use crate::error::{RegistrationError, ResolveError};
use crate::reconcile::{reconcile, Reconciliation};
use crate::resolve::{resolve, ResolvedGroup};
use crate::transfer::upload_all;

/// How far one group got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    RegistrationFailed(RegistrationError),
    Completed {
        reconciliation: Reconciliation,
        report_delivered: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub group_key: String,
    pub outcome: GroupOutcome,
}

impl GroupReport {
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            GroupOutcome::RegistrationFailed(_) => false,
            GroupOutcome::Completed { reconciliation, .. } => reconciliation.is_success(),
        }
    }
}

/// Process-level result. `message` is set iff `success` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    pub message: Option<String>,
    pub groups: Vec<GroupReport>,
}

/// Runs the whole upload for one CI job.
pub async fn run<A, T, F>(
    declared: &[DeclaredArtifact],
    context: &RunContext,
    policy: MissingFilePolicy,
    terminology: Terminology,
    api: &A,
    transfer: &T,
    files: &F,
) -> Result<RunResult, ResolveError>
where
    A: IngestionApi + ?Sized,
    T: Transfer + ?Sized,
    F: FileSource + ?Sized,
{
    info!(declared = declared.len(), "[RUN] Starting upload run");

    let groups = match resolve(declared, files) {
        Ok(groups) => groups,
        Err(e) => {
            error!(error = %e, "[RUN][ERROR] Resolution failed");
            return Err(e);
        }
    };

    let missing_is_fatal = apply_missing_file_policy(&groups, policy, terminology);

    let mut reports = Vec::with_capacity(groups.len());
    for group in &groups {
        let span = info_span!("group", key = %group.key);
        let report = run_group(group, context, api, transfer, files)
            .instrument(span)
            .await;
        reports.push(report);
    }

    let success = !missing_is_fatal && reports.iter().all(GroupReport::is_success);
    let message = if success {
        None
    } else {
        Some(failure_message(&reports, missing_is_fatal, terminology))
    };

    match &message {
        None => info!(groups = reports.len(), "[RUN] Upload run succeeded"),
        Some(m) => error!(message = %m, "[RUN][ERROR] Upload run failed"),
    }

    Ok(RunResult {
        success,
        message,
        groups: reports,
    })
}

async fn run_group<A, T, F>(
    group: &ResolvedGroup,
    context: &RunContext,
    api: &A,
    transfer: &T,
    files: &F,
) -> GroupReport
where
    A: IngestionApi + ?Sized,
    T: Transfer + ?Sized,
    F: FileSource + ?Sized,
{
    info!(descriptors = group.descriptors.len(), "[REGISTER] Registering group");
    let registered = match api.register(&group.key, &group.descriptors, context).await {
        Ok(registered) => {
            info!(registered = registered.len(), "[REGISTER] Registration succeeded");
            registered
        }
        Err(e) => {
            error!(error = %e, "[REGISTER][ERROR] Registration failed; skipping upload and report");
            return GroupReport {
                group_key: group.key.clone(),
                outcome: GroupOutcome::RegistrationFailed(e),
            };
        }
    };

    let transfers = upload_all(group, &registered, transfer, files).await;
    let reconciliation = reconcile(group, &registered, &transfers);
    info!(
        uploaded = reconciliation.uploaded_count(),
        failed = reconciliation.failed_count(),
        missing = reconciliation.missing_count(),
        "[RECONCILE] Outcomes reconciled"
    );

    // Best effort.
    let report_delivered = match api
        .report_statuses(&group.key, &reconciliation.entries)
        .await
    {
        Ok(()) => {
            info!("[REPORT] Status report delivered");
            true
        }
        Err(e) => {
            warn!(error = %e, "[REPORT] Status report could not be delivered; ignoring");
            false
        }
    };

    GroupReport {
        group_key: group.key.clone(),
        outcome: GroupOutcome::Completed {
            reconciliation,
            report_delivered,
        },
    }
}

/// Logs missing files per policy. Returns true when the policy fails the run.
fn apply_missing_file_policy(
    groups: &[ResolvedGroup],
    policy: MissingFilePolicy,
    terminology: Terminology,
) -> bool {
    let mut missing = 0usize;
    for descriptor in groups.iter().flat_map(|g| g.without_file()) {
        missing += 1;
        match policy {
            MissingFilePolicy::Ignore => {}
            MissingFilePolicy::Warn => warn!("{}", terminology.missing_file_notice(descriptor)),
            MissingFilePolicy::Error => error!("{}", terminology.missing_file_notice(descriptor)),
        }
    }
    policy == MissingFilePolicy::Error && missing > 0
}

fn failure_message(
    reports: &[GroupReport],
    missing_is_fatal: bool,
    terminology: Terminology,
) -> String {
    let mut parts = Vec::new();

    if missing_is_fatal {
        parts.push(terminology.missing_files_summary().to_string());
    }

    for report in reports {
        if let GroupOutcome::RegistrationFailed(e) = &report.outcome {
            parts.push(format!(
                "Bulk registration failed for group '{}':\n\n  - Errors: {}",
                report.group_key, e
            ));
        }
    }

    let failed_lines: Vec<String> = reports
        .iter()
        .filter_map(|report| match &report.outcome {
            GroupOutcome::Completed { reconciliation, .. } => {
                Some((report.group_key.as_str(), reconciliation))
            }
            GroupOutcome::RegistrationFailed(_) => None,
        })
        .flat_map(|(key, reconciliation)| {
            reconciliation.failed().map(move |entry| {
                let reason = match &entry.outcome {
                    UploadOutcome::TransferFailed(reason) => reason.to_string(),
                    _ => String::new(),
                };
                format!(
                    "  - Group: {}, Name: {}, Path: {} ({})",
                    key,
                    entry.name,
                    entry.source_path.display(),
                    reason
                )
            })
        })
        .collect();

    if !failed_lines.is_empty() {
        parts.push(format!(
            "Some artifacts could not be uploaded:\n\n  Artifacts:\n{}",
            failed_lines.join("\n")
        ));
    }

    parts.join("\n\n")
}
