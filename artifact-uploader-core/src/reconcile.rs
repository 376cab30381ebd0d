//! Outcome reconciliation: one [`StatusEntry`] per descriptor, no omissions.

use std::collections::HashMap;
use tracing::warn;

use crate::contract::{
    CorrelationId, FailureReason, RegisteredUpload, StatusEntry, UploadOutcome,
};
use crate::resolve::ResolvedGroup;
use crate::transfer::TransferResult;

/// The reconciled outcome set of one group, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub entries: Vec<StatusEntry>,
}

impl Reconciliation {
    pub fn failed(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, UploadOutcome::TransferFailed(_)))
    }

    fn count(&self, outcome: fn(&UploadOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| outcome(&e.outcome)).count()
    }

    pub fn uploaded_count(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Uploaded))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::TransferFailed(_)))
    }

    pub fn missing_count(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::SkippedMissing))
    }

    /// A group succeeds when nothing failed to transfer. Missing files do not count.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Classifies every descriptor of `group`.
///
/// - no file at resolution time: `SkippedMissing`, whatever else happened
/// - transfer succeeded: `Uploaded`
/// - anything else, including a missing registration record: `TransferFailed`
pub fn reconcile(
    group: &ResolvedGroup,
    registered: &[RegisteredUpload],
    transfers: &HashMap<CorrelationId, TransferResult>,
) -> Reconciliation {
    let records: HashMap<&CorrelationId, &RegisteredUpload> = registered
        .iter()
        .map(|upload| (&upload.correlation_id, upload))
        .collect();

    let entries = group
        .descriptors
        .iter()
        .map(|descriptor| {
            let record = records.get(&descriptor.correlation_id);
            let outcome = if !group.has_file(descriptor) {
                UploadOutcome::SkippedMissing
            } else {
                match transfers.get(&descriptor.correlation_id) {
                    Some(Ok(())) => UploadOutcome::Uploaded,
                    Some(Err(reason)) => UploadOutcome::TransferFailed(reason.clone()),
                    None => {
                        warn!(
                            group = %group.key,
                            correlation_id = %descriptor.correlation_id,
                            path = %descriptor.source_path.display(),
                            "[RECONCILE] Registration response omitted this file"
                        );
                        UploadOutcome::TransferFailed(FailureReason::NotRegistered)
                    }
                }
            };

            StatusEntry {
                correlation_id: descriptor.correlation_id.clone(),
                server_record_id: record.and_then(|r| r.server_record_id.clone()),
                name: descriptor.metadata.name.clone(),
                source_path: descriptor.source_path.clone(),
                outcome,
            }
        })
        .collect();

    Reconciliation { entries }
}
