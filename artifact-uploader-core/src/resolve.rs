//! Artifact descriptor resolution: glob expansion, classification, grouping and
//! the present/missing partition.
//!
//! The partition is computed exactly once here and is reused by the
//! missing-file policy and by reconciliation.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::contract::{
    ArtifactDescriptor, CorrelationId, DeclaredArtifact, FileSource, MediaKind,
};
use crate::error::ResolveError;

/// All descriptors sharing one group key, in resolution order.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    pub key: String,
    pub descriptors: Vec<ArtifactDescriptor>,
    missing: HashSet<CorrelationId>,
}

impl ResolvedGroup {
    pub fn has_file(&self, descriptor: &ArtifactDescriptor) -> bool {
        !self.missing.contains(&descriptor.correlation_id)
    }

    pub fn with_file(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.descriptors.iter().filter(|d| self.has_file(d))
    }

    pub fn without_file(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.descriptors.iter().filter(|d| !self.has_file(d))
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }
}

/// Expands every declared artifact and groups the resulting descriptors.
///
/// A declaration that matches nothing still yields one descriptor carrying the
/// declared path verbatim. Any unrecognised extension fails the whole call.
pub fn resolve<F>(
    declared: &[DeclaredArtifact],
    files: &F,
) -> Result<Vec<ResolvedGroup>, ResolveError>
where
    F: FileSource + ?Sized,
{
    let mut groups: Vec<ResolvedGroup> = Vec::new();

    for artifact in declared {
        let expanded = files.expand_glob(&artifact.path);
        debug!(
            declared_path = %artifact.path,
            matches = expanded.len(),
            "[RESOLVE] Expanded declared path"
        );
        let source_paths = if expanded.is_empty() {
            vec![PathBuf::from(&artifact.path)]
        } else {
            expanded
        };

        for source_path in source_paths {
            let media_kind = MediaKind::from_path(&source_path).ok_or_else(|| {
                ResolveError::UnsupportedExtension {
                    path: source_path.clone(),
                    declared: artifact.path.clone(),
                }
            })?;

            let descriptor = ArtifactDescriptor {
                correlation_id: CorrelationId::generate(),
                group_key: artifact.group_key.clone(),
                source_path,
                declared_path: artifact.path.clone(),
                media_kind,
                metadata: artifact.metadata.clone(),
            };

            let group = match groups.iter().position(|g| g.key == artifact.group_key) {
                Some(index) => &mut groups[index],
                None => {
                    groups.push(ResolvedGroup {
                        key: artifact.group_key.clone(),
                        descriptors: Vec::new(),
                        missing: HashSet::new(),
                    });
                    let last = groups.len() - 1;
                    &mut groups[last]
                }
            };

            if !files.exists(&descriptor.source_path) {
                group.missing.insert(descriptor.correlation_id.clone());
            }
            group.descriptors.push(descriptor);
        }
    }

    for group in &groups {
        info!(
            group = %group.key,
            descriptors = group.descriptors.len(),
            missing = group.missing_count(),
            "[RESOLVE] Resolved group"
        );
    }

    Ok(groups)
}
