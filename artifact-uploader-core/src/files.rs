//! Local filesystem implementation of [`FileSource`].

use async_trait::async_trait;
use glob::MatchOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::contract::FileSource;

/// Reads from the working directory of the process; glob patterns are
/// resolved relative to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

#[async_trait]
impl FileSource for LocalFiles {
    fn expand_glob(&self, pattern: &str) -> Vec<PathBuf> {
        // Wildcards never match a leading dot, so hidden files need an explicit `.`.
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };
        let entries = match glob::glob_with(pattern, options) {
            Ok(entries) => entries,
            Err(e) => {
                // Not a valid pattern; the caller falls back to the literal path.
                debug!(pattern, error = %e, "[RESOLVE] Pattern could not be parsed as a glob");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(pattern, error = %e, "[RESOLVE] Skipping unreadable glob match");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}
