//! Per-file upload executor and the HTTP implementation of [`Transfer`].
//!
//! Every eligible file is uploaded concurrently; the executor waits for all of
//! them and never turns an individual failure into an early return.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::{error, info};

use crate::contract::{
    CorrelationId, FailureReason, FileSource, RegisteredUpload, Transfer,
};
use crate::error::TransferError;
use crate::resolve::ResolvedGroup;

/// Result of one attempted transfer.
pub type TransferResult = Result<(), FailureReason>;

/// Uploads every descriptor of `group` that has a file on disk and a
/// registration record. Descriptors lacking either are not attempted and are
/// absent from the returned map.
pub async fn upload_all<T, F>(
    group: &ResolvedGroup,
    registered: &[RegisteredUpload],
    transfer: &T,
    files: &F,
) -> HashMap<CorrelationId, TransferResult>
where
    T: Transfer + ?Sized,
    F: FileSource + ?Sized,
{
    let destinations: HashMap<&CorrelationId, &RegisteredUpload> = registered
        .iter()
        .map(|upload| (&upload.correlation_id, upload))
        .collect();

    let uploads = group
        .with_file()
        .filter_map(|descriptor| {
            destinations
                .get(&descriptor.correlation_id)
                .map(|upload| (descriptor, *upload))
        })
        .map(|(descriptor, upload)| async move {
            let result = match files.read(&descriptor.source_path).await {
                Ok(body) => transfer
                    .put(&upload.destination_url, body)
                    .await
                    .map_err(FailureReason::from),
                Err(e) => Err(FailureReason::UnreadableFile(e.to_string())),
            };

            match &result {
                Ok(()) => info!(
                    group = %group.key,
                    path = %descriptor.source_path.display(),
                    "[UPLOAD] Transfer succeeded"
                ),
                Err(reason) => error!(
                    group = %group.key,
                    path = %descriptor.source_path.display(),
                    reason = %reason,
                    "[UPLOAD][ERROR] Transfer failed"
                ),
            }

            (descriptor.correlation_id.clone(), result)
        });

    join_all(uploads).await.into_iter().collect()
}

/// PUTs bytes to pre-signed URLs with a shared `reqwest` client.
///
/// No authentication is attached; the destination URL carries its own
/// signature.
#[derive(Debug, Clone, Default)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn put(&self, destination_url: &str, body: Vec<u8>) -> Result<(), TransferError> {
        let response = self
            .client
            .put(destination_url)
            .body(body)
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransferError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
