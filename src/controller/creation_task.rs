use super::creations::CreationRegistry;
use crate::backend::{AssetUpload, AssetUploader, StorageBackend};
use crate::core::{EntityId, EntityPatch, NewEntity, Result, SyncError};
use crate::store::OptimisticStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, event};

/// Everything a creation task body needs, moved into the task at submit.
pub(crate) struct CreationTask {
    pub(crate) temp_id: EntityId,
    pub(crate) asset: Option<AssetUpload>,
    pub(crate) store: OptimisticStore,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) uploader: Arc<dyn AssetUploader>,
    pub(crate) creations: CreationRegistry,
    pub(crate) asset_destination: String,
    pub(crate) placeholder_attempts: u32,
    pub(crate) placeholder_backoff: Duration,
}

impl CreationTask {
    /// Upload, preview, database write, then the temporary → permanent swap.
    ///
    /// The create payload is read from the store right before the write, so
    /// edits made while the upload ran are included.
    pub(crate) async fn run(self) -> Result<()> {
        if let Some(asset) = self.asset {
            let url = self
                .uploader
                .upload_asset(asset, &self.asset_destination)
                .await?;
            self.store
                .patch(
                    &self.temp_id,
                    &EntityPatch::new().asset_url(&url).uploading_asset(false),
                )
                .await?;

            let preview = generate_placeholder_with_retry(
                self.uploader.as_ref(),
                &url,
                self.placeholder_attempts,
                self.placeholder_backoff,
            )
            .await;
            if let Some(preview) = preview {
                self.store
                    .patch(&self.temp_id, &EntityPatch::new().preview_placeholder(preview))
                    .await?;
            }
        }

        let Some(current) = self.store.get(&self.temp_id).await else {
            event!(Level::DEBUG, entity_id = %self.temp_id, "removed before create; skipping write");
            self.creations.abandon(&self.temp_id);
            return Ok(());
        };
        let payload = NewEntity::from_speculative(&current)
            .ok_or_else(|| SyncError::Backend(format!("'{}' has no correlation id", self.temp_id)))?;
        let expected = payload.correlation_id;

        let confirmed = self.backend.create_entity(payload).await?;
        if confirmed.correlation_id != Some(expected) {
            return Err(SyncError::CorrelationMismatch {
                expected,
                actual: confirmed.correlation_id,
            });
        }

        let permanent_id = confirmed.id.clone();
        // Held optimistic until a snapshot carries its correlation id; a
        // lagging snapshot would otherwise drop it.
        let mut held = confirmed;
        held.is_optimistic = true;
        let replaced = self.store.replace(&self.temp_id, held).await?;
        self.creations.confirm(&self.temp_id, permanent_id.clone());

        event!(
            Level::DEBUG,
            temp_id = %self.temp_id,
            entity_id = %permanent_id,
            replaced,
            "creation confirmed"
        );
        Ok(())
    }
}

/// Asks the uploader for a blur placeholder, retrying with doubling backoff.
///
/// A missing preview never fails the creation: after the last attempt the
/// entity is created without one.
pub(crate) async fn generate_placeholder_with_retry(
    uploader: &dyn AssetUploader,
    url: &str,
    attempts: u32,
    backoff: Duration,
) -> Option<String> {
    let mut delay = backoff;
    for attempt in 1..=attempts {
        match uploader.generate_placeholder(url).await {
            Ok(preview) => return preview,
            Err(err) if attempt < attempts => {
                event!(Level::WARN, attempt, error = %err, "placeholder generation failed; retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => {
                event!(Level::WARN, attempt, error = %err, "placeholder generation gave up");
            }
        }
    }
    None
}
