//! Contracts of the remote collaborators the queue's task bodies call.

pub mod memory;

pub use memory::{InMemoryBackend, InMemoryUploader};

use crate::core::{Entity, EntityId, EntityPatch, NewEntity, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Remote store of pages and posts.
///
/// Assigns permanent ids and is eventually consistent: a list fetched right
/// after a write may miss it or return it stale.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persists a new entity. The returned entity must echo
    /// `entity.correlation_id`.
    async fn create_entity(&self, entity: NewEntity) -> Result<Entity>;

    async fn update_entity(&self, id: &EntityId, patch: EntityPatch) -> Result<()>;

    async fn delete_entity(&self, id: &EntityId) -> Result<()>;

    /// Authoritative list of the entities under `parent_id`.
    async fn fetch_list(&self, parent_id: &str) -> Result<Vec<Entity>>;

    /// Renumbers order indices under `parent_id` to remove gaps.
    async fn reindex(&self, _parent_id: &str) -> Result<()> {
        Ok(())
    }

    /// Recomputes denormalized counts for `parent_id`.
    async fn refresh_counts(&self, _parent_id: &str) -> Result<()> {
        Ok(())
    }
}

/// A file picked by the user, attached to a creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AssetUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// File upload and preview generation. Both may be slow and fail
/// independently of the database write.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Uploads the file and returns its public URL.
    async fn upload_asset(&self, asset: AssetUpload, destination: &str) -> Result<String>;

    /// Builds a blur placeholder for `url`, if the asset supports one.
    async fn generate_placeholder(&self, url: &str) -> Result<Option<String>>;
}
