use super::types::{CorrelationId, EntityId, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A page or a post as seen by the list view.
///
/// Pages and posts are structurally identical here; `kind` and `parent_id`
/// only matter to the storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Missing on rows written before correlation ids existed.
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    pub kind: EntityKind,
    pub parent_id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub asset_url: Option<String>,
    /// Low-resolution blur shown while the full asset loads.
    #[serde(default)]
    pub preview_placeholder: Option<String>,
    pub order_index: i64,
    /// Denormalized number of posts (pages only).
    #[serde(default)]
    pub child_count: u32,
    #[serde(default)]
    pub is_optimistic: bool,
    #[serde(default)]
    pub is_uploading_asset: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Skeleton stand-in rendered before the first snapshot arrives.
    pub fn skeleton(slot: usize, kind: EntityKind, parent_id: impl Into<String>) -> Self {
        Self {
            id: EntityId::skeleton(slot),
            correlation_id: None,
            kind,
            parent_id: parent_id.into(),
            title: String::new(),
            body: None,
            asset_url: None,
            preview_placeholder: None,
            order_index: slot as i64,
            child_count: 0,
            is_optimistic: false,
            is_uploading_asset: false,
            updated_at: None,
        }
    }

    /// Builds the speculative entity for a draft about to be created.
    pub fn speculative(draft: &EntityDraft, order_index: i64, has_asset: bool) -> Self {
        Self {
            id: EntityId::temporary(),
            correlation_id: Some(CorrelationId::new()),
            kind: draft.kind,
            parent_id: draft.parent_id.clone(),
            title: draft.title.clone(),
            body: draft.body.clone(),
            asset_url: None,
            preview_placeholder: None,
            order_index,
            child_count: 0,
            is_optimistic: true,
            is_uploading_asset: has_asset,
            updated_at: None,
        }
    }

    pub fn is_skeleton(&self) -> bool {
        self.id.is_skeleton()
    }

    /// Applies every field set in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: &EntityPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(body) = &patch.body {
            self.body = Some(body.clone());
        }
        if let Some(asset_url) = &patch.asset_url {
            self.asset_url = Some(asset_url.clone());
        }
        if let Some(preview) = &patch.preview_placeholder {
            self.preview_placeholder = Some(preview.clone());
        }
        if let Some(order_index) = patch.order_index {
            self.order_index = order_index;
        }
        if let Some(is_optimistic) = patch.is_optimistic {
            self.is_optimistic = is_optimistic;
        }
        if let Some(is_uploading_asset) = patch.is_uploading_asset {
            self.is_uploading_asset = is_uploading_asset;
        }
    }
}

/// User-supplied fields for a new page or post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub kind: EntityKind,
    pub parent_id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Explicit position; appended after the last entity when absent.
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl EntityDraft {
    pub fn new(kind: EntityKind, parent_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            parent_id: parent_id.into(),
            title: title.into(),
            body: None,
            order_index: None,
        }
    }

    pub fn page(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(EntityKind::Page, owner_id, title)
    }

    pub fn post(page_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(EntityKind::Post, page_id, title)
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn order_index(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }
}

/// Partial update. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub asset_url: Option<String>,
    pub preview_placeholder: Option<String>,
    pub order_index: Option<i64>,
    pub is_optimistic: Option<bool>,
    pub is_uploading_asset: Option<bool>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn asset_url(mut self, url: impl Into<String>) -> Self {
        self.asset_url = Some(url.into());
        self
    }

    pub fn preview_placeholder(mut self, preview: impl Into<String>) -> Self {
        self.preview_placeholder = Some(preview.into());
        self
    }

    pub fn order_index(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }

    pub fn optimistic(mut self, is_optimistic: bool) -> Self {
        self.is_optimistic = Some(is_optimistic);
        self
    }

    pub fn uploading_asset(mut self, is_uploading_asset: bool) -> Self {
        self.is_uploading_asset = Some(is_uploading_asset);
        self
    }

    /// The subset of this patch the storage backend persists.
    ///
    /// Local status flags never leave the client.
    pub fn persisted_fields(&self) -> Self {
        Self {
            is_optimistic: None,
            is_uploading_asset: None,
            ..self.clone()
        }
    }
}

/// Payload for `StorageBackend::create_entity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub correlation_id: CorrelationId,
    pub kind: EntityKind,
    pub parent_id: String,
    pub title: String,
    pub body: Option<String>,
    pub asset_url: Option<String>,
    pub preview_placeholder: Option<String>,
    pub order_index: i64,
}

impl NewEntity {
    /// Builds the create payload from the latest speculative state.
    ///
    /// Returns `None` for entities without a correlation id, which cannot be
    /// matched back after the id swap.
    pub fn from_speculative(entity: &Entity) -> Option<Self> {
        Some(Self {
            correlation_id: entity.correlation_id?,
            kind: entity.kind,
            parent_id: entity.parent_id.clone(),
            title: entity.title.clone(),
            body: entity.body.clone(),
            asset_url: entity.asset_url.clone(),
            preview_placeholder: entity.preview_placeholder.clone(),
            order_index: entity.order_index,
        })
    }
}
