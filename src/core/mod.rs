pub mod entity;
pub mod error;
pub mod types;

pub use entity::{Entity, EntityDraft, EntityPatch, NewEntity};
pub use error::{Result, SyncError};
pub use types::{
    CorrelationId, EntityId, EntityKind, Lane, SKELETON_ID_PREFIX, TEMPORARY_ID_PREFIX, TaskId,
};
