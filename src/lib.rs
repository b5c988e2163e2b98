// ============================================================================
// RustMemoQueue Library
// ============================================================================

pub mod backend;
pub mod controller;
pub mod core;
pub mod drain;
pub mod queue;
pub mod reconcile;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{
    CorrelationId, Entity, EntityDraft, EntityId, EntityKind, EntityPatch, Lane, NewEntity,
    Result, SyncError, TaskId,
};
pub use reconcile::{is_placeholder_only, reconcile};
pub use store::OptimisticStore;

// Re-export queue and drain API
pub use drain::{
    BookkeepingRefresh, DrainCoordinator, DrainHook, DrainStatus, DrainTicket, FnDrainHook,
    HeadlessViewport, ScrollViewport, drain_hook_fn, refresh_preserving_scroll,
};
pub use queue::{QueueConfig, QueueStats, QueueTask, TaskQueue};

// Re-export collaborators
pub use backend::{
    AssetUpload, AssetUploader, InMemoryBackend, InMemoryUploader, StorageBackend,
    memory::BackendCall,
};

// ============================================================================
// High-level list API
// ============================================================================

pub use controller::{
    ControllerBuilder, ControllerConfig, EntityListController, OrderChange, SyncNotice, plan_move,
};
