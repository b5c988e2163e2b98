use super::types::{CorrelationId, EntityId};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Asset upload failed: {0}")]
    Upload(String),

    #[error("Placeholder generation failed: {0}")]
    Placeholder(String),

    #[error("Backend echoed correlation id {actual:?}, expected {expected}")]
    CorrelationMismatch {
        expected: CorrelationId,
        actual: Option<CorrelationId>,
    },

    #[error("Entity '{0}' not found")]
    EntityNotFound(EntityId),

    #[error("Creation of '{0}' did not complete")]
    DependencyFailed(EntityId),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("No tokio runtime available to run queued tasks")]
    NoRuntime,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
