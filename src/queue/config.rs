use serde::{Deserialize, Serialize};

pub const DEFAULT_CREATION_CONCURRENCY: usize = 3;

/// Task queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of creation tasks executing at once (batch size)
    pub creation_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            creation_concurrency: DEFAULT_CREATION_CONCURRENCY,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the creation lane batch size
    pub fn creation_concurrency(mut self, limit: usize) -> Self {
        self.creation_concurrency = limit;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.creation_concurrency == 0 {
            return Err("creation_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}
