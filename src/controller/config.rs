use crate::core::{Result, SyncError};
use crate::queue::QueueConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// List controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Task queue settings
    pub queue: QueueConfig,

    /// Skeleton stand-ins shown before the first snapshot
    pub skeleton_count: usize,

    /// Placeholder generation attempts before giving up on a preview
    pub placeholder_attempts: u32,

    /// Delay before the first placeholder retry, doubled on each retry
    pub placeholder_backoff_ms: u64,

    /// Upload destination passed to the asset uploader
    pub asset_destination: String,

    /// Buffered notices per subscriber
    pub notice_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            skeleton_count: 6,
            placeholder_attempts: 3,
            placeholder_backoff_ms: 200,
            asset_destination: "uploads".to_string(),
            notice_capacity: 64,
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON document; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate().map_err(SyncError::InvalidConfig)?;
        Ok(config)
    }

    /// Set creation lane concurrency
    pub fn creation_concurrency(mut self, limit: usize) -> Self {
        self.queue.creation_concurrency = limit;
        self
    }

    /// Set number of skeleton stand-ins
    pub fn skeleton_count(mut self, count: usize) -> Self {
        self.skeleton_count = count;
        self
    }

    /// Set placeholder retry policy
    pub fn placeholder_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.placeholder_attempts = attempts;
        self.placeholder_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set upload destination
    pub fn asset_destination(mut self, destination: &str) -> Self {
        self.asset_destination = destination.to_string();
        self
    }

    pub fn placeholder_backoff(&self) -> Duration {
        Duration::from_millis(self.placeholder_backoff_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.queue.validate()?;

        if self.placeholder_attempts == 0 {
            return Err("placeholder_attempts must be at least 1".to_string());
        }

        if self.asset_destination.trim().is_empty() {
            return Err("asset_destination cannot be empty".to_string());
        }

        if self.notice_capacity == 0 {
            return Err("notice_capacity must be at least 1".to_string());
        }

        Ok(())
    }
}
