use crate::core::{Lane, Result, SyncError};
use futures::future::BoxFuture;
use std::future::Future;

pub(crate) type RollbackFn = Box<dyn FnOnce(SyncError) -> BoxFuture<'static, Result<()>> + Send>;

/// A unit of remote work submitted to the queue.
///
/// The body is a future that has not been polled yet; the queue polls it at
/// most once. Its effects land on the store directly, the queue only looks
/// at success or failure.
pub struct QueueTask {
    pub(crate) lane: Lane,
    pub(crate) label: String,
    pub(crate) execute: BoxFuture<'static, Result<()>>,
    pub(crate) on_rollback: Option<RollbackFn>,
}

impl QueueTask {
    pub fn new<F>(lane: Lane, label: impl Into<String>, execute: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            lane,
            label: label.into(),
            execute: Box::pin(execute),
            on_rollback: None,
        }
    }

    /// Task routed to the bounded-concurrency creation lane.
    pub fn creation<F>(label: impl Into<String>, execute: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(Lane::Creation, label, execute)
    }

    /// Task routed to the sequential mutation lane.
    pub fn mutation<F>(label: impl Into<String>, execute: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(Lane::Mutation, label, execute)
    }

    /// Compensating action run once if the body fails.
    pub fn on_rollback<R, Fut>(mut self, rollback: R) -> Self
    where
        R: FnOnce(SyncError) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_rollback = Some(Box::new(move |err| Box::pin(rollback(err))));
        self
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for QueueTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTask")
            .field("lane", &self.lane)
            .field("label", &self.label)
            .field("has_rollback", &self.on_rollback.is_some())
            .finish()
    }
}
