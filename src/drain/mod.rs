//! Busy → idle observation and the hook run on each drain.

mod refresh;
mod viewport;

pub use refresh::{BookkeepingRefresh, refresh_preserving_scroll};
pub use viewport::{HeadlessViewport, ScrollViewport};

use crate::core::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, Level, event, info_span};

/// Identifies one busy → idle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainTicket {
    pub generation: u64,
}

/// Caller-supplied action run once per busy → idle transition.
#[async_trait]
pub trait DrainHook: Send + Sync {
    async fn on_idle(&self, ticket: DrainTicket) -> Result<()>;
}

/// Adapter turning an async closure into a [`DrainHook`].
pub struct FnDrainHook<F>(F);

pub fn drain_hook_fn<F, Fut>(hook: F) -> FnDrainHook<F>
where
    F: Fn(DrainTicket) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnDrainHook(hook)
}

#[async_trait]
impl<F, Fut> DrainHook for FnDrainHook<F>
where
    F: Fn(DrainTicket) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_idle(&self, ticket: DrainTicket) -> Result<()> {
        (self.0)(ticket).await
    }
}

/// Drain hook bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStatus {
    /// Busy → idle transitions observed
    pub transitions: u64,
    /// Hook runs finished, successful or not
    pub completed: u64,
    /// Hook runs that returned an error or panicked
    pub failed: u64,
}

struct DrainInner {
    hook: Arc<dyn DrainHook>,
    run_lock: Mutex<()>,
    status: watch::Sender<DrainStatus>,
}

/// Runs the drain hook for every idle transition the queue reports.
///
/// Hook runs are serialized. Errors and panics are logged and counted, never
/// propagated; they do not reopen the queue.
#[derive(Clone)]
pub struct DrainCoordinator {
    inner: Arc<DrainInner>,
}

impl DrainCoordinator {
    pub fn new<H>(hook: H) -> Self
    where
        H: DrainHook + 'static,
    {
        Self::from_arc(Arc::new(hook))
    }

    pub fn from_arc(hook: Arc<dyn DrainHook>) -> Self {
        let (status, _) = watch::channel(DrainStatus::default());
        Self {
            inner: Arc::new(DrainInner {
                hook,
                run_lock: Mutex::new(()),
                status,
            }),
        }
    }

    pub fn status(&self) -> DrainStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DrainStatus> {
        self.inner.status.subscribe()
    }

    /// Resolves once at least `count` hook runs have finished.
    pub async fn wait_for_completed(&self, count: u64) -> DrainStatus {
        let mut status = self.subscribe();
        match status.wait_for(|s| s.completed >= count).await {
            Ok(current) => *current,
            Err(_) => self.status(),
        }
    }

    /// Called by the queue once per transition, after its lock is released.
    /// Spawns the hook run on the current runtime.
    pub(crate) fn idle_transition(&self, generation: u64) {
        self.inner.status.send_modify(|s| s.transitions += 1);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(DrainTicket { generation }).await });
    }
}

impl DrainInner {
    async fn run(self: Arc<Self>, ticket: DrainTicket) {
        let _serialized = self.run_lock.lock().await;
        let span = info_span!("queue.drain", generation = ticket.generation);
        let hook = Arc::clone(&self.hook);

        let outcome = tokio::spawn(async move { hook.on_idle(ticket).await }.instrument(span.clone()))
            .await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(join_err) => Some(join_err.to_string()),
        };

        match &failure {
            None => event!(parent: &span, Level::DEBUG, "drain hook completed"),
            Some(error) => event!(parent: &span, Level::ERROR, error = %error, "drain hook failed"),
        }
        self.status.send_modify(|s| {
            s.completed += 1;
            if failure.is_some() {
                s.failed += 1;
            }
        });
    }
}
