//! Dual-lane task queue.
//!
//! Creation tasks run in batches of up to `creation_concurrency`; the lane
//! waits for the whole batch to settle before pulling the next one. Mutation
//! tasks run one at a time in submission order. A failed task gets its
//! rollback invoked once and is discarded; the lane keeps going.

pub mod config;
mod lane;
pub mod task;

pub use config::{DEFAULT_CREATION_CONCURRENCY, QueueConfig};
pub use task::QueueTask;

use crate::core::{Lane, Result, SyncError, TaskId};
use crate::drain::DrainCoordinator;
use futures::future::join_all;
use lane::{QueueState, QueuedTask};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{Instrument, Level, event, info_span};

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rollback_failures: u64,
    /// Largest creation batch executed so far
    pub peak_creation_in_flight: usize,
    pub idle_transitions: u64,
    pub pending_creations: usize,
    pub pending_mutations: usize,
}

#[derive(Default)]
struct QueueCounters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rollback_failures: AtomicU64,
    peak_creation_in_flight: AtomicUsize,
}

struct QueueShared {
    config: QueueConfig,
    state: Mutex<QueueState>,
    busy: watch::Sender<bool>,
    counters: QueueCounters,
    drain: Option<DrainCoordinator>,
}

impl QueueShared {
    // Critical sections never panic, so a poisoned lock still holds
    // consistent lane state.
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batch_limit(&self, lane: Lane) -> usize {
        match lane {
            Lane::Creation => self.config.creation_concurrency,
            Lane::Mutation => 1,
        }
    }
}

/// Single entry point for remote write operations.
///
/// Cloning is cheap; clones share the same lanes.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    /// Create a queue without a drain hook
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a queue that notifies `drain` on every busy → idle transition
    pub fn with_drain(config: QueueConfig, drain: DrainCoordinator) -> Result<Self> {
        Self::build(config, Some(drain))
    }

    fn build(config: QueueConfig, drain: Option<DrainCoordinator>) -> Result<Self> {
        config.validate().map_err(SyncError::InvalidConfig)?;
        let (busy, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(QueueShared {
                config,
                state: Mutex::new(QueueState::default()),
                busy,
                counters: QueueCounters::default(),
                drain,
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn drain(&self) -> Option<&DrainCoordinator> {
        self.shared.drain.as_ref()
    }

    /// Enqueue `task` on its lane.
    ///
    /// Must be called from within a tokio runtime; the lane worker is spawned
    /// on the current one.
    pub fn submit(&self, task: QueueTask) -> Result<TaskId> {
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let lane = task.lane;
        let label = task.label.clone();

        let (id, spawn_worker) = {
            let mut state = self.shared.lock_state();
            let id = state.allocate_id();
            if state.mark_busy() {
                self.shared.busy.send_replace(true);
            }
            let lane_state = state.lane_mut(lane);
            lane_state.pending.push_back(QueuedTask { id, task });
            let spawn_worker = !lane_state.worker_running;
            lane_state.worker_running = true;
            (id, spawn_worker)
        };
        self.shared.counters.submitted.fetch_add(1, Ordering::SeqCst);
        event!(Level::DEBUG, task_id = %id, lane = %lane, label = %label, "task submitted");

        if spawn_worker {
            handle.spawn(run_lane(Arc::clone(&self.shared), lane));
        }
        Ok(id)
    }

    /// True while either lane has queued or executing work
    pub fn is_busy(&self) -> bool {
        self.shared.lock_state().busy
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.shared.busy.subscribe()
    }

    /// Resolves once both lanes are empty and inactive
    pub async fn wait_idle(&self) {
        let mut busy = self.subscribe_busy();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    pub fn pending(&self, lane: Lane) -> usize {
        self.shared.lock_state().lane(lane).pending.len()
    }

    pub fn stats(&self) -> QueueStats {
        let (idle_transitions, pending_creations, pending_mutations) = {
            let state = self.shared.lock_state();
            (
                state.idle_transitions,
                state.creation.pending.len(),
                state.mutation.pending.len(),
            )
        };
        let counters = &self.shared.counters;
        QueueStats {
            submitted: counters.submitted.load(Ordering::SeqCst),
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            rollback_failures: counters.rollback_failures.load(Ordering::SeqCst),
            peak_creation_in_flight: counters.peak_creation_in_flight.load(Ordering::SeqCst),
            idle_transitions,
            pending_creations,
            pending_mutations,
        }
    }
}

/// Lane worker: pulls batches until the lane is empty, then exits.
///
/// Exactly one worker runs per lane at a time; `submit` spawns a new one
/// when none is running.
async fn run_lane(shared: Arc<QueueShared>, lane: Lane) {
    let limit = shared.batch_limit(lane);
    let mut finished = 0;

    loop {
        let batch = {
            let mut state = shared.lock_state();
            let lane_state = state.lane_mut(lane);
            lane_state.active -= finished;
            let batch = lane_state.take_batch(limit);
            if batch.is_empty() {
                lane_state.worker_running = false;
                let transition = state.settle();
                if transition.is_some() {
                    shared.busy.send_replace(false);
                }
                drop(state);

                if let Some(generation) = transition {
                    event!(Level::DEBUG, lane = %lane, generation, "queue drained");
                    if let Some(drain) = &shared.drain {
                        drain.idle_transition(generation);
                    }
                }
                return;
            }
            batch
        };

        finished = batch.len();
        if lane == Lane::Creation {
            shared
                .counters
                .peak_creation_in_flight
                .fetch_max(finished, Ordering::SeqCst);
        }
        join_all(batch.into_iter().map(|queued| run_task(&shared, lane, queued))).await;
    }
}

/// Executes one task body and, on failure, its rollback.
///
/// Both run as spawned tasks so a panic is observed as a `JoinError` instead
/// of unwinding through the lane worker.
async fn run_task(shared: &QueueShared, lane: Lane, queued: QueuedTask) {
    let QueuedTask { id, task } = queued;
    let QueueTask {
        label,
        execute,
        on_rollback,
        ..
    } = task;
    let span = info_span!("queue.task", task_id = %id, lane = %lane, label = %label);

    let err = match tokio::spawn(execute.instrument(span.clone())).await {
        Ok(Ok(())) => {
            shared.counters.succeeded.fetch_add(1, Ordering::SeqCst);
            event!(parent: &span, Level::DEBUG, "task succeeded");
            return;
        }
        Ok(Err(err)) => err,
        Err(join_err) => SyncError::TaskPanicked(join_err.to_string()),
    };
    shared.counters.failed.fetch_add(1, Ordering::SeqCst);
    event!(parent: &span, Level::WARN, error = %err, "task failed");

    let Some(rollback) = on_rollback else {
        return;
    };
    let rollback_run = tokio::spawn(async move { rollback(err).await }.instrument(span.clone()));
    let failure = match rollback_run.await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(join_err) => Some(join_err.to_string()),
    };
    match failure {
        None => event!(parent: &span, Level::DEBUG, "task rolled back"),
        Some(error) => {
            shared.counters.rollback_failures.fetch_add(1, Ordering::SeqCst);
            event!(parent: &span, Level::ERROR, error = %error, "rollback failed");
        }
    }
}
