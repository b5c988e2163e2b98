use super::task::QueueTask;
use crate::core::{Lane, TaskId};
use std::collections::VecDeque;

pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) task: QueueTask,
}

/// FIFO of submitted tasks plus the executions currently in flight.
#[derive(Default)]
pub(crate) struct LaneState {
    pub(crate) pending: VecDeque<QueuedTask>,
    pub(crate) active: usize,
    pub(crate) worker_running: bool,
}

impl LaneState {
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active == 0 && !self.worker_running
    }

    /// Pops up to `limit` tasks and counts them as active.
    pub(crate) fn take_batch(&mut self, limit: usize) -> Vec<QueuedTask> {
        let take = limit.min(self.pending.len());
        let batch: Vec<QueuedTask> = self.pending.drain(..take).collect();
        self.active += batch.len();
        batch
    }
}

/// Both lanes and the busy flag, owned together so idleness is decided in
/// one place.
#[derive(Default)]
pub(crate) struct QueueState {
    pub(crate) creation: LaneState,
    pub(crate) mutation: LaneState,
    pub(crate) busy: bool,
    pub(crate) next_task_id: u64,
    pub(crate) idle_transitions: u64,
}

impl QueueState {
    pub(crate) fn lane(&self, lane: Lane) -> &LaneState {
        match lane {
            Lane::Creation => &self.creation,
            Lane::Mutation => &self.mutation,
        }
    }

    pub(crate) fn lane_mut(&mut self, lane: Lane) -> &mut LaneState {
        match lane {
            Lane::Creation => &mut self.creation,
            Lane::Mutation => &mut self.mutation,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.creation.is_idle() && self.mutation.is_idle()
    }

    pub(crate) fn allocate_id(&mut self) -> TaskId {
        self.next_task_id += 1;
        TaskId(self.next_task_id)
    }

    /// Sets the busy flag. Returns `true` on an idle → busy transition.
    pub(crate) fn mark_busy(&mut self) -> bool {
        let was_idle = !self.busy;
        self.busy = true;
        was_idle
    }

    /// Clears the busy flag if both lanes are idle.
    ///
    /// Returns the transition generation exactly once per busy → idle edge.
    pub(crate) fn settle(&mut self) -> Option<u64> {
        if !self.busy || !self.is_idle() {
            return None;
        }
        self.busy = false;
        self.idle_transitions += 1;
        Some(self.idle_transitions)
    }
}
