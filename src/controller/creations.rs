use crate::core::{EntityId, Result, SyncError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CreationState {
    InFlight,
    Confirmed(EntityId),
    /// The speculative entity was removed locally before the write went out.
    Abandoned,
    Failed,
}

/// Creations still in flight, keyed by temporary id.
///
/// An entry only lives until its creation settles. Mutations queued against
/// a temporary id take a [`CreationDependency`] at submission, which keeps
/// its own receiver and so still sees the outcome after the entry is gone.
#[derive(Clone, Default)]
pub(crate) struct CreationRegistry {
    creations: Arc<Mutex<HashMap<EntityId, watch::Sender<CreationState>>>>,
}

impl CreationRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, watch::Sender<CreationState>>> {
        self.creations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, temp_id: &EntityId) {
        let (tx, _) = watch::channel(CreationState::InFlight);
        self.lock().insert(temp_id.clone(), tx);
    }

    fn settle(&self, temp_id: &EntityId, state: CreationState) {
        if let Some(tx) = self.lock().remove(temp_id) {
            tx.send_replace(state);
        }
    }

    pub(crate) fn confirm(&self, temp_id: &EntityId, permanent_id: EntityId) {
        self.settle(temp_id, CreationState::Confirmed(permanent_id));
    }

    pub(crate) fn abandon(&self, temp_id: &EntityId) {
        self.settle(temp_id, CreationState::Abandoned);
    }

    pub(crate) fn fail(&self, temp_id: &EntityId) {
        self.settle(temp_id, CreationState::Failed);
    }

    /// Number of creations that have not settled yet.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Ties a mutation to the creation behind `id`, if it is still in flight.
    pub(crate) fn depend_on(&self, id: &EntityId) -> CreationDependency {
        let outcome = if id.is_temporary() {
            self.lock().get(id).map(watch::Sender::subscribe)
        } else {
            None
        };
        CreationDependency {
            id: id.clone(),
            outcome,
        }
    }
}

/// What a queued mutation knows about the creation of its target.
#[derive(Debug, Clone)]
pub(crate) struct CreationDependency {
    id: EntityId,
    outcome: Option<watch::Receiver<CreationState>>,
}

impl CreationDependency {
    /// A temporary id whose creation had already settled when the
    /// dependency was taken.
    pub(crate) fn is_detached(&self) -> bool {
        self.id.is_temporary() && self.outcome.is_none()
    }

    /// The id the entity is currently stored under.
    pub(crate) fn current_id(&self) -> EntityId {
        match self.outcome.as_ref().map(|rx| (*rx.borrow()).clone()) {
            Some(CreationState::Confirmed(permanent)) => permanent,
            _ => self.id.clone(),
        }
    }

    /// Resolves to the id the backend knows.
    ///
    /// Permanent ids resolve immediately. A temporary id waits for its
    /// creation: `Some(permanent)` once confirmed, `None` if the creation was
    /// abandoned, `DependencyFailed` if it failed or was never tracked.
    pub(crate) async fn resolve(&self) -> Result<Option<EntityId>> {
        if !self.id.is_temporary() {
            return Ok(Some(self.id.clone()));
        }
        let Some(mut rx) = self.outcome.clone() else {
            return Err(SyncError::DependencyFailed(self.id.clone()));
        };

        let state = match rx.wait_for(|s| *s != CreationState::InFlight).await {
            Ok(state) => state.clone(),
            Err(_) => CreationState::Failed,
        };
        match state {
            CreationState::Confirmed(permanent) => Ok(Some(permanent)),
            CreationState::Abandoned => Ok(None),
            CreationState::InFlight | CreationState::Failed => {
                Err(SyncError::DependencyFailed(self.id.clone()))
            }
        }
    }
}
