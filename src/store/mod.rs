use crate::core::{Entity, EntityId, EntityKind, EntityPatch, Result, SyncError};
use crate::reconcile::{reconcile, sort_by_order};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{Level, event};

/// State guarded by a single lock so every operation is one read-modify-write.
#[derive(Debug, Default)]
struct StoreState {
    entities: Vec<Entity>,
    pending_deletions: HashSet<EntityId>,
    /// Temporary id → permanent id, recorded on replace and dropped once a
    /// snapshot carries the permanent entity or it is gone.
    aliases: HashMap<EntityId, EntityId>,
}

impl StoreState {
    fn position(&self, id: &EntityId) -> Option<usize> {
        self.entities.iter().position(|e| &e.id == id)
    }
}

/// The in-memory list the view renders.
///
/// Task bodies hold a clone of the store and mutate it through these
/// operations; each one acts on the current state at the time it runs, never
/// on a copy captured at submission.
#[derive(Clone)]
pub struct OptimisticStore {
    state: Arc<RwLock<StoreState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            revision: Arc::new(revision),
        }
    }

    /// Creates a store showing `count` skeleton stand-ins.
    pub fn with_skeletons(count: usize, kind: EntityKind, parent_id: &str) -> Self {
        let (revision, _) = watch::channel(0);
        let state = StoreState {
            entities: skeletons(count, kind, parent_id),
            ..StoreState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            revision: Arc::new(revision),
        }
    }

    /// Receiver that changes every time the visible list changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Replaces the visible list with skeleton stand-ins.
    pub async fn seed_skeletons(&self, count: usize, kind: EntityKind, parent_id: &str) {
        let mut state = self.state.write().await;
        state.entities = skeletons(count, kind, parent_id);
        drop(state);
        self.bump();
    }

    pub async fn snapshot(&self) -> Vec<Entity> {
        self.state.read().await.entities.clone()
    }

    pub async fn get(&self, id: &EntityId) -> Option<Entity> {
        let state = self.state.read().await;
        state.entities.iter().find(|e| &e.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entities.is_empty()
    }

    pub async fn pending_deletions(&self) -> HashSet<EntityId> {
        self.state.read().await.pending_deletions.clone()
    }

    /// Order index just past the last real entity.
    pub async fn next_order_index(&self) -> i64 {
        let state = self.state.read().await;
        state
            .entities
            .iter()
            .filter(|e| !e.is_skeleton())
            .map(|e| e.order_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Follows a temporary id to the permanent id it was replaced by.
    pub async fn resolve(&self, id: &EntityId) -> EntityId {
        let state = self.state.read().await;
        state.aliases.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// Temporary ids still mapped to their permanent ids.
    pub async fn alias_count(&self) -> usize {
        self.state.read().await.aliases.len()
    }

    /// Adds a speculative entity.
    ///
    /// The entity is forced optimistic and given a correlation id if it lacks
    /// one. Skeletons are dropped on the first real insert.
    pub async fn insert_speculative(&self, mut entity: Entity) -> Entity {
        entity.is_optimistic = true;
        if entity.correlation_id.is_none() {
            entity.correlation_id = Some(crate::core::CorrelationId::new());
        }

        let mut state = self.state.write().await;
        state.entities.retain(|e| !e.is_skeleton());
        state.entities.push(entity.clone());
        sort_by_order(&mut state.entities);
        drop(state);

        event!(Level::DEBUG, entity_id = %entity.id, "speculative entity inserted");
        self.bump();
        entity
    }

    /// Applies `patch` to the entity currently stored under `id`.
    ///
    /// Returns `Ok(false)` when the entity is gone (removed while a task was
    /// in flight).
    pub async fn patch(&self, id: &EntityId, patch: &EntityPatch) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(pos) = state.position(id) else {
            return Ok(false);
        };
        state.entities[pos].apply(patch);
        if patch.order_index.is_some() {
            sort_by_order(&mut state.entities);
        }
        drop(state);

        self.bump();
        Ok(true)
    }

    /// Applies several patches under one lock, as a single visible change.
    ///
    /// Ids no longer present are skipped. Returns how many were applied.
    pub async fn patch_many(&self, patches: &[(EntityId, EntityPatch)]) -> usize {
        let mut state = self.state.write().await;
        let mut applied = 0;
        for (id, patch) in patches {
            if let Some(pos) = state.position(id) {
                state.entities[pos].apply(patch);
                applied += 1;
            }
        }
        sort_by_order(&mut state.entities);
        drop(state);

        if applied > 0 {
            self.bump();
        }
        applied
    }

    /// Swaps the entity under `id` for `confirmed`.
    ///
    /// Keeps the display slot unless `order_index` changed. When the id
    /// changes, the old one is recorded as an alias of the new one.
    pub async fn replace(&self, id: &EntityId, confirmed: Entity) -> Result<bool> {
        if &confirmed.id != id && !id.is_temporary() {
            return Err(SyncError::Backend(format!(
                "permanent id '{}' cannot change to '{}'",
                id, confirmed.id
            )));
        }

        let mut state = self.state.write().await;
        let new_id = confirmed.id.clone();
        if &new_id != id {
            state.aliases.insert(id.clone(), new_id.clone());
        }
        let Some(pos) = state.position(id) else {
            return Ok(false);
        };
        state.entities[pos] = confirmed;
        // A snapshot may have raced the create response and installed the
        // permanent entity already.
        let mut index = 0;
        state.entities.retain(|e| {
            let keep = index == pos || e.id != new_id;
            index += 1;
            keep
        });
        sort_by_order(&mut state.entities);
        drop(state);

        event!(Level::DEBUG, from = %id, to = %new_id, "entity replaced");
        self.bump();
        Ok(true)
    }

    /// Removes the entity under `id`. Used for delete-time removal and for
    /// rolling back a failed creation.
    pub async fn remove(&self, id: &EntityId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(pos) = state.position(id) else {
            return Ok(false);
        };
        state.entities.remove(pos);
        drop(state);

        self.bump();
        Ok(true)
    }

    /// Removes the entity and tracks `id` until a snapshot stops returning it.
    pub async fn mark_pending_deletion(&self, id: &EntityId) -> bool {
        let mut state = self.state.write().await;
        let removed = match state.position(id) {
            Some(pos) => {
                state.entities.remove(pos);
                true
            }
            None => false,
        };
        if !id.is_temporary() {
            state.pending_deletions.insert(id.clone());
        }
        drop(state);

        self.bump();
        removed
    }

    pub async fn unmark_pending_deletion(&self, id: &EntityId) -> bool {
        self.state.write().await.pending_deletions.remove(id)
    }

    /// Puts an entity back into the list, replacing any entry with its id.
    pub async fn restore(&self, entity: Entity) {
        let mut state = self.state.write().await;
        state.entities.retain(|e| e.id != entity.id);
        state.entities.push(entity);
        sort_by_order(&mut state.entities);
        drop(state);

        self.bump();
    }

    /// Merges an authoritative snapshot into the current state.
    ///
    /// Runs the reconciler and stores its output, the pruned deletion set
    /// and the pruned aliases in one critical section. An alias survives only
    /// while its permanent entity is held locally without being in the
    /// snapshot.
    pub async fn apply_snapshot(&self, authoritative: &[Entity]) -> Vec<Entity> {
        let mut state = self.state.write().await;
        let before = state.pending_deletions.len();
        let StoreState {
            entities,
            pending_deletions,
            aliases,
        } = &mut *state;
        let next = reconcile(authoritative, entities, pending_deletions);
        let pruned = before - pending_deletions.len();

        let aliases_before = aliases.len();
        let snapshot_ids: HashSet<&EntityId> = authoritative.iter().map(|e| &e.id).collect();
        aliases.retain(|_, permanent| {
            !snapshot_ids.contains(permanent) && next.iter().any(|e| &e.id == permanent)
        });
        let forgotten = aliases_before - aliases.len();
        *entities = next.clone();
        drop(state);

        event!(
            Level::DEBUG,
            snapshot_len = authoritative.len(),
            visible = next.len(),
            pruned_deletions = pruned,
            forgotten_aliases = forgotten,
            "snapshot applied"
        );
        self.bump();
        next
    }
}

fn skeletons(count: usize, kind: EntityKind, parent_id: &str) -> Vec<Entity> {
    (0..count)
        .map(|slot| Entity::skeleton(slot, kind, parent_id))
        .collect()
}
