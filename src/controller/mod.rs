//! View-facing facade over the store, the queue and the drain hook for one
//! parent scope (a user's pages, or a page's posts).

pub mod config;
mod creation_task;
mod creations;
pub mod ordering;

pub use config::ControllerConfig;
pub use ordering::{OrderChange, plan_move};

use crate::backend::{AssetUpload, AssetUploader, StorageBackend};
use crate::core::{Entity, EntityDraft, EntityId, EntityKind, EntityPatch, Result, SyncError};
use crate::drain::{
    BookkeepingRefresh, DrainCoordinator, DrainHook, DrainTicket, HeadlessViewport, ScrollViewport,
};
use crate::queue::{QueueStats, QueueTask, TaskQueue};
use crate::store::OptimisticStore;
use async_trait::async_trait;
use creation_task::CreationTask;
use creations::{CreationDependency, CreationRegistry};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Level, event};

/// User-facing outcome of background work.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// A queued task failed and its optimistic effect was reverted.
    TaskFailed { label: String, error: String },
    /// The queue drained and the drain hook finished.
    Drained { generation: u64 },
}

/// Emits `SyncNotice::Drained` after the wrapped hook succeeds.
struct NotifyingHook {
    inner: Arc<dyn DrainHook>,
    notices: broadcast::Sender<SyncNotice>,
}

#[async_trait]
impl DrainHook for NotifyingHook {
    async fn on_idle(&self, ticket: DrainTicket) -> Result<()> {
        self.inner.on_idle(ticket).await?;
        let _ = self.notices.send(SyncNotice::Drained {
            generation: ticket.generation,
        });
        Ok(())
    }
}

pub struct ControllerBuilder {
    parent_id: String,
    kind: EntityKind,
    backend: Arc<dyn StorageBackend>,
    uploader: Arc<dyn AssetUploader>,
    config: ControllerConfig,
    viewport: Arc<dyn ScrollViewport>,
    drain_hook: Option<Arc<dyn DrainHook>>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Scroll surface used by the default drain refresh.
    pub fn viewport(mut self, viewport: Arc<dyn ScrollViewport>) -> Self {
        self.viewport = viewport;
        self
    }

    /// Replaces the default bookkeeping refresh run on each drain.
    pub fn drain_hook(mut self, hook: Arc<dyn DrainHook>) -> Self {
        self.drain_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<EntityListController> {
        self.config.validate().map_err(SyncError::InvalidConfig)?;

        let store =
            OptimisticStore::with_skeletons(self.config.skeleton_count, self.kind, &self.parent_id);
        let (notices, _) = broadcast::channel(self.config.notice_capacity);
        let hook: Arc<dyn DrainHook> = match self.drain_hook {
            Some(hook) => hook,
            None => Arc::new(BookkeepingRefresh::new(
                store.clone(),
                Arc::clone(&self.backend),
                Arc::clone(&self.viewport),
                self.parent_id.clone(),
            )),
        };
        let drain = DrainCoordinator::new(NotifyingHook {
            inner: hook,
            notices: notices.clone(),
        });
        let queue = TaskQueue::with_drain(self.config.queue.clone(), drain)?;

        Ok(EntityListController {
            parent_id: self.parent_id,
            kind: self.kind,
            config: self.config,
            store,
            queue,
            backend: self.backend,
            uploader: self.uploader,
            creations: CreationRegistry::default(),
            notices,
        })
    }
}

/// Optimistic list of pages or posts under one parent.
///
/// Every operation updates the store immediately and queues the remote
/// write. Creations go to the creation lane; edits, deletes and moves go to
/// the mutation lane. A mutation on an entity whose creation is still in
/// flight waits for the permanent id before it is sent.
///
/// # Examples
///
/// ```
/// use rustmemoqueue::{EntityDraft, EntityKind, EntityListController, InMemoryBackend, InMemoryUploader};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rustmemoqueue::SyncError> {
/// let controller = EntityListController::builder(
///     "user-1",
///     EntityKind::Page,
///     Arc::new(InMemoryBackend::new()),
///     Arc::new(InMemoryUploader::new()),
/// )
/// .build()?;
///
/// controller.load().await?;
/// let temp_id = controller.create(EntityDraft::page("user-1", "Travel"), None).await?;
/// assert!(temp_id.is_temporary());
///
/// controller.settle().await;
/// let pages = controller.entities().await;
/// assert_eq!(pages.len(), 1);
/// assert!(!pages[0].id.is_temporary());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EntityListController {
    parent_id: String,
    kind: EntityKind,
    config: ControllerConfig,
    store: OptimisticStore,
    queue: TaskQueue,
    backend: Arc<dyn StorageBackend>,
    uploader: Arc<dyn AssetUploader>,
    creations: CreationRegistry,
    notices: broadcast::Sender<SyncNotice>,
}

impl EntityListController {
    pub fn builder(
        parent_id: impl Into<String>,
        kind: EntityKind,
        backend: Arc<dyn StorageBackend>,
        uploader: Arc<dyn AssetUploader>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            parent_id: parent_id.into(),
            kind,
            backend,
            uploader,
            config: ControllerConfig::default(),
            viewport: Arc::new(HeadlessViewport),
            drain_hook: None,
        }
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Creations submitted but not yet confirmed, failed or abandoned.
    pub fn tracked_creations(&self) -> usize {
        self.creations.len()
    }

    pub async fn entities(&self) -> Vec<Entity> {
        self.store.snapshot().await
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Ties a mutation to the creation behind `id`. A temporary id whose
    /// creation already confirmed is followed to its permanent id.
    async fn dependency(&self, id: &EntityId) -> CreationDependency {
        let dependency = self.creations.depend_on(id);
        if dependency.is_detached() {
            return self.creations.depend_on(&self.store.resolve(id).await);
        }
        dependency
    }

    fn notify_failure(notices: &broadcast::Sender<SyncNotice>, label: String, err: &SyncError) {
        let _ = notices.send(SyncNotice::TaskFailed {
            label,
            error: err.to_string(),
        });
    }

    /// Cold-start load: the first snapshot replaces the skeleton stand-ins.
    pub async fn load(&self) -> Result<Vec<Entity>> {
        let entities = self.refresh().await?;
        event!(
            Level::INFO,
            parent_id = %self.parent_id,
            kind = %self.kind,
            loaded = entities.len(),
            "list loaded"
        );
        Ok(entities)
    }

    /// Fetches the authoritative list and merges it into the store.
    pub async fn refresh(&self) -> Result<Vec<Entity>> {
        let authoritative = self.backend.fetch_list(&self.parent_id).await?;
        Ok(self.store.apply_snapshot(&authoritative).await)
    }

    /// Waits until both lanes are idle and the drain hook for that
    /// transition has finished.
    pub async fn settle(&self) {
        self.queue.wait_idle().await;
        let transitions = self.queue.stats().idle_transitions;
        if let Some(drain) = self.queue.drain() {
            drain.wait_for_completed(transitions).await;
        }
    }

    /// Shows `draft` immediately and queues its creation.
    ///
    /// Returns the temporary id; it can be used for further edits, deletes
    /// and moves right away.
    pub async fn create(&self, draft: EntityDraft, asset: Option<AssetUpload>) -> Result<EntityId> {
        let order_index = match draft.order_index {
            Some(order_index) => order_index,
            None => self.store.next_order_index().await,
        };
        let speculative = Entity::speculative(&draft, order_index, asset.is_some());
        let temp_id = self.store.insert_speculative(speculative).await.id;
        self.creations.register(&temp_id);

        let label = format!("create {} '{}'", draft.kind, draft.title);
        let body = CreationTask {
            temp_id: temp_id.clone(),
            asset,
            store: self.store.clone(),
            backend: Arc::clone(&self.backend),
            uploader: Arc::clone(&self.uploader),
            creations: self.creations.clone(),
            asset_destination: self.config.asset_destination.clone(),
            placeholder_attempts: self.config.placeholder_attempts,
            placeholder_backoff: self.config.placeholder_backoff(),
        };

        let rollback = {
            let store = self.store.clone();
            let creations = self.creations.clone();
            let notices = self.notices.clone();
            let temp_id = temp_id.clone();
            let label = label.clone();
            move |err: SyncError| async move {
                creations.fail(&temp_id);
                store.remove(&temp_id).await?;
                Self::notify_failure(&notices, label, &err);
                Ok::<(), SyncError>(())
            }
        };

        let task = QueueTask::creation(label, body.run()).on_rollback(rollback);
        if let Err(err) = self.queue.submit(task) {
            self.creations.fail(&temp_id);
            self.store.remove(&temp_id).await?;
            return Err(err);
        }
        Ok(temp_id)
    }

    /// Applies `patch` immediately and queues the remote update.
    pub async fn update(&self, id: &EntityId, patch: EntityPatch) -> Result<()> {
        let dependency = self.dependency(id).await;
        let id = &dependency.current_id();
        let previous = self
            .store
            .get(id)
            .await
            .ok_or_else(|| SyncError::EntityNotFound(id.clone()))?;
        self.store
            .patch(id, &patch.clone().optimistic(true))
            .await?;

        let label = format!("update '{}'", id);
        let execute = {
            let store = self.store.clone();
            let backend = Arc::clone(&self.backend);
            let dependency = dependency.clone();
            let persisted = patch.persisted_fields();
            // A confirmed entity stays held until a snapshot carries it.
            let was_optimistic = previous.is_optimistic;
            async move {
                let Some(target) = dependency.resolve().await? else {
                    return Ok(());
                };
                backend.update_entity(&target, persisted.clone()).await?;
                // Re-applied because a creation confirmed meanwhile swaps in
                // the fields it sent.
                store
                    .patch(&target, &persisted.optimistic(was_optimistic))
                    .await?;
                Ok::<(), SyncError>(())
            }
        };

        let rollback = {
            let store = self.store.clone();
            let notices = self.notices.clone();
            let label = label.clone();
            move |err: SyncError| async move {
                let current_id = dependency.current_id();
                if let Some(current) = store.get(&current_id).await {
                    store.restore(reverted(current, &previous)).await;
                }
                Self::notify_failure(&notices, label, &err);
                Ok::<(), SyncError>(())
            }
        };

        self.queue
            .submit(QueueTask::mutation(label, execute).on_rollback(rollback))?;
        Ok(())
    }

    /// Removes the entity immediately and queues the remote delete.
    ///
    /// The id stays in the pending-deletion set until a snapshot no longer
    /// returns it.
    pub async fn delete(&self, id: &EntityId) -> Result<()> {
        let dependency = self.dependency(id).await;
        let id = &dependency.current_id();
        let previous = self
            .store
            .get(id)
            .await
            .ok_or_else(|| SyncError::EntityNotFound(id.clone()))?;
        self.store.mark_pending_deletion(id).await;

        let label = format!("delete '{}'", id);
        let execute = {
            let store = self.store.clone();
            let backend = Arc::clone(&self.backend);
            let dependency = dependency.clone();
            let id = id.clone();
            async move {
                let Some(target) = dependency.resolve().await? else {
                    return Ok(());
                };
                if target != id {
                    // The confirmed entity may have been installed by
                    // replace or by a snapshot in the meantime.
                    store.mark_pending_deletion(&target).await;
                }
                match backend.delete_entity(&target).await {
                    Err(SyncError::EntityNotFound(_)) => Ok(()),
                    other => other,
                }
            }
        };

        let rollback = {
            let store = self.store.clone();
            let notices = self.notices.clone();
            let label = label.clone();
            move |err: SyncError| async move {
                let current_id = dependency.current_id();
                store.unmark_pending_deletion(&current_id).await;
                store.unmark_pending_deletion(&previous.id).await;
                // A failed creation already removed the entity.
                if !matches!(err, SyncError::DependencyFailed(_)) {
                    let mut restored = previous;
                    restored.id = current_id;
                    store.restore(restored).await;
                }
                Self::notify_failure(&notices, label, &err);
                Ok::<(), SyncError>(())
            }
        };

        self.queue
            .submit(QueueTask::mutation(label, execute).on_rollback(rollback))?;
        Ok(())
    }

    /// Moves the entity to display `position` and queues the order writes.
    ///
    /// The new indices are computed from the list as it is now; the mutation
    /// lane keeps later moves from running against indices this one has not
    /// written yet.
    pub async fn move_to(&self, id: &EntityId, position: usize) -> Result<()> {
        let id = &self.store.resolve(id).await;
        let current = self.store.snapshot().await;
        let changes =
            plan_move(&current, id, position).ok_or_else(|| SyncError::EntityNotFound(id.clone()))?;
        if changes.is_empty() {
            return Ok(());
        }
        let mut dependencies = Vec::with_capacity(changes.len());
        for change in &changes {
            dependencies.push(self.dependency(&change.id).await);
        }

        let optimistic: Vec<(EntityId, EntityPatch)> = changes
            .iter()
            .zip(&dependencies)
            .map(|(c, d)| (d.current_id(), EntityPatch::new().order_index(c.to).optimistic(true)))
            .collect();
        self.store.patch_many(&optimistic).await;

        let label = format!("move '{}' to {}", id, position);
        let execute = {
            let store = self.store.clone();
            let backend = Arc::clone(&self.backend);
            let changes = changes.clone();
            let dependencies = dependencies.clone();
            async move {
                let mut settled = Vec::with_capacity(changes.len());
                for (change, dependency) in changes.iter().zip(&dependencies) {
                    let Some(target) = dependency.resolve().await? else {
                        continue;
                    };
                    backend
                        .update_entity(&target, EntityPatch::new().order_index(change.to))
                        .await?;
                    settled.push((
                        target,
                        EntityPatch::new()
                            .order_index(change.to)
                            .optimistic(change.was_optimistic),
                    ));
                }
                store.patch_many(&settled).await;
                Ok::<(), SyncError>(())
            }
        };

        let rollback = {
            let store = self.store.clone();
            let notices = self.notices.clone();
            let label = label.clone();
            move |err: SyncError| async move {
                let mut reverts = Vec::with_capacity(changes.len());
                for (change, dependency) in changes.iter().zip(&dependencies) {
                    reverts.push((
                        dependency.current_id(),
                        EntityPatch::new()
                            .order_index(change.from)
                            .optimistic(change.was_optimistic),
                    ));
                }
                store.patch_many(&reverts).await;
                Self::notify_failure(&notices, label, &err);
                Ok::<(), SyncError>(())
            }
        };

        self.queue
            .submit(QueueTask::mutation(label, execute).on_rollback(rollback))?;
        event!(Level::DEBUG, entity_id = %id, position, "move queued");
        Ok(())
    }
}

/// `current` with its user-editable fields put back to `previous`.
fn reverted(current: Entity, previous: &Entity) -> Entity {
    Entity {
        id: current.id,
        correlation_id: current.correlation_id,
        child_count: current.child_count,
        is_uploading_asset: current.is_uploading_asset,
        updated_at: current.updated_at,
        ..previous.clone()
    }
}
