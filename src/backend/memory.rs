use super::{AssetUpload, AssetUploader, StorageBackend};
use crate::core::{Entity, EntityId, EntityKind, EntityPatch, NewEntity, Result, SyncError};
use crate::reconcile::sort_by_order;
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const HISTORY_LIMIT: usize = 32;

/// A call received by [`InMemoryBackend`], recorded in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create { title: String },
    Update { id: EntityId },
    Delete { id: EntityId },
    FetchList { parent_id: String },
    Reindex { parent_id: String },
    RefreshCounts { parent_id: String },
}

#[derive(Default)]
struct BackendState {
    rows: Vec<Entity>,
    /// Row sets as they were before each write, oldest first.
    history: VecDeque<Vec<Entity>>,
    next_id: u64,
    latency: Duration,
    stale_reads: usize,
    failing_titles: HashSet<String>,
    failing_ids: HashSet<EntityId>,
    calls: Vec<BackendCall>,
}

impl BackendState {
    fn record_write(&mut self) {
        self.history.push_back(self.rows.clone());
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    fn visible_rows(&self) -> &[Entity] {
        if self.stale_reads == 0 || self.history.len() < self.stale_reads {
            return &self.rows;
        }
        &self.history[self.history.len() - self.stale_reads]
    }
}

/// An in-memory implementation of `StorageBackend` for testing and the
/// simulator.
///
/// Assigns permanent ids of the form `<kind>-<n>` and can simulate latency,
/// rejected writes and stale list reads.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied before every call is served.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Make `fetch_list` answer from the state as it was `writes` writes ago.
    pub async fn set_stale_reads(&self, writes: usize) {
        self.state.lock().await.stale_reads = writes;
    }

    /// Reject creations whose title is `title`.
    pub async fn fail_title(&self, title: impl Into<String>) {
        self.state.lock().await.failing_titles.insert(title.into());
    }

    /// Reject updates and deletes targeting `id`.
    pub async fn fail_mutations_on(&self, id: EntityId) {
        self.state.lock().await.failing_ids.insert(id);
    }

    /// Inserts rows directly, bypassing id assignment.
    pub async fn seed(&self, rows: Vec<Entity>) {
        let mut state = self.state.lock().await;
        for row in rows {
            state.rows.retain(|r| r.id != row.id);
            state.rows.push(row);
        }
        sort_by_order(&mut state.rows);
    }

    pub async fn rows(&self) -> Vec<Entity> {
        self.state.lock().await.rows.clone()
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn create_entity(&self, entity: NewEntity) -> Result<Entity> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Create {
            title: entity.title.clone(),
        });
        if state.failing_titles.contains(&entity.title) {
            return Err(SyncError::Backend(format!(
                "create rejected for '{}'",
                entity.title
            )));
        }

        state.next_id += 1;
        let id = EntityId::new(format!("{}-{}", entity.kind, state.next_id));
        let row = Entity {
            id,
            correlation_id: Some(entity.correlation_id),
            kind: entity.kind,
            parent_id: entity.parent_id,
            title: entity.title,
            body: entity.body,
            asset_url: entity.asset_url,
            preview_placeholder: entity.preview_placeholder,
            order_index: entity.order_index,
            child_count: 0,
            is_optimistic: false,
            is_uploading_asset: false,
            updated_at: Some(Utc::now()),
        };
        state.record_write();
        state.rows.push(row.clone());
        sort_by_order(&mut state.rows);
        debug!("created {} ({})", row.id, row.title);
        Ok(row)
    }

    async fn update_entity(&self, id: &EntityId, patch: EntityPatch) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Update { id: id.clone() });
        if state.failing_ids.contains(id) {
            return Err(SyncError::Backend(format!("update rejected for '{}'", id)));
        }
        let Some(pos) = state.rows.iter().position(|r| &r.id == id) else {
            return Err(SyncError::EntityNotFound(id.clone()));
        };

        state.record_write();
        let row = &mut state.rows[pos];
        row.apply(&patch.persisted_fields());
        row.updated_at = Some(Utc::now());
        sort_by_order(&mut state.rows);
        debug!("updated {}", id);
        Ok(())
    }

    async fn delete_entity(&self, id: &EntityId) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Delete { id: id.clone() });
        if state.failing_ids.contains(id) {
            return Err(SyncError::Backend(format!("delete rejected for '{}'", id)));
        }
        let Some(pos) = state.rows.iter().position(|r| &r.id == id) else {
            return Err(SyncError::EntityNotFound(id.clone()));
        };

        state.record_write();
        state.rows.remove(pos);
        debug!("deleted {}", id);
        Ok(())
    }

    async fn fetch_list(&self, parent_id: &str) -> Result<Vec<Entity>> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::FetchList {
            parent_id: parent_id.to_string(),
        });
        let mut rows: Vec<Entity> = state
            .visible_rows()
            .iter()
            .filter(|r| r.parent_id == parent_id)
            .cloned()
            .collect();
        sort_by_order(&mut rows);
        Ok(rows)
    }

    async fn reindex(&self, parent_id: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Reindex {
            parent_id: parent_id.to_string(),
        });
        state.record_write();
        sort_by_order(&mut state.rows);
        let mut next = 0;
        for row in state.rows.iter_mut().filter(|r| r.parent_id == parent_id) {
            row.order_index = next;
            next += 1;
        }
        Ok(())
    }

    async fn refresh_counts(&self, parent_id: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::RefreshCounts {
            parent_id: parent_id.to_string(),
        });
        let counts: Vec<(EntityId, u32)> = state
            .rows
            .iter()
            .filter(|r| r.kind == EntityKind::Page)
            .filter(|page| page.id.as_str() == parent_id || page.parent_id == parent_id)
            .map(|page| {
                let posts = state
                    .rows
                    .iter()
                    .filter(|r| r.kind == EntityKind::Post && r.parent_id == page.id.as_str())
                    .count();
                (page.id.clone(), posts as u32)
            })
            .collect();
        if counts.is_empty() {
            return Ok(());
        }

        state.record_write();
        for (page_id, count) in counts {
            if let Some(page) = state.rows.iter_mut().find(|r| r.id == page_id) {
                page.child_count = count;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct UploaderState {
    latency: Duration,
    failing_files: HashSet<String>,
    placeholder_failures: u32,
    placeholder_attempts: u32,
    uploads: Vec<String>,
}

/// An in-memory implementation of `AssetUploader`.
///
/// URLs are `https://assets.local/<destination>/<file name>`; placeholders
/// are `blur:<url>`.
#[derive(Clone, Default)]
pub struct InMemoryUploader {
    state: Arc<Mutex<UploaderState>>,
}

impl InMemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Reject uploads of `file_name`.
    pub async fn fail_file(&self, file_name: impl Into<String>) {
        self.state.lock().await.failing_files.insert(file_name.into());
    }

    /// Fail the next `attempts` placeholder generations.
    pub async fn fail_placeholders(&self, attempts: u32) {
        self.state.lock().await.placeholder_failures = attempts;
    }

    pub async fn placeholder_attempts(&self) -> u32 {
        self.state.lock().await.placeholder_attempts
    }

    pub async fn uploads(&self) -> Vec<String> {
        self.state.lock().await.uploads.clone()
    }
}

#[async_trait]
impl AssetUploader for InMemoryUploader {
    async fn upload_asset(&self, asset: AssetUpload, destination: &str) -> Result<String> {
        let latency = self.state.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.failing_files.contains(&asset.file_name) {
            return Err(SyncError::Upload(format!(
                "upload of '{}' rejected",
                asset.file_name
            )));
        }
        let url = format!("https://assets.local/{}/{}", destination, asset.file_name);
        state.uploads.push(url.clone());
        debug!("uploaded {} ({} bytes)", url, asset.bytes.len());
        Ok(url)
    }

    async fn generate_placeholder(&self, url: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        state.placeholder_attempts += 1;
        if state.placeholder_failures > 0 {
            state.placeholder_failures -= 1;
            return Err(SyncError::Placeholder(format!("no preview for '{}'", url)));
        }
        Ok(Some(format!("blur:{}", url)))
    }
}
