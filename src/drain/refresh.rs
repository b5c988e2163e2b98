use super::viewport::ScrollViewport;
use super::{DrainHook, DrainTicket};
use crate::backend::StorageBackend;
use crate::core::{Entity, Result};
use crate::store::OptimisticStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Level, event};

/// Refetches the authoritative list and merges it without losing the
/// scroll position.
///
/// Capture happens before the fetch is requested; restore waits for the
/// view to paint the merged list.
pub async fn refresh_preserving_scroll(
    store: &OptimisticStore,
    backend: &dyn StorageBackend,
    parent_id: &str,
    viewport: &dyn ScrollViewport,
) -> Result<Vec<Entity>> {
    let offset = viewport.capture_offset();
    let authoritative = backend.fetch_list(parent_id).await?;
    let merged = store.apply_snapshot(&authoritative).await;
    viewport.next_paint().await;
    viewport.restore_offset(offset);

    event!(
        Level::DEBUG,
        parent_id = %parent_id,
        visible = merged.len(),
        offset,
        "refreshed with scroll preserved"
    );
    Ok(merged)
}

/// Default drain hook: server-side bookkeeping followed by a refresh.
///
/// Renumbers order indices, recomputes denormalized counts, then refetches
/// the list through [`refresh_preserving_scroll`].
pub struct BookkeepingRefresh {
    store: OptimisticStore,
    backend: Arc<dyn StorageBackend>,
    viewport: Arc<dyn ScrollViewport>,
    parent_id: String,
}

impl BookkeepingRefresh {
    pub fn new(
        store: OptimisticStore,
        backend: Arc<dyn StorageBackend>,
        viewport: Arc<dyn ScrollViewport>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend,
            viewport,
            parent_id: parent_id.into(),
        }
    }
}

#[async_trait]
impl DrainHook for BookkeepingRefresh {
    async fn on_idle(&self, ticket: DrainTicket) -> Result<()> {
        self.backend.reindex(&self.parent_id).await?;
        self.backend.refresh_counts(&self.parent_id).await?;
        refresh_preserving_scroll(
            &self.store,
            self.backend.as_ref(),
            &self.parent_id,
            self.viewport.as_ref(),
        )
        .await?;

        event!(Level::INFO, generation = ticket.generation, parent_id = %self.parent_id, "drain bookkeeping done");
        Ok(())
    }
}
