/// List controller tests
///
/// End-to-end flows against the in-memory backend and uploader:
/// speculative creation, dependent edits, deletes against stale reads and
/// reordering.

use rustmemoqueue::{
    AssetUpload, BackendCall, ControllerConfig, DrainHook, DrainTicket, Entity, EntityDraft,
    EntityId, EntityKind, EntityListController, EntityPatch, InMemoryBackend, InMemoryUploader,
    SyncError, SyncNotice, drain_hook_fn,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

const OWNER: &str = "user-1";

struct Harness {
    controller: EntityListController,
    backend: InMemoryBackend,
    uploader: InMemoryUploader,
}

fn harness(config: ControllerConfig) -> Harness {
    build(config, None)
}

/// Controller whose drain hook does nothing, so list reads happen only when
/// a test asks for them.
fn harness_without_refresh(config: ControllerConfig) -> Harness {
    let hook: Arc<dyn DrainHook> = Arc::new(drain_hook_fn(|_ticket: DrainTicket| async { Ok(()) }));
    build(config, Some(hook))
}

fn build(config: ControllerConfig, hook: Option<Arc<dyn DrainHook>>) -> Harness {
    let backend = InMemoryBackend::new();
    let uploader = InMemoryUploader::new();
    let mut builder = EntityListController::builder(
        OWNER,
        EntityKind::Page,
        Arc::new(backend.clone()),
        Arc::new(uploader.clone()),
    )
    .config(config);
    if let Some(hook) = hook {
        builder = builder.drain_hook(hook);
    }
    Harness {
        controller: builder.build().unwrap(),
        backend,
        uploader,
    }
}

fn seeded(id: &str, title: &str, order_index: i64) -> Entity {
    let mut entity = Entity::speculative(&EntityDraft::page(OWNER, title), order_index, false);
    entity.id = EntityId::new(id);
    entity.is_optimistic = false;
    entity
}

fn ids(entities: &[Entity]) -> Vec<&str> {
    entities.iter().map(|e| e.id.as_str()).collect()
}

fn drain_notices(rx: &mut broadcast::Receiver<SyncNotice>) -> Vec<SyncNotice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

fn failures(notices: &[SyncNotice]) -> Vec<(String, String)> {
    notices
        .iter()
        .filter_map(|n| match n {
            SyncNotice::TaskFailed { label, error } => Some((label.clone(), error.clone())),
            SyncNotice::Drained { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn load_replaces_skeletons() {
    let h = harness(ControllerConfig::new().skeleton_count(4));
    assert_eq!(h.controller.entities().await.len(), 4);

    h.backend
        .seed(vec![seeded("page-20", "Second", 1), seeded("page-10", "First", 0)])
        .await;
    let loaded = h.controller.load().await.unwrap();

    assert_eq!(ids(&loaded), vec!["page-10", "page-20"]);
    assert!(loaded.iter().all(|e| !e.is_skeleton()));
}

#[tokio::test]
async fn load_of_empty_list_clears_skeletons() {
    let h = harness(ControllerConfig::default());
    let loaded = h.controller.load().await.unwrap();
    assert!(loaded.is_empty());
}

#[tokio::test(start_paused = true)]
async fn creation_with_asset_shows_progress_and_confirms_once() {
    let config = ControllerConfig::new().placeholder_retry(3, Duration::from_millis(5));
    let h = harness(config);
    h.controller.load().await.unwrap();
    h.uploader.set_latency(Duration::from_millis(10)).await;
    h.uploader.fail_placeholders(2).await;

    let asset = AssetUpload::new("cover.jpg", "image/jpeg", vec![1u8; 64]);
    let temp_id = h
        .controller
        .create(EntityDraft::page(OWNER, "Travel"), Some(asset))
        .await
        .unwrap();

    let speculative = h.controller.store().get(&temp_id).await.unwrap();
    assert!(speculative.is_optimistic);
    assert!(speculative.is_uploading_asset);
    assert!(speculative.asset_url.is_none());

    sleep(Duration::from_millis(12)).await;
    let uploaded = h.controller.store().get(&temp_id).await.unwrap();
    assert_eq!(
        uploaded.asset_url.as_deref(),
        Some("https://assets.local/uploads/cover.jpg")
    );
    assert!(!uploaded.is_uploading_asset);
    assert!(uploaded.preview_placeholder.is_none());

    h.controller.settle().await;

    let entities = h.controller.entities().await;
    assert_eq!(entities.len(), 1);
    let page = &entities[0];
    assert_eq!(page.id.as_str(), "page-1");
    assert!(!page.is_optimistic);
    assert_eq!(page.correlation_id, speculative.correlation_id);
    assert_eq!(
        page.preview_placeholder.as_deref(),
        Some("blur:https://assets.local/uploads/cover.jpg")
    );
    assert_eq!(h.uploader.placeholder_attempts().await, 3);
    assert!(h.controller.store().get(&temp_id).await.is_none());
    assert_eq!(h.controller.tracked_creations(), 0);
}

#[tokio::test(start_paused = true)]
async fn placeholder_failure_does_not_fail_creation() {
    let config = ControllerConfig::new().placeholder_retry(2, Duration::from_millis(5));
    let h = harness(config);
    h.controller.load().await.unwrap();
    h.uploader.fail_placeholders(5).await;

    let asset = AssetUpload::new("scan.png", "image/png", vec![0u8; 8]);
    h.controller
        .create(EntityDraft::page(OWNER, "Receipts"), Some(asset))
        .await
        .unwrap();
    h.controller.settle().await;

    let entities = h.controller.entities().await;
    assert_eq!(entities.len(), 1);
    assert!(entities[0].asset_url.is_some());
    assert!(entities[0].preview_placeholder.is_none());
    assert_eq!(h.controller.stats().failed, 0);
    assert_eq!(h.uploader.placeholder_attempts().await, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_upload_removes_the_speculative_entity() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.uploader.fail_file("huge.mov").await;
    let mut notices = h.controller.subscribe_notices();

    let asset = AssetUpload::new("huge.mov", "video/quicktime", vec![0u8; 16]);
    h.controller
        .create(EntityDraft::page(OWNER, "Video"), Some(asset))
        .await
        .unwrap();
    h.controller.settle().await;

    assert!(h.controller.entities().await.is_empty());
    assert!(h.backend.rows().await.is_empty());
    let failed = failures(&drain_notices(&mut notices));
    assert_eq!(failed.len(), 1);
    assert!(failed[0].1.contains("huge.mov"));
}

#[tokio::test(start_paused = true)]
async fn failed_creation_is_reverted_and_reported() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(10)).await;
    h.backend.fail_title("Broken").await;
    let mut notices = h.controller.subscribe_notices();

    let good = h
        .controller
        .create(EntityDraft::page(OWNER, "Good"), None)
        .await
        .unwrap();
    let broken = h
        .controller
        .create(EntityDraft::page(OWNER, "Broken"), None)
        .await
        .unwrap();
    assert_eq!(h.controller.entities().await.len(), 2);

    h.controller.settle().await;

    let entities = h.controller.entities().await;
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].title, "Good");
    assert!(!entities[0].id.is_temporary());
    assert!(h.controller.store().get(&broken).await.is_none());
    assert!(h.controller.store().get(&good).await.is_none());

    let notices = drain_notices(&mut notices);
    let failed = failures(&notices);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "create page 'Broken'");
    assert!(failed[0].1.contains("create rejected"));
    assert!(notices.contains(&SyncNotice::Drained { generation: 1 }));
}

#[tokio::test(start_paused = true)]
async fn creations_respect_concurrency_limit() {
    let h = harness(ControllerConfig::new().creation_concurrency(2));
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(10)).await;

    for n in 0..5 {
        h.controller
            .create(EntityDraft::page(OWNER, format!("Page {}", n)), None)
            .await
            .unwrap();
    }
    h.controller.settle().await;

    let stats = h.controller.stats();
    assert_eq!(stats.peak_creation_in_flight, 2);
    assert_eq!(stats.succeeded, 5);

    let entities = h.controller.entities().await;
    let titles: Vec<&str> = entities.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Page 0", "Page 1", "Page 2", "Page 3", "Page 4"]);
    assert!(entities.iter().all(|e| !e.is_optimistic && !e.id.is_temporary()));
}

#[tokio::test(start_paused = true)]
async fn edit_on_temporary_id_targets_the_permanent_id() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(20)).await;

    let temp_id = h
        .controller
        .create(EntityDraft::page(OWNER, "Draft"), None)
        .await
        .unwrap();
    h.controller
        .update(&temp_id, EntityPatch::new().title("Final"))
        .await
        .unwrap();
    assert_eq!(h.controller.store().get(&temp_id).await.unwrap().title, "Final");

    h.controller.settle().await;

    let calls = h.backend.calls().await;
    let created = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Create { .. }))
        .unwrap();
    let updated = calls
        .iter()
        .position(|c| c == &BackendCall::Update { id: EntityId::new("page-1") })
        .unwrap();
    assert!(created < updated);
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::Update { id } if id.is_temporary())));

    let rows = h.backend.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Final");
    let entities = h.controller.entities().await;
    assert_eq!(ids(&entities), vec!["page-1"]);
    assert_eq!(entities[0].title, "Final");
}

#[tokio::test(start_paused = true)]
async fn delete_before_write_skips_the_backend() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.uploader.set_latency(Duration::from_millis(50)).await;

    let asset = AssetUpload::new("photo.jpg", "image/jpeg", vec![0u8; 4]);
    let temp_id = h
        .controller
        .create(EntityDraft::page(OWNER, "Ephemeral"), Some(asset))
        .await
        .unwrap();
    h.controller.delete(&temp_id).await.unwrap();
    assert!(h.controller.entities().await.is_empty());

    h.controller.settle().await;

    let calls = h.backend.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::Create { .. })));
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::Delete { .. })));
    assert!(h.controller.entities().await.is_empty());
    assert_eq!(h.controller.stats().failed, 0);
}

#[tokio::test(start_paused = true)]
async fn delete_during_write_deletes_the_permanent_id() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(20)).await;

    let temp_id = h
        .controller
        .create(EntityDraft::page(OWNER, "Short lived"), None)
        .await
        .unwrap();
    sleep(Duration::from_millis(5)).await;
    h.controller.delete(&temp_id).await.unwrap();

    h.controller.settle().await;

    let calls = h.backend.calls().await;
    assert!(calls.contains(&BackendCall::Delete { id: EntityId::new("page-1") }));
    assert!(h.backend.rows().await.is_empty());
    assert!(h.controller.entities().await.is_empty());
    assert!(h.controller.store().pending_deletions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn mutation_on_failed_creation_is_rolled_back() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(10)).await;
    h.backend.fail_title("Doomed").await;
    let mut notices = h.controller.subscribe_notices();

    let temp_id = h
        .controller
        .create(EntityDraft::page(OWNER, "Doomed"), None)
        .await
        .unwrap();
    h.controller
        .update(&temp_id, EntityPatch::new().body("notes"))
        .await
        .unwrap();

    h.controller.settle().await;

    assert!(h.controller.entities().await.is_empty());
    let calls = h.backend.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::Update { .. })));

    let failed = failures(&drain_notices(&mut notices));
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().any(|(label, _)| label.starts_with("create")));
    let (_, error) = failed
        .iter()
        .find(|(label, _)| label.starts_with("update"))
        .unwrap();
    assert_eq!(
        error,
        &SyncError::DependencyFailed(temp_id.clone()).to_string()
    );
    assert_eq!(h.controller.stats().failed, 2);
}

#[tokio::test(start_paused = true)]
async fn stale_list_read_keeps_deleted_entity_hidden() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.backend
        .seed(vec![
            seeded("page-10", "One", 0),
            seeded("page-20", "Two", 1),
            seeded("page-30", "Three", 2),
        ])
        .await;
    h.controller.load().await.unwrap();

    h.backend.set_stale_reads(1).await;
    let doomed = EntityId::new("page-20");
    h.controller.delete(&doomed).await.unwrap();
    h.controller.settle().await;
    assert_eq!(h.backend.rows().await.len(), 2);

    // The backend still answers with the row set from before the delete.
    let merged = h.controller.refresh().await.unwrap();
    assert_eq!(ids(&merged), vec!["page-10", "page-30"]);
    assert!(h.controller.store().pending_deletions().await.contains(&doomed));

    h.backend.set_stale_reads(0).await;
    let merged = h.controller.refresh().await.unwrap();
    assert_eq!(ids(&merged), vec!["page-10", "page-30"]);
    assert!(h.controller.store().pending_deletions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn edited_entity_survives_stale_read_before_its_snapshot() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.controller.load().await.unwrap();

    h.controller
        .create(EntityDraft::page(OWNER, "A"), None)
        .await
        .unwrap();
    h.controller.settle().await;
    let page = EntityId::new("page-1");
    assert!(h.controller.store().get(&page).await.unwrap().is_optimistic);

    h.controller
        .update(&page, EntityPatch::new().title("A renamed"))
        .await
        .unwrap();
    h.controller.settle().await;
    let edited = h.controller.store().get(&page).await.unwrap();
    assert_eq!(edited.title, "A renamed");
    assert!(edited.is_optimistic);

    // Two writes back the backend had no rows at all.
    h.backend.set_stale_reads(2).await;
    let merged = h.controller.refresh().await.unwrap();
    assert_eq!(ids(&merged), vec!["page-1"]);
    assert_eq!(merged[0].title, "A renamed");
    assert_eq!(h.backend.rows().await.len(), 1);

    h.backend.set_stale_reads(0).await;
    let merged = h.controller.refresh().await.unwrap();
    assert_eq!(ids(&merged), vec!["page-1"]);
    assert_eq!(merged[0].title, "A renamed");
    assert!(!merged[0].is_optimistic);
}

#[tokio::test(start_paused = true)]
async fn moved_entities_survive_stale_read_before_their_snapshot() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.controller.load().await.unwrap();

    for title in ["A", "B"] {
        h.controller
            .create(EntityDraft::page(OWNER, title), None)
            .await
            .unwrap();
    }
    h.controller.settle().await;
    let entities = h.controller.entities().await;
    assert!(entities.iter().all(|e| e.is_optimistic && !e.id.is_temporary()));
    let last = entities[1].id.clone();

    h.controller.move_to(&last, 0).await.unwrap();
    h.controller.settle().await;

    // Two creates and two order writes; the oldest read is the empty list.
    h.backend.set_stale_reads(4).await;
    let merged = h.controller.refresh().await.unwrap();
    let titles: Vec<&str> = merged.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["B", "A"]);
    assert!(merged.iter().all(|e| e.is_optimistic));

    h.backend.set_stale_reads(0).await;
    let merged = h.controller.refresh().await.unwrap();
    let titles: Vec<&str> = merged.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["B", "A"]);
    assert!(merged.iter().all(|e| !e.is_optimistic));
}

#[tokio::test(start_paused = true)]
async fn confirmed_creations_are_forgotten_once_a_snapshot_carries_them() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(10)).await;

    let first = h
        .controller
        .create(EntityDraft::page(OWNER, "First"), None)
        .await
        .unwrap();
    h.controller
        .create(EntityDraft::page(OWNER, "Second"), None)
        .await
        .unwrap();
    h.controller
        .update(&first, EntityPatch::new().body("notes"))
        .await
        .unwrap();
    assert_eq!(h.controller.tracked_creations(), 2);

    h.controller.settle().await;
    assert_eq!(h.controller.tracked_creations(), 0);
    // Held until a list read confirms them.
    assert_eq!(h.controller.store().alias_count().await, 2);

    h.controller.refresh().await.unwrap();
    assert_eq!(h.controller.tracked_creations(), 0);
    assert_eq!(h.controller.store().alias_count().await, 0);
    let entities = h.controller.entities().await;
    assert_eq!(entities.len(), 2);
    assert!(entities.iter().all(|e| !e.is_optimistic && !e.id.is_temporary()));
}

#[tokio::test(start_paused = true)]
async fn temporary_id_keeps_working_after_confirmation() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.controller.load().await.unwrap();

    let temp_id = h
        .controller
        .create(EntityDraft::page(OWNER, "Draft"), None)
        .await
        .unwrap();
    h.controller.settle().await;
    assert_eq!(h.controller.tracked_creations(), 0);

    h.controller
        .update(&temp_id, EntityPatch::new().title("Published"))
        .await
        .unwrap();
    h.controller.settle().await;

    let calls = h.backend.calls().await;
    assert!(calls.contains(&BackendCall::Update { id: EntityId::new("page-1") }));
    assert_eq!(h.backend.rows().await[0].title, "Published");
    let entities = h.controller.entities().await;
    assert_eq!(ids(&entities), vec!["page-1"]);
    assert_eq!(entities[0].title, "Published");
    assert_eq!(h.controller.stats().failed, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_delete_restores_the_entity() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.backend.seed(vec![seeded("page-10", "Keep me", 0)]).await;
    h.controller.load().await.unwrap();
    h.backend.fail_mutations_on(EntityId::new("page-10")).await;

    let id = EntityId::new("page-10");
    h.controller.delete(&id).await.unwrap();
    assert!(h.controller.entities().await.is_empty());

    h.controller.settle().await;

    let entities = h.controller.entities().await;
    assert_eq!(ids(&entities), vec!["page-10"]);
    assert_eq!(entities[0].title, "Keep me");
    assert!(h.controller.store().pending_deletions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_update_restores_previous_fields() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.backend.seed(vec![seeded("page-10", "Original", 0)]).await;
    h.controller.load().await.unwrap();
    h.backend.fail_mutations_on(EntityId::new("page-10")).await;

    let id = EntityId::new("page-10");
    h.controller
        .update(&id, EntityPatch::new().title("Changed"))
        .await
        .unwrap();
    let pending = h.controller.store().get(&id).await.unwrap();
    assert_eq!(pending.title, "Changed");
    assert!(pending.is_optimistic);

    h.controller.settle().await;

    let restored = h.controller.store().get(&id).await.unwrap();
    assert_eq!(restored.title, "Original");
    assert!(!restored.is_optimistic);
}

#[tokio::test(start_paused = true)]
async fn unknown_entity_is_rejected_immediately() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();

    let missing = EntityId::new("page-404");
    let update = h
        .controller
        .update(&missing, EntityPatch::new().title("x"))
        .await;
    assert!(matches!(update, Err(SyncError::EntityNotFound(_))));
    let delete = h.controller.delete(&missing).await;
    assert!(matches!(delete, Err(SyncError::EntityNotFound(_))));
    let moved = h.controller.move_to(&missing, 0).await;
    assert!(matches!(moved, Err(SyncError::EntityNotFound(_))));
    assert_eq!(h.controller.stats().submitted, 0);
}

#[tokio::test(start_paused = true)]
async fn move_reorders_locally_then_persists() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.backend
        .seed(vec![
            seeded("page-10", "A", 0),
            seeded("page-20", "B", 1),
            seeded("page-30", "C", 2),
            seeded("page-40", "D", 3),
        ])
        .await;
    h.controller.load().await.unwrap();
    h.backend.set_latency(Duration::from_millis(5)).await;

    h.controller
        .move_to(&EntityId::new("page-40"), 0)
        .await
        .unwrap();
    let local = h.controller.entities().await;
    assert_eq!(ids(&local), vec!["page-40", "page-10", "page-20", "page-30"]);
    assert!(local.iter().all(|e| e.is_optimistic));

    h.controller.settle().await;

    let entities = h.controller.entities().await;
    assert!(entities.iter().all(|e| !e.is_optimistic));
    let orders: Vec<i64> = entities.iter().map(|e| e.order_index).collect();
    assert_eq!(orders, vec![0, 1, 2, 3]);

    let updates = h
        .backend
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Update { .. }))
        .count();
    assert_eq!(updates, 4);
    let rows = h.backend.rows().await;
    assert_eq!(ids(&rows), vec!["page-40", "page-10", "page-20", "page-30"]);
}

#[tokio::test(start_paused = true)]
async fn move_to_current_position_is_a_noop() {
    let h = harness_without_refresh(ControllerConfig::default());
    h.backend
        .seed(vec![seeded("page-10", "A", 0), seeded("page-20", "B", 1)])
        .await;
    h.controller.load().await.unwrap();

    h.controller
        .move_to(&EntityId::new("page-20"), 1)
        .await
        .unwrap();
    assert_eq!(h.controller.stats().submitted, 0);
}

#[tokio::test(start_paused = true)]
async fn drain_runs_bookkeeping_after_queue_settles() {
    let h = harness(ControllerConfig::default());
    h.controller.load().await.unwrap();

    h.controller
        .create(EntityDraft::page(OWNER, "First"), None)
        .await
        .unwrap();
    h.controller
        .create(EntityDraft::page(OWNER, "Second"), None)
        .await
        .unwrap();
    h.controller.settle().await;

    let calls = h.backend.calls().await;
    let tail: Vec<&BackendCall> = calls.iter().rev().take(3).rev().collect();
    let parent_id = OWNER.to_string();
    assert_eq!(
        tail,
        vec![
            &BackendCall::Reindex {
                parent_id: parent_id.clone()
            },
            &BackendCall::RefreshCounts {
                parent_id: parent_id.clone()
            },
            &BackendCall::FetchList { parent_id },
        ]
    );
    let creates = calls
        .iter()
        .filter(|c| matches!(c, BackendCall::Create { .. }))
        .count();
    assert_eq!(creates, 2);
    assert_eq!(h.controller.stats().idle_transitions, 1);
}

#[tokio::test]
async fn invalid_config_is_rejected_at_build() {
    let result = EntityListController::builder(
        OWNER,
        EntityKind::Page,
        Arc::new(InMemoryBackend::new()),
        Arc::new(InMemoryUploader::new()),
    )
    .config(ControllerConfig::new().creation_concurrency(0))
    .build();

    assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
}

#[tokio::test(start_paused = true)]
async fn controller_runs_with_json_config() {
    let json = serde_json::json!({
        "queue": { "creation_concurrency": 1 },
        "skeleton_count": 2,
        "asset_destination": "covers"
    })
    .to_string();
    let config = ControllerConfig::from_json(&json).unwrap();
    let h = harness(config);
    assert_eq!(h.controller.entities().await.len(), 2);
    h.controller.load().await.unwrap();

    let asset = AssetUpload::new("a.jpg", "image/jpeg", vec![0u8; 2]);
    h.controller
        .create(EntityDraft::page(OWNER, "One"), Some(asset))
        .await
        .unwrap();
    h.controller
        .create(EntityDraft::page(OWNER, "Two"), None)
        .await
        .unwrap();
    h.controller.settle().await;

    assert_eq!(h.controller.stats().peak_creation_in_flight, 1);
    assert_eq!(
        h.uploader.uploads().await,
        vec!["https://assets.local/covers/a.jpg".to_string()]
    );
}
