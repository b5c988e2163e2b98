use anyhow::{Context, Result};
use clap::Parser;
use rustmemoqueue::{
    AssetUpload, ControllerConfig, EntityDraft, EntityKind, EntityListController, EntityPatch,
    InMemoryBackend, InMemoryUploader, SyncNotice,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rustmemoqueue")]
#[command(about = "Simulates an optimistic page list against in-memory collaborators")]
struct Cli {
    /// Pages to create
    #[arg(long, default_value_t = 5)]
    pages: usize,
    /// Creation lane concurrency
    #[arg(long, default_value_t = 3)]
    concurrency: usize,
    /// Latency of every backend and upload call
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,
    /// Titles the backend rejects
    #[arg(long)]
    fail_title: Vec<String>,
    /// Serve list reads from this many writes ago
    #[arg(long, default_value_t = 0)]
    stale_reads: usize,
    /// Attach a cover image to every page
    #[arg(long)]
    with_assets: bool,
    #[arg(long, default_value = "user-1")]
    owner: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let latency = Duration::from_millis(cli.latency_ms);
    let backend = InMemoryBackend::new();
    backend.set_latency(latency).await;
    backend.set_stale_reads(cli.stale_reads).await;
    for title in &cli.fail_title {
        backend.fail_title(title.clone()).await;
    }
    let uploader = InMemoryUploader::new();
    uploader.set_latency(latency).await;

    let controller = EntityListController::builder(
        cli.owner.clone(),
        EntityKind::Page,
        Arc::new(backend.clone()),
        Arc::new(uploader),
    )
    .config(ControllerConfig::new().creation_concurrency(cli.concurrency))
    .build()
    .context("invalid configuration")?;

    let mut notices = controller.subscribe_notices();
    let notice_log = tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                SyncNotice::TaskFailed { label, error } => println!("! {}: {}", label, error),
                SyncNotice::Drained { generation } => println!("~ drained (generation {})", generation),
            }
        }
    });

    controller.load().await.context("initial load failed")?;

    let mut created = Vec::with_capacity(cli.pages);
    for n in 1..=cli.pages {
        let draft = EntityDraft::page(cli.owner.clone(), format!("Page {}", n));
        let asset = cli.with_assets.then(|| {
            AssetUpload::new(format!("cover-{}.jpg", n), "image/jpeg", vec![0u8; 1024])
        });
        created.push(controller.create(draft, asset).await?);
    }

    if let Some(first) = created.first() {
        controller
            .update(first, EntityPatch::new().title("Page 1 (renamed)"))
            .await?;
    }
    if created.len() > 2 {
        controller.move_to(&created[created.len() - 1], 0).await?;
    }
    if created.len() > 1 {
        controller.delete(&created[1]).await?;
    }

    controller.settle().await;

    println!();
    for entity in controller.entities().await {
        let pending = if entity.is_optimistic { " (pending)" } else { "" };
        println!(
            "{:>4}  {:<12} {}{}",
            entity.order_index, entity.id, entity.title, pending
        );
    }

    let stats = controller.stats();
    println!();
    println!(
        "submitted {} | succeeded {} | failed {} | peak creations {} | drains {}",
        stats.submitted,
        stats.succeeded,
        stats.failed,
        stats.peak_creation_in_flight,
        stats.idle_transitions
    );
    println!("backend rows: {}", backend.rows().await.len());

    notice_log.abort();
    Ok(())
}
