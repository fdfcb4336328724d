use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use assay_common::config::AppConfig;
use assay_crawler::source::DumpSource;
use assay_crawler::{CrawlOutcome, MountsCrawler, TablesCrawler};
use assay_inventory::{InventoryKind, InventoryStore};
use assay_locations::{ExternalLocations, TablesInMounts};
use log::{info, warn};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn summary<R>(kind: InventoryKind, outcome: &CrawlOutcome<R>) -> String {
    let mut line = format!(
        "{kind}: {} rows, {} skipped, {:?}",
        outcome.metadata.row_count,
        outcome.metadata.skipped,
        outcome.state
    );
    if outcome.reused {
        line.push_str(" (reused)");
    }
    if let Some(cause) = &outcome.cause {
        line.push_str(&format!(" ({cause})"));
    }
    line
}

/// Runs one inventory cycle against a metadata dump: tables and mounts are
/// crawled concurrently, then the derived inventories are recomputed.
pub async fn run_crawl(
    config: &AppConfig,
    source: &Path,
    force: bool,
    out: &mut dyn Write,
) -> CommandResult {
    let store = Arc::new(InventoryStore::open(&config.inventory).await?);
    let dump = Arc::new(DumpSource::load(source).await?);
    let mut crawler_config = config.crawler.clone();
    crawler_config.force_refresh |= force;

    let tables = Arc::new(TablesCrawler::new(
        dump.clone(),
        store.clone(),
        &crawler_config,
    ));
    let mounts = Arc::new(MountsCrawler::new(dump, store.clone(), &crawler_config));
    let locations = Arc::new(ExternalLocations::new(
        tables.clone(),
        mounts.clone(),
        store.clone(),
        &config.locations,
    ));
    let tables_in_mounts = Arc::new(TablesInMounts::new(
        tables.clone(),
        mounts.clone(),
        locations.clone(),
        store.clone(),
    ));

    let interrupt = tokio::spawn({
        let tables = tables.clone();
        let mounts = mounts.clone();
        let locations = locations.clone();
        let tables_in_mounts = tables_in_mounts.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling the inventory cycle...");
                tables.base().cancel();
                mounts.base().cancel();
                locations.base().cancel();
                tables_in_mounts.base().cancel();
            }
        }
    });

    info!(
        "starting inventory cycle with the {} store",
        store.backend_name()
    );
    let result = async {
        let (tables, mounts) = tokio::try_join!(tables.snapshot(), mounts.snapshot())?;
        writeln!(out, "{}", summary(InventoryKind::Tables, &tables))?;
        writeln!(out, "{}", summary(InventoryKind::Mounts, &mounts))?;
        let locations = locations.snapshot().await?;
        writeln!(
            out,
            "{}",
            summary(InventoryKind::ExternalLocations, &locations)
        )?;
        let tables_in_mounts = tables_in_mounts.snapshot().await?;
        writeln!(
            out,
            "{}",
            summary(InventoryKind::TablesInMounts, &tables_in_mounts)
        )?;
        let grants = locations
            .rows
            .iter()
            .filter(|x| !x.satisfied_by_mount)
            .count();
        writeln!(out, "{grants} external locations need a grant")?;
        CommandResult::Ok(())
    }
    .await;
    interrupt.abort();
    result
}

/// Prints the stored rows of `kind` as JSON.
pub async fn run_show(
    config: &AppConfig,
    kind: InventoryKind,
    out: &mut dyn Write,
) -> CommandResult {
    let store = InventoryStore::open(&config.inventory).await?;
    let Some(snapshot) = store.load_snapshot::<serde_json::Value>(kind).await? else {
        writeln!(out, "no {kind} snapshot")?;
        return Ok(());
    };
    let metadata = &snapshot.metadata;
    writeln!(
        out,
        "{kind}: snapshot {} crawled at {}, {} rows, {} skipped, fingerprint {}",
        metadata.id,
        metadata.crawled_at.to_rfc3339(),
        metadata.row_count,
        metadata.skipped,
        metadata.fingerprint
    )?;
    writeln!(out, "{}", serde_json::to_string_pretty(&snapshot.rows)?)?;
    Ok(())
}

/// Deletes the snapshot of `kind`, or of every kind.
pub async fn run_reset(
    config: &AppConfig,
    kind: Option<InventoryKind>,
    out: &mut dyn Write,
) -> CommandResult {
    let store = InventoryStore::open(&config.inventory).await?;
    match kind {
        Some(kind) => {
            if store.reset(kind).await? {
                writeln!(out, "reset {kind}")?;
            } else {
                writeln!(out, "no {kind} snapshot")?;
            }
        }
        None => {
            let count = store.reset_all().await?;
            writeln!(out, "reset {count} inventory kinds")?;
        }
    }
    Ok(())
}
