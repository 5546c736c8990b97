//! `shelf acquire`: top the store up to N items with M feedback entries each.
//!
//! Wires the configured store, the snapshot catalog and the harvest policy
//! into a [`Harvester`] and prints a summary on stdout. Ending with fewer
//! items than requested is reported, not treated as a failure.

use anyhow::Result;
use tracing::info;

use shelf_harvest_core::acquire::{Acquisition, Harvester};

use crate::config::Config;
use crate::progress::ProgressMode;
use crate::snapshot::SnapshotCatalog;
use crate::stores;

/// Run one acquisition against the configured store and catalog.
pub async fn acquire(
    config: &Config,
    count: usize,
    feedback: Option<usize>,
    progress: ProgressMode,
) -> Result<Acquisition> {
    let store = stores::open_store(config).await?;
    let catalog = SnapshotCatalog::open(&config.source.catalog)?;
    info!(
        catalog = %config.source.catalog.display(),
        pages = catalog.page_count(),
        items = catalog.item_count(),
        backend = store.primary().backend_name(),
        mirrored = store.mirror().is_some(),
        "opened session"
    );

    let (pages, items, reviews) = catalog.split();
    let feedback_per_item = feedback.unwrap_or(config.harvest.feedback_per_item);
    let mut harvester = Harvester::new(
        Box::new(pages),
        Box::new(items),
        Box::new(reviews),
        store,
        config.harvest.clone(),
    )
    .with_progress(progress.reporter());

    Ok(harvester.acquire(count, feedback_per_item).await?)
}

pub async fn run_acquire(
    config: &Config,
    count: usize,
    feedback: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let feedback_per_item = feedback.unwrap_or(config.harvest.feedback_per_item);
    let acquisition = acquire(config, count, Some(feedback_per_item), progress).await?;
    let stats = &acquisition.stats;

    println!("acquire {} items x {} feedback", count, feedback_per_item);
    println!("  already satisfied: {}", stats.satisfied);
    if stats.deficit == 0 {
        println!("  nothing to do");
        println!("ok");
        return Ok(());
    }
    println!("  deficit: {} (budget {})", stats.deficit, stats.budget);
    println!("  listing pages read: {}", stats.pages);
    println!("  candidates processed: {}", stats.candidates);
    println!("  skipped: {}", stats.skipped);
    println!("  items created: {}", stats.created);
    println!("  items topped up: {}", stats.augmented);
    println!("  feedback written: {}", stats.feedback_written);
    let acquired = acquisition.items.len();
    if acquired < stats.deficit {
        println!("  shortfall: {} (listing exhausted)", stats.deficit - acquired);
    }
    println!("ok");
    Ok(())
}
