//! Store statistics.
//!
//! A quick summary of what has been harvested: item and feedback totals and
//! how many items already meet a feedback threshold. Used by `shelf stats`
//! to check progress between acquisition runs.

use anyhow::Result;

use shelf_harvest_core::store::ItemStore;

use crate::config::Config;
use crate::stores;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub items: usize,
    pub feedback: usize,
    pub threshold: usize,
    pub satisfied: usize,
}

pub async fn collect_stats(store: &dyn ItemStore, threshold: usize) -> Result<StoreStats> {
    let ids = store.known_identifiers().await?;
    let mut feedback = 0;
    for id in &ids {
        feedback += store.known_feedback_authors(id).await?.len();
    }
    let satisfied = store.satisfied_references(threshold).await?.len();
    Ok(StoreStats {
        items: ids.len(),
        feedback,
        threshold,
        satisfied,
    })
}

pub async fn run_stats(config: &Config, threshold: Option<usize>) -> Result<()> {
    let store = stores::open_store(config).await?;
    let threshold = threshold.unwrap_or(config.harvest.feedback_per_item);
    let stats = collect_stats(&store, threshold).await?;

    println!("Shelf Harvest — Store Stats");
    println!("===========================");
    println!();
    println!("  Backend:     {}", store.primary().backend_name());
    match &config.mirror {
        Some(mirror) => {
            let size = std::fs::metadata(&mirror.path).map(|m| m.len()).unwrap_or(0);
            println!(
                "  Mirror:      {} ({})",
                mirror.path.display(),
                format_bytes(size)
            );
        }
        None => println!("  Mirror:      none"),
    }
    println!();
    println!("  Items:       {}", stats.items);
    println!("  Feedback:    {}", stats.feedback);
    println!(
        "  Satisfied:   {} / {} (>= {} feedback)",
        stats.satisfied, stats.items, stats.threshold
    );
    if stats.items > 0 {
        println!(
            "  Avg/item:    {:.1}",
            stats.feedback as f64 / stats.items as f64
        );
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_harvest_core::models::{FeedbackEntry, Item, ItemRecord};
    use shelf_harvest_core::store::memory::InMemoryStore;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_collect_stats() {
        let store = InMemoryStore::new();
        for (id, n) in [("isbn-1", 3), ("isbn-2", 1)] {
            let feedback = (0..n)
                .map(|i| FeedbackEntry::new(format!("r{}", i), "t", None))
                .collect();
            store
                .save_item(
                    &ItemRecord::new(Item::new(id, "T", format!("https://s/{}", id)), feedback),
                    &HashSet::new(),
                )
                .await
                .unwrap();
        }

        let stats = collect_stats(&store, 2).await.unwrap();
        assert_eq!(
            stats,
            StoreStats {
                items: 2,
                feedback: 4,
                threshold: 2,
                satisfied: 1
            }
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
