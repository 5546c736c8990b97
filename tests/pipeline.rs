//! Library-level acquisition tests.
//!
//! Custom listing and extraction implementations (via the `PageSource`,
//! `ItemExtractor` and `FeedbackExtractor` traits) driven through the real
//! harvester against a filesystem primary and a SQLite mirror.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use shelf_harvest::acquire_cmd;
use shelf_harvest::assets::AssetFetcher;
use shelf_harvest::config::Config;
use shelf_harvest::local_store::LocalStore;
use shelf_harvest::progress::ProgressMode;
use shelf_harvest::sqlite_store::SqliteStore;
use shelf_harvest::stores;
use shelf_harvest_core::acquire::Harvester;
use shelf_harvest_core::error::Result;
use shelf_harvest_core::models::{FeedbackEntry, Item};
use shelf_harvest_core::source::{Extraction, FeedbackExtractor, ItemExtractor, PageSource};
use shelf_harvest_core::store::mirrored::MirroredStore;
use shelf_harvest_core::store::ItemStore;
use shelf_harvest_core::HarvestPolicy;

// ─── Generated Listing ──────────────────────────────────────────────

/// A listing of `per_page * pages` products named `https://gen.example/dp/<n>`.
struct GeneratedPages {
    per_page: usize,
    pages: usize,
    page: usize,
}

#[async_trait]
impl PageSource for GeneratedPages {
    async fn current_page_references(&mut self) -> Result<Vec<String>> {
        let start = self.page * self.per_page;
        Ok((start..start + self.per_page)
            .map(|n| format!("https://gen.example/dp/{}/ref=sr_1_{}", n, n))
            .collect())
    }

    async fn advance_page(&mut self) -> Result<bool> {
        if self.page + 1 < self.pages {
            self.page += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

struct GeneratedItems;

#[async_trait]
impl ItemExtractor for GeneratedItems {
    async fn extract(&mut self, reference: &str) -> Result<Extraction> {
        let n = reference
            .trim_start_matches("https://gen.example/dp/")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let mut item = Item::new(format!("gen-{}", n), format!("Generated Volume {}", n), reference);
        item.language = Some("English".to_string());
        Ok(Extraction::Item(item))
    }
}

/// Five reviewers per page, three pages per item.
struct GeneratedFeedback {
    page: usize,
}

#[async_trait]
impl FeedbackExtractor for GeneratedFeedback {
    async fn goto_first_page(&mut self, _locator: Option<&str>) -> Result<()> {
        self.page = 0;
        Ok(())
    }

    async fn extract_page(
        &mut self,
        identifier: &str,
        exclude_authors: &HashSet<String>,
    ) -> Result<Vec<FeedbackEntry>> {
        Ok((0..5)
            .map(|i| format!("reviewer-{}", self.page * 5 + i))
            .filter(|author| !exclude_authors.contains(author))
            .map(|author| FeedbackEntry::new(author, format!("on {}", identifier), Some(4)))
            .collect())
    }

    async fn advance_page(&mut self) -> Result<bool> {
        if self.page < 2 {
            self.page += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn harvester(store: MirroredStore) -> Harvester {
    Harvester::new(
        Box::new(GeneratedPages {
            per_page: 4,
            pages: 3,
            page: 0,
        }),
        Box::new(GeneratedItems),
        Box::new(GeneratedFeedback { page: 0 }),
        store,
        HarvestPolicy {
            page_load_wait_ms: 0,
            ..Default::default()
        },
    )
}

async fn mirrored(root: &Path) -> MirroredStore {
    let primary = LocalStore::new(
        root.join("data"),
        AssetFetcher::new(Duration::from_secs(5)).unwrap(),
    );
    let mirror = SqliteStore::open(&root.join("data/shelf.sqlite"))
        .await
        .unwrap();
    MirroredStore::new(Box::new(primary), Some(Box::new(mirror)))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_custom_source_fills_both_stores() {
    let tmp = TempDir::new().unwrap();

    let acq = harvester(mirrored(tmp.path()).await)
        .acquire(6, 7)
        .await
        .unwrap();
    assert_eq!(acq.items.len(), 6);
    assert_eq!(acq.stats.created, 6);
    assert_eq!(acq.stats.feedback_written, 42);
    // The first two listing pages cover the deficit.
    assert_eq!(acq.stats.pages, 2);

    let store = mirrored(tmp.path()).await;
    assert_eq!(store.verify_all().await.unwrap(), 6);
    assert_eq!(store.primary().known_identifiers().await.unwrap().len(), 6);
    let record = store.primary().load_item("gen-0").await.unwrap().unwrap();
    assert_eq!(record.item.source_reference, "https://gen.example/dp/0");
    assert_eq!(record.feedback.len(), 7);
}

#[tokio::test]
async fn test_growing_target_only_does_the_difference() {
    let tmp = TempDir::new().unwrap();

    harvester(mirrored(tmp.path()).await)
        .acquire(4, 5)
        .await
        .unwrap();

    let acq = harvester(mirrored(tmp.path()).await)
        .acquire(4, 10)
        .await
        .unwrap();
    assert_eq!(acq.stats.created, 0);
    assert_eq!(acq.stats.augmented, 4);
    assert_eq!(acq.stats.feedback_written, 20);
    for record in &acq.items {
        assert_eq!(record.feedback.len(), 5, "only new feedback is returned");
        assert!(record.feedback.iter().all(|e| e.author != "reviewer-0"));
    }

    let acq = harvester(mirrored(tmp.path()).await)
        .acquire(4, 10)
        .await
        .unwrap();
    assert_eq!(acq.stats.deficit, 0);
    assert!(acq.items.is_empty());
}

#[tokio::test]
async fn test_acquire_from_config_and_snapshot() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    std::fs::write(
        root.join("catalog.json"),
        r#"{
            "pages": [["https://shop.example/dp/1?ref=a", "https://shop.example/dp/2"]],
            "items": {
                "https://shop.example/dp/1": {
                    "identifier": "isbn-1", "title": "One", "language": "English",
                    "reviews": [[{"author": "x", "text": "good", "rating": 4}]]
                },
                "https://shop.example/dp/2": {
                    "identifier": "isbn-2", "title": "Two", "language": "English"
                }
            }
        }"#,
    )
    .unwrap();
    let config: Config = toml::from_str(&format!(
        r#"
[storage.local]
root = "{root}/data"

[mirror]
path = "{root}/data/shelf.sqlite"

[source]
catalog = "{root}/catalog.json"

[harvest]
page_load_wait_ms = 0
"#,
        root = root.display()
    ))
    .unwrap();

    let acq = acquire_cmd::acquire(&config, 2, Some(1), ProgressMode::Off)
        .await
        .unwrap();
    assert_eq!(acq.stats.created, 2);
    assert_eq!(acq.stats.feedback_written, 1);

    let store = stores::open_store(&config).await.unwrap();
    let satisfied = store.satisfied_references(1).await.unwrap();
    assert_eq!(
        satisfied,
        HashSet::from(["https://shop.example/dp/1".to_string()])
    );
    let two = store.load_item("isbn-2").await.unwrap().unwrap();
    assert!(two.feedback.is_empty());
}
