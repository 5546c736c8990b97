//! Snapshot catalog: a captured product listing replayed from disk.
//!
//! A snapshot is a single JSON file holding the listing pages in order and
//! the product pages keyed by reference:
//!
//! ```json
//! {
//!   "pages": [["https://shop.example/dp/1?ref=sr_1", "..."], ["..."]],
//!   "items": {
//!     "https://shop.example/dp/1": {
//!       "identifier": "isbn-101", "title": "...", "language": "English",
//!       "cover_image_reference": "covers/101.jpg",
//!       "reviews": [[{"author": "a", "text": "...", "rating": 5}], [...]]
//!     }
//!   }
//! }
//! ```
//!
//! [`SnapshotCatalog::split`] hands out the three session-bound pieces the
//! harvester needs. They share one cursor: extracting an item navigates the
//! session to that item's page, which is where feedback extraction then
//! starts. The listing keeps its own page position.
//!
//! Relative cover paths are resolved against the catalog's directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use shelf_harvest_core::dedup::normalize_reference;
use shelf_harvest_core::error::{HarvestError, Result};
use shelf_harvest_core::models::{FeedbackEntry, Item};
use shelf_harvest_core::policy::SkipReason;
use shelf_harvest_core::source::{Extraction, FeedbackExtractor, ItemExtractor, PageSource};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    pages: Vec<Vec<String>>,
    #[serde(default)]
    items: HashMap<String, CatalogItem>,
}

#[derive(Debug, Deserialize)]
struct CatalogItem {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    popularity_rank: Option<u64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    rating_count: Option<u64>,
    #[serde(default)]
    cover_image_reference: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    reviews: Vec<Vec<FeedbackEntry>>,
}

struct Catalog {
    pages: Vec<Vec<String>>,
    items: HashMap<String, CatalogItem>,
}

#[derive(Default)]
struct Session {
    /// Normalized reference of the item page the session is on.
    current: Option<String>,
    feedback_page: usize,
}

/// A snapshot loaded into memory.
pub struct SnapshotCatalog {
    catalog: Arc<Catalog>,
}

impl SnapshotCatalog {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot catalog: {}", path.display()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json(&content, &base)
    }

    /// Parse a catalog; relative cover paths are resolved against `base`.
    pub fn from_json(json: &str, base: &Path) -> anyhow::Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).context("Failed to parse snapshot catalog")?;

        let items = file
            .items
            .into_iter()
            .map(|(reference, mut item)| {
                item.cover_image_reference = item
                    .cover_image_reference
                    .map(|uri| resolve_asset(&uri, base));
                (normalize_reference(&reference), item)
            })
            .collect();

        Ok(Self {
            catalog: Arc::new(Catalog {
                pages: file.pages,
                items,
            }),
        })
    }

    pub fn page_count(&self) -> usize {
        self.catalog.pages.len()
    }

    pub fn item_count(&self) -> usize {
        self.catalog.items.len()
    }

    /// Open a session and return its listing, item and feedback handles.
    pub fn split(&self) -> (SnapshotPages, SnapshotItems, SnapshotFeedback) {
        let session = Arc::new(Mutex::new(Session::default()));
        (
            SnapshotPages {
                catalog: self.catalog.clone(),
                page: 0,
            },
            SnapshotItems {
                catalog: self.catalog.clone(),
                session: session.clone(),
            },
            SnapshotFeedback {
                catalog: self.catalog.clone(),
                session,
            },
        )
    }
}

fn resolve_asset(uri: &str, base: &Path) -> String {
    if uri.contains("://") {
        return uri.to_string();
    }
    let path = PathBuf::from(uri);
    let path = if path.is_absolute() { path } else { base.join(path) };
    format!("file://{}", path.display())
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

pub struct SnapshotPages {
    catalog: Arc<Catalog>,
    page: usize,
}

#[async_trait]
impl PageSource for SnapshotPages {
    async fn current_page_references(&mut self) -> Result<Vec<String>> {
        Ok(self
            .catalog
            .pages
            .get(self.page)
            .cloned()
            .unwrap_or_default())
    }

    async fn advance_page(&mut self) -> Result<bool> {
        if self.page + 1 < self.catalog.pages.len() {
            self.page += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

pub struct SnapshotItems {
    catalog: Arc<Catalog>,
    session: Arc<Mutex<Session>>,
}

#[async_trait]
impl ItemExtractor for SnapshotItems {
    async fn extract(&mut self, reference: &str) -> Result<Extraction> {
        let key = normalize_reference(reference);
        {
            let mut session = self.session.lock().await;
            session.current = Some(key.clone());
            session.feedback_page = 0;
        }

        let Some(raw) = self.catalog.items.get(&key) else {
            return Ok(Extraction::Skip(SkipReason::ElementNotFound(
                "product page".to_string(),
            )));
        };
        let Some(title) = non_empty(raw.title.as_ref()) else {
            return Ok(Extraction::Skip(SkipReason::MissingTitle));
        };
        let Some(identifier) = non_empty(raw.identifier.as_ref()) else {
            return Ok(Extraction::Skip(SkipReason::MissingIdentifier));
        };

        let mut item = Item::new(identifier, title, key.clone());
        item.author = raw.author.clone().unwrap_or_default();
        item.description = raw.description.clone().unwrap_or_default();
        item.publication_date = raw.publication_date.clone();
        item.page_count = raw.page_count;
        item.price = raw.price;
        item.popularity_rank = raw.popularity_rank;
        item.rating = raw.rating;
        item.rating_count = raw.rating_count;
        item.cover_image_reference = raw.cover_image_reference.clone();
        item.language = raw.language.clone();
        Ok(Extraction::Item(item))
    }
}

pub struct SnapshotFeedback {
    catalog: Arc<Catalog>,
    session: Arc<Mutex<Session>>,
}

impl SnapshotFeedback {
    fn pages_for(&self, key: Option<&String>) -> &[Vec<FeedbackEntry>] {
        key.and_then(|k| self.catalog.items.get(k))
            .map(|item| item.reviews.as_slice())
            .unwrap_or(&[])
    }
}

#[async_trait]
impl FeedbackExtractor for SnapshotFeedback {
    async fn goto_first_page(&mut self, locator: Option<&str>) -> Result<()> {
        let mut session = self.session.lock().await;
        match locator {
            Some(reference) => session.current = Some(normalize_reference(reference)),
            None if session.current.is_none() => {
                return Err(HarvestError::Config(
                    "feedback extraction needs a live session or a starting locator".to_string(),
                ))
            }
            None => {}
        }
        session.feedback_page = 0;
        Ok(())
    }

    async fn extract_page(
        &mut self,
        _identifier: &str,
        exclude_authors: &HashSet<String>,
    ) -> Result<Vec<FeedbackEntry>> {
        let session = self.session.lock().await;
        let page = self
            .pages_for(session.current.as_ref())
            .get(session.feedback_page)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| !exclude_authors.contains(&e.author))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn advance_page(&mut self) -> Result<bool> {
        let mut session = self.session.lock().await;
        let total = self.pages_for(session.current.as_ref()).len();
        if session.feedback_page + 1 < total {
            session.feedback_page += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
