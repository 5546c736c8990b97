//! In-memory [`ItemStore`] implementation for testing.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Feedback
//! keeps insertion order per item.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FeedbackEntry, Item, ItemRecord};

use super::ItemStore;

struct StoredItem {
    item: Item,
    feedback: Vec<FeedbackEntry>,
}

/// In-memory store for tests and dry runs.
pub struct InMemoryStore {
    name: String,
    items: RwLock<HashMap<String, StoredItem>>,
    covers: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// A store with a custom backend label, handy when two are mirrored.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(HashMap::new()),
            covers: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn feedback_count(&self, identifier: &str) -> usize {
        self.items
            .read()
            .unwrap()
            .get(identifier)
            .map(|s| s.feedback.len())
            .unwrap_or(0)
    }

    /// Cover URI recorded for an identifier, if any.
    pub fn cover_for(&self, identifier: &str) -> Option<String> {
        self.covers.read().unwrap().get(identifier).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        &self.name
    }

    async fn save_item(
        &self,
        record: &ItemRecord,
        known_identifiers: &HashSet<String>,
    ) -> Result<()> {
        let mut items = self.items.write().unwrap();
        let id = record.identifier().to_string();
        if known_identifiers.contains(&id) && !items.contains_key(&id) {
            tracing::warn!(identifier = %id, "known identifier missing from memory store");
        }
        // First write wins; attributes are immutable once persisted.
        let stored = items.entry(id).or_insert_with(|| StoredItem {
            item: record.item.clone(),
            feedback: Vec::new(),
        });
        for entry in &record.feedback {
            if !stored.feedback.iter().any(|e| e.author == entry.author) {
                stored.feedback.push(entry.clone());
            }
        }
        Ok(())
    }

    async fn save_cover_asset(&self, uri: &str, identifier: &str) -> Result<()> {
        self.covers
            .write()
            .unwrap()
            .insert(identifier.to_string(), uri.to_string());
        Ok(())
    }

    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>> {
        let items = self.items.read().unwrap();
        Ok(items
            .values()
            .filter(|s| s.feedback.len() >= threshold)
            .map(|s| s.item.source_reference.clone())
            .collect())
    }

    async fn known_identifiers(&self) -> Result<HashSet<String>> {
        Ok(self.items.read().unwrap().keys().cloned().collect())
    }

    async fn known_feedback_authors(&self, identifier: &str) -> Result<HashSet<String>> {
        let items = self.items.read().unwrap();
        Ok(items
            .get(identifier)
            .map(|s| s.feedback.iter().map(|e| e.author.clone()).collect())
            .unwrap_or_default())
    }

    async fn load_item(&self, identifier: &str) -> Result<Option<ItemRecord>> {
        let items = self.items.read().unwrap();
        Ok(items
            .get(identifier)
            .map(|s| ItemRecord::new(s.item.clone(), s.feedback.clone())))
    }
}
