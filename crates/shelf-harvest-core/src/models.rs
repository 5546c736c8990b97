//! Core data models used throughout shelf-harvest.
//!
//! An [`Item`] is a single catalog entry (a book); a [`FeedbackEntry`] is a
//! review attached to exactly one item. [`ItemRecord`] bundles the two and
//! is the unit written to stores and returned from an acquisition run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog entry as extracted from a product page.
///
/// `identifier` is the natural key (ISBN-like) and is unique across all
/// stored items. `uuid` is assigned once when the item is first extracted
/// and is never reused. Attributes are immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub identifier: String,
    pub uuid: Uuid,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub popularity_rank: Option<u64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u64>,
    #[serde(default)]
    pub cover_image_reference: Option<String>,
    /// Normalized locator of the product page; the reference-level dedup key.
    pub source_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Item {
    /// Create an item with a fresh surrogate key and empty optional attributes.
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        source_reference: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            uuid: Uuid::new_v4(),
            title: title.into(),
            author: String::new(),
            description: String::new(),
            publication_date: None,
            page_count: None,
            price: None,
            popularity_rank: None,
            rating: None,
            rating_count: None,
            cover_image_reference: None,
            source_reference: source_reference.into(),
            language: None,
        }
    }

    /// Names of optional attributes holding out-of-range values.
    pub fn validate(&self) -> Vec<&'static str> {
        let mut invalid = Vec::new();
        if self.page_count == Some(0) {
            invalid.push("page_count");
        }
        if matches!(self.price, Some(p) if !(p > 0.0 && p.is_finite())) {
            invalid.push("price");
        }
        if self.popularity_rank == Some(0) {
            invalid.push("popularity_rank");
        }
        if matches!(self.rating, Some(r) if !(1.0..=5.0).contains(&r)) {
            invalid.push("rating");
        }
        if self
            .cover_image_reference
            .as_deref()
            .is_some_and(|uri| uri.trim().is_empty())
        {
            invalid.push("cover_image_reference");
        }
        invalid
    }

    /// Clear the attributes reported by [`validate`](Item::validate).
    ///
    /// Extraction is best-effort: a garbled price or rating must not sink an
    /// otherwise valid item.
    pub fn sanitize(&mut self) {
        for field in self.validate() {
            match field {
                "page_count" => self.page_count = None,
                "price" => self.price = None,
                "popularity_rank" => self.popularity_rank = None,
                "rating" => self.rating = None,
                "cover_image_reference" => self.cover_image_reference = None,
                _ => {}
            }
        }
    }
}

/// A single user review of an item.
///
/// `author` is the natural key within the owning item's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl FeedbackEntry {
    pub fn new(author: impl Into<String>, text: impl Into<String>, rating: Option<u8>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            rating: rating.filter(|r| *r <= 5),
        }
    }
}

/// An item together with the feedback entries written alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(flatten)]
    pub item: Item,
    #[serde(default)]
    pub feedback: Vec<FeedbackEntry>,
}

impl ItemRecord {
    pub fn new(item: Item, feedback: Vec<FeedbackEntry>) -> Self {
        Self { item, feedback }
    }

    pub fn identifier(&self) -> &str {
        &self.item.identifier
    }
}
