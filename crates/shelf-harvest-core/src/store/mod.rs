//! Storage abstraction for shelf-harvest.
//!
//! The [`ItemStore`] trait is the single capability interface the
//! acquisition controller depends on. Backends (local filesystem, S3 object
//! store, SQLite relational mirror, in-memory) are selected by
//! configuration; [`MirroredStore`](mirrored::MirroredStore) combines a
//! primary and a mirror behind the same trait.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod mirrored;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ItemRecord;

/// Durable store of items and their feedback sub-collections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_item`](ItemStore::save_item) | Write attributes (new items only) and append feedback |
/// | [`save_cover_asset`](ItemStore::save_cover_asset) | Best-effort cover image copy |
/// | [`satisfied_references`](ItemStore::satisfied_references) | Source references with enough feedback |
/// | [`known_identifiers`](ItemStore::known_identifiers) | Every stored identifier |
/// | [`known_feedback_authors`](ItemStore::known_feedback_authors) | Authors on file for one identifier |
/// | [`load_item`](ItemStore::load_item) | Full stored record |
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Short label for logs and integrity errors (e.g. `"local"`, `"sqlite"`).
    fn backend_name(&self) -> &str;

    /// Persist a record.
    ///
    /// When the identifier is in `known_identifiers` the attributes are
    /// left untouched. Feedback is append-only: an author already on file
    /// for the identifier is never overwritten.
    async fn save_item(&self, record: &ItemRecord, known_identifiers: &HashSet<String>)
        -> Result<()>;

    /// Copy the cover image at `uri` next to the item. Failures are logged,
    /// never returned.
    async fn save_cover_asset(&self, uri: &str, identifier: &str) -> Result<()>;

    /// Source references of items holding at least `threshold` feedback entries.
    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>>;

    async fn known_identifiers(&self) -> Result<HashSet<String>>;

    /// Empty set for an unknown identifier.
    async fn known_feedback_authors(&self, identifier: &str) -> Result<HashSet<String>>;

    /// The stored attributes and every feedback entry on file.
    async fn load_item(&self, identifier: &str) -> Result<Option<ItemRecord>>;
}

/// Shared handles delegate to the inner store, so a caller can keep an
/// `Arc` while the controller owns a boxed clone.
#[async_trait]
impl<T: ItemStore + ?Sized> ItemStore for std::sync::Arc<T> {
    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }

    async fn save_item(
        &self,
        record: &ItemRecord,
        known_identifiers: &HashSet<String>,
    ) -> Result<()> {
        (**self).save_item(record, known_identifiers).await
    }

    async fn save_cover_asset(&self, uri: &str, identifier: &str) -> Result<()> {
        (**self).save_cover_asset(uri, identifier).await
    }

    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>> {
        (**self).satisfied_references(threshold).await
    }

    async fn known_identifiers(&self) -> Result<HashSet<String>> {
        (**self).known_identifiers().await
    }

    async fn known_feedback_authors(&self, identifier: &str) -> Result<HashSet<String>> {
        (**self).known_feedback_authors(identifier).await
    }

    async fn load_item(&self, identifier: &str) -> Result<Option<ItemRecord>> {
        (**self).load_item(identifier).await
    }
}
