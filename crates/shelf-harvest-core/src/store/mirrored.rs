//! Dual-write coordinator.
//!
//! [`MirroredStore`] fans every write out to a primary store and, when one
//! is configured, a mirror. The two sides are expected to agree at all
//! times; [`MirroredStore::verify`] reports a record held by exactly one
//! side as [`HarvestError::Integrity`]. Mismatches are never repaired
//! automatically: they mean an earlier write failed half-way and need a
//! human to look at them.
//!
//! ```text
//!            save_item / save_cover_asset
//!                        │
//!             ┌──────────┴──────────┐
//!             ▼                     ▼
//!      ┌─────────────┐       ┌─────────────┐
//!      │   primary   │       │   mirror    │
//!      │ local / S3  │       │  (SQLite)   │
//!      └─────────────┘       └──────┬──────┘
//!                                   │ reads (when configured)
//! ```

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{HarvestError, Result};
use crate::models::ItemRecord;

use super::ItemStore;

/// Where a record was found by [`MirroredStore::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Both,
    Neither,
}

pub struct MirroredStore {
    primary: Box<dyn ItemStore>,
    mirror: Option<Box<dyn ItemStore>>,
}

impl MirroredStore {
    pub fn new(primary: Box<dyn ItemStore>, mirror: Option<Box<dyn ItemStore>>) -> Self {
        Self { primary, mirror }
    }

    pub fn single(primary: Box<dyn ItemStore>) -> Self {
        Self::new(primary, None)
    }

    pub fn primary(&self) -> &dyn ItemStore {
        self.primary.as_ref()
    }

    pub fn mirror(&self) -> Option<&dyn ItemStore> {
        self.mirror.as_deref()
    }

    /// The side answering queries: the mirror when configured.
    fn reader(&self) -> &dyn ItemStore {
        self.mirror.as_deref().unwrap_or(self.primary.as_ref())
    }

    /// Check that both sides agree on whether `identifier` exists.
    ///
    /// With no mirror configured there is nothing to compare and the
    /// primary's answer is returned.
    pub async fn verify(&self, identifier: &str) -> Result<Presence> {
        let in_primary = self.primary.load_item(identifier).await?.is_some();
        let Some(mirror) = self.mirror.as_deref() else {
            return Ok(if in_primary {
                Presence::Both
            } else {
                Presence::Neither
            });
        };
        let in_mirror = mirror.load_item(identifier).await?.is_some();
        match (in_primary, in_mirror) {
            (true, true) => Ok(Presence::Both),
            (false, false) => Ok(Presence::Neither),
            (true, false) => Err(HarvestError::Integrity {
                identifier: identifier.to_string(),
                present_in: self.primary.backend_name().to_string(),
                missing_from: mirror.backend_name().to_string(),
            }),
            (false, true) => Err(HarvestError::Integrity {
                identifier: identifier.to_string(),
                present_in: mirror.backend_name().to_string(),
                missing_from: self.primary.backend_name().to_string(),
            }),
        }
    }

    /// Verify every identifier known to either side.
    ///
    /// Returns the number of identifiers checked; stops at the first
    /// mismatch.
    pub async fn verify_all(&self) -> Result<usize> {
        let mut ids = self.primary.known_identifiers().await?;
        if let Some(mirror) = self.mirror.as_deref() {
            ids.extend(mirror.known_identifiers().await?);
        }
        let mut sorted: Vec<String> = ids.into_iter().collect();
        sorted.sort();
        for id in &sorted {
            self.verify(id).await?;
        }
        Ok(sorted.len())
    }
}

#[async_trait]
impl ItemStore for MirroredStore {
    fn backend_name(&self) -> &str {
        match self.mirror {
            Some(_) => "mirrored",
            None => self.primary.backend_name(),
        }
    }

    async fn save_item(
        &self,
        record: &ItemRecord,
        known_identifiers: &HashSet<String>,
    ) -> Result<()> {
        self.primary.save_item(record, known_identifiers).await?;
        if let Some(mirror) = self.mirror.as_deref() {
            mirror.save_item(record, known_identifiers).await?;
        }
        Ok(())
    }

    /// Cover images live with the raw data on the primary only.
    async fn save_cover_asset(&self, uri: &str, identifier: &str) -> Result<()> {
        self.primary.save_cover_asset(uri, identifier).await
    }

    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>> {
        self.reader().satisfied_references(threshold).await
    }

    async fn known_identifiers(&self) -> Result<HashSet<String>> {
        self.reader().known_identifiers().await
    }

    async fn known_feedback_authors(&self, identifier: &str) -> Result<HashSet<String>> {
        self.reader().known_feedback_authors(identifier).await
    }

    async fn load_item(&self, identifier: &str) -> Result<Option<ItemRecord>> {
        self.reader().load_item(identifier).await
    }
}
