//! Local filesystem [`ItemStore`].
//!
//! Items live under `<root>/raw_data/` in the layout described in
//! [`crate::layout`]. Files are written to a temporary name and renamed into
//! place, so a reader never sees a half-written JSON document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use shelf_harvest_core::error::{HarvestError, Result};
use shelf_harvest_core::models::{FeedbackEntry, Item, ItemRecord};
use shelf_harvest_core::store::ItemStore;

use crate::assets::AssetFetcher;
use crate::layout;

const BACKEND: &str = "local";

fn storage_err(e: impl Into<anyhow::Error>) -> HarvestError {
    HarvestError::storage(BACKEND, e)
}

pub struct LocalStore {
    root: PathBuf,
    assets: AssetFetcher,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, assets: AssetFetcher) -> Self {
        Self {
            root: root.into(),
            assets,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(storage_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(storage_err)?;
        Ok(())
    }

    async fn read_item(&self, identifier: &str) -> Result<Option<Item>> {
        let path = self.path(&layout::data_key(identifier));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(storage_err)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn read_feedback(&self, identifier: &str) -> Result<Vec<FeedbackEntry>> {
        let dir = self.path(&layout::reviews_prefix(identifier));
        let mut entries = Vec::new();
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(storage_err(e)),
        };
        while let Some(dirent) = rd.next_entry().await.map_err(storage_err)? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(storage_err)?;
            entries.push(serde_json::from_slice::<FeedbackEntry>(&bytes).map_err(storage_err)?);
        }
        // Directory order is unspecified.
        entries.sort_by(|a, b| a.author.cmp(&b.author));
        Ok(entries)
    }

    async fn review_count(&self, identifier: &str) -> Result<usize> {
        let dir = self.path(&layout::reviews_prefix(identifier));
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(storage_err(e)),
        };
        let mut n = 0;
        while let Some(dirent) = rd.next_entry().await.map_err(storage_err)? {
            if dirent.path().extension().and_then(|e| e.to_str()) == Some("json") {
                n += 1;
            }
        }
        Ok(n)
    }
}

#[async_trait]
impl ItemStore for LocalStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn save_item(
        &self,
        record: &ItemRecord,
        known_identifiers: &HashSet<String>,
    ) -> Result<()> {
        let id = layout::checked_identifier(BACKEND, record.identifier())?;

        let data_path = self.path(&layout::data_key(id));
        if !known_identifiers.contains(id) && !data_path.exists() {
            let json = serde_json::to_vec_pretty(&record.item).map_err(storage_err)?;
            self.write_atomic(&data_path, &json).await?;
        }

        for entry in &record.feedback {
            let path = self.path(&layout::review_key(id, &entry.author));
            if path.exists() {
                continue;
            }
            let json = serde_json::to_vec_pretty(entry).map_err(storage_err)?;
            self.write_atomic(&path, &json).await?;
        }
        Ok(())
    }

    async fn save_cover_asset(&self, uri: &str, identifier: &str) -> Result<()> {
        let id = layout::checked_identifier(BACKEND, identifier)?;
        let bytes = match self.assets.fetch(uri).await {
            Ok(b) => b,
            Err(e) => {
                warn!(identifier = id, uri, error = %e, "failed to fetch cover");
                return Ok(());
            }
        };
        if let Err(e) = self.write_atomic(&self.path(&layout::cover_key(id)), &bytes).await {
            warn!(identifier = id, error = %e, "failed to write cover");
        }
        Ok(())
    }

    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>> {
        let mut satisfied = HashSet::new();
        for id in self.known_identifiers().await? {
            if self.review_count(&id).await? < threshold {
                continue;
            }
            if let Some(item) = self.read_item(&id).await? {
                satisfied.insert(item.source_reference);
            }
        }
        Ok(satisfied)
    }

    async fn known_identifiers(&self) -> Result<HashSet<String>> {
        let raw = self.path(layout::RAW_DATA);
        let mut ids = HashSet::new();
        let mut rd = match tokio::fs::read_dir(&raw).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(storage_err(e)),
        };
        while let Some(dirent) = rd.next_entry().await.map_err(storage_err)? {
            if !dirent.path().join(layout::DATA_FILE).exists() {
                continue;
            }
            if let Some(name) = dirent.file_name().to_str() {
                ids.insert(name.to_string());
            }
        }
        Ok(ids)
    }

    async fn known_feedback_authors(&self, identifier: &str) -> Result<HashSet<String>> {
        let id = layout::checked_identifier(BACKEND, identifier)?;
        Ok(self
            .read_feedback(id)
            .await?
            .into_iter()
            .map(|e| e.author)
            .collect())
    }

    async fn load_item(&self, identifier: &str) -> Result<Option<ItemRecord>> {
        let id = layout::checked_identifier(BACKEND, identifier)?;
        let Some(item) = self.read_item(id).await? else {
            return Ok(None);
        };
        let feedback = self.read_feedback(id).await?;
        Ok(Some(ItemRecord::new(item, feedback)))
    }
}
