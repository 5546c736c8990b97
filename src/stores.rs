//! Store assembly from configuration.
//!
//! `[storage].backend` selects the primary (`local` or `cloud`); an optional
//! `[mirror]` adds the SQLite relational mirror. Both are wrapped in a
//! [`MirroredStore`].

use anyhow::{Context, Result};

use shelf_harvest_core::error::HarvestError;
use shelf_harvest_core::store::mirrored::MirroredStore;
use shelf_harvest_core::store::ItemStore;

use crate::assets::AssetFetcher;
use crate::config::Config;
use crate::local_store::LocalStore;
use crate::s3_store::S3Store;
use crate::sqlite_store::SqliteStore;

pub fn primary_store(config: &Config) -> Result<Box<dyn ItemStore>> {
    let assets = AssetFetcher::new(config.harvest.navigation_timeout())?;
    match config.storage.backend.as_str() {
        "local" => {
            let local = config
                .storage
                .local
                .as_ref()
                .context("storage.local.root is not configured")?;
            Ok(Box::new(LocalStore::new(&local.root, assets)))
        }
        "cloud" => {
            let cloud = config
                .storage
                .cloud
                .as_ref()
                .context("storage.cloud is not configured")?;
            Ok(Box::new(S3Store::from_env(cloud.clone(), assets)?))
        }
        other => Err(HarvestError::UnknownBackend(other.to_string()).into()),
    }
}

pub async fn mirror_store(config: &Config) -> Result<Option<SqliteStore>> {
    match &config.mirror {
        Some(mirror) => Ok(Some(SqliteStore::open(&mirror.path).await.with_context(
            || format!("Failed to open mirror database: {}", mirror.path.display()),
        )?)),
        None => Ok(None),
    }
}

/// The primary store plus the mirror, when one is configured.
pub async fn open_store(config: &Config) -> Result<MirroredStore> {
    let primary = primary_store(config)?;
    let mirror = mirror_store(config)
        .await?
        .map(|m| Box::new(m) as Box<dyn ItemStore>);
    Ok(MirroredStore::new(primary, mirror))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalStorageConfig, MirrorConfig, SourceConfig, StorageConfig};
    use shelf_harvest_core::HarvestPolicy;
    use tempfile::TempDir;

    fn config(backend: &str, tmp: &TempDir, mirror: bool) -> Config {
        Config {
            storage: StorageConfig {
                backend: backend.to_string(),
                local: Some(LocalStorageConfig {
                    root: tmp.path().join("data"),
                }),
                cloud: None,
            },
            mirror: mirror.then(|| MirrorConfig {
                path: tmp.path().join("mirror.sqlite"),
            }),
            source: SourceConfig {
                catalog: tmp.path().join("catalog.json"),
            },
            harvest: HarvestPolicy::default(),
        }
    }

    #[tokio::test]
    async fn test_local_with_mirror() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&config("local", &tmp, true)).await.unwrap();
        assert_eq!(store.primary().backend_name(), "local");
        assert_eq!(store.mirror().map(|m| m.backend_name()), Some("sqlite"));
        assert!(tmp.path().join("mirror.sqlite").exists());
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let tmp = TempDir::new().unwrap();
        let err = open_store(&config("ftp", &tmp, false)).await.err().unwrap();
        let harvest = err.downcast_ref::<HarvestError>().unwrap();
        assert!(matches!(harvest, HarvestError::UnknownBackend(b) if b == "ftp"));
    }
}
