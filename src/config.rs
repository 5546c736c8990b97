//! TOML configuration.
//!
//! ```toml
//! [storage]
//! backend = "local"            # or "cloud"
//!
//! [storage.local]
//! root = "./data"
//!
//! [storage.cloud]
//! bucket = "book-harvest"
//! prefix = "shelf"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//!
//! [mirror]                     # optional relational mirror
//! path = "./data/shelf.sqlite"
//!
//! [source]
//! catalog = "./catalog.json"
//!
//! [harvest]
//! feedback_per_item = 10
//! error_margin = 0.05
//! banned_titles = ["Dungeons and Dragons"]
//! ```
//!
//! Cloud credentials come from the environment, never from this file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use shelf_harvest_core::HarvestPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
    pub source: SourceConfig,
    #[serde(default)]
    pub harvest: HarvestPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub local: Option<LocalStorageConfig>,
    #[serde(default)]
    pub cloud: Option<CloudStorageConfig>,
}

fn default_backend() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CloudStorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Snapshot catalog file (see [`crate::snapshot`]).
    pub catalog: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.storage.backend.as_str() {
        "local" => {
            if config.storage.local.is_none() {
                anyhow::bail!("storage.local.root must be set when backend is 'local'");
            }
        }
        "cloud" => match &config.storage.cloud {
            Some(cloud) if !cloud.bucket.trim().is_empty() => {}
            _ => anyhow::bail!("storage.cloud.bucket must be set when backend is 'cloud'"),
        },
        other => anyhow::bail!(
            "Unknown storage backend: '{}'. Must be local or cloud.",
            other
        ),
    }

    let harvest = &config.harvest;
    if !(0.0..1.0).contains(&harvest.error_margin) {
        anyhow::bail!("harvest.error_margin must be in [0.0, 1.0)");
    }
    if harvest.navigation_timeout_secs == 0 {
        anyhow::bail!("harvest.navigation_timeout_secs must be > 0");
    }

    Ok(())
}
