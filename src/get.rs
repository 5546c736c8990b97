//! Item retrieval by identifier.
//!
//! Reads a stored record (attributes plus every feedback entry on file)
//! through the same read path the harvester uses.

use anyhow::{bail, Result};

use shelf_harvest_core::models::ItemRecord;
use shelf_harvest_core::store::ItemStore;

use crate::config::Config;
use crate::stores;

pub async fn get_item(config: &Config, identifier: &str) -> Result<ItemRecord> {
    let store = stores::open_store(config).await?;
    match store.load_item(identifier).await? {
        Some(record) => Ok(record),
        None => bail!("item not found: {}", identifier),
    }
}

/// CLI entry point: prints the record as pretty JSON on stdout.
pub async fn run_get(config: &Config, identifier: &str) -> Result<()> {
    let record = get_item(config, identifier).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
