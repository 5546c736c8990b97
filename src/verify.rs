//! `shelf verify`: dual-store consistency check.
//!
//! Compares the primary store and the mirror for one identifier, or for
//! every identifier either side knows. A record present on only one side is
//! an integrity error; nothing is repaired.

use anyhow::Result;

use shelf_harvest_core::store::mirrored::Presence;

use crate::config::Config;
use crate::stores;

pub async fn run_verify(config: &Config, identifier: Option<&str>) -> Result<()> {
    let store = stores::open_store(config).await?;
    if store.mirror().is_none() {
        println!("no mirror configured; nothing to compare");
        return Ok(());
    }

    match identifier {
        Some(id) => match store.verify(id).await? {
            Presence::Both => println!("{}: present in both stores", id),
            Presence::Neither => println!("{}: not stored", id),
        },
        None => {
            let checked = store.verify_all().await?;
            println!("verified {} items", checked);
        }
    }
    println!("ok");
    Ok(())
}
