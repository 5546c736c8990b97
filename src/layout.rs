//! Raw-data object layout shared by the local and cloud stores.
//!
//! ```text
//! raw_data/
//!   <identifier>/
//!     data.json                 item attributes
//!     <identifier>.jpg          cover image
//!     reviews/
//!       <author-key>.json       one feedback entry per author
//! ```
//!
//! Author keys are the first 16 hex digits of the SHA-256 of the author
//! name, so arbitrary display names map to safe file names.

use sha2::{Digest, Sha256};

use shelf_harvest_core::error::{HarvestError, Result};

pub const RAW_DATA: &str = "raw_data";
pub const DATA_FILE: &str = "data.json";
pub const REVIEWS_DIR: &str = "reviews";

pub fn author_key(author: &str) -> String {
    let digest = Sha256::digest(author.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Reject identifiers that cannot be used as a single path segment.
pub fn checked_identifier<'a>(backend: &str, identifier: &'a str) -> Result<&'a str> {
    let bad = identifier.is_empty()
        || identifier == "."
        || identifier == ".."
        || identifier.contains(['/', '\\']);
    if bad {
        return Err(HarvestError::storage(
            backend,
            anyhow::anyhow!("identifier '{}' is not a valid path segment", identifier),
        ));
    }
    Ok(identifier)
}

/// `raw_data/<id>/data.json`, relative to the store root.
pub fn data_key(identifier: &str) -> String {
    format!("{}/{}/{}", RAW_DATA, identifier, DATA_FILE)
}

pub fn reviews_prefix(identifier: &str) -> String {
    format!("{}/{}/{}/", RAW_DATA, identifier, REVIEWS_DIR)
}

pub fn review_key(identifier: &str, author: &str) -> String {
    format!("{}{}.json", reviews_prefix(identifier), author_key(author))
}

pub fn cover_key(identifier: &str) -> String {
    format!("{}/{}/{}.jpg", RAW_DATA, identifier, identifier)
}
