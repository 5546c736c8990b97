//! Cover image fetching.
//!
//! `http://` and `https://` URIs are downloaded with `reqwest`; `file://`
//! URIs and bare paths are read from disk, which is how snapshot catalogs
//! ship their covers.

use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
}

impl AssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let resp = self
                .client
                .get(uri)
                .send()
                .await
                .with_context(|| format!("Failed to fetch {}", uri))?;
            if !resp.status().is_success() {
                bail!("GET {} failed (HTTP {})", uri, resp.status());
            }
            return Ok(resp.bytes().await?.to_vec());
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read cover asset {}", path))
    }
}
