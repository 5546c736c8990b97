//! Amazon S3 [`ItemStore`].
//!
//! Stores items in a bucket using the same `raw_data/` layout as the local
//! store (see [`crate::layout`]), under an optional key prefix. Talks to the
//! S3 REST API directly with AWS Signature V4 authentication; custom
//! endpoints (MinIO, LocalStack) are addressed path-style.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "cloud"
//!
//! [storage.cloud]
//! bucket = "book-harvest"
//! prefix = "shelf"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)
//!
//! # Authentication
//!
//! All requests are signed using
//! [AWS Signature Version 4](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-auth-using-authorization-header.html)
//! with HMAC-SHA256 (`hmac` + `sha2` crates).

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use shelf_harvest_core::error::{HarvestError, Result};
use shelf_harvest_core::models::{FeedbackEntry, Item, ItemRecord};
use shelf_harvest_core::store::ItemStore;

use crate::assets::AssetFetcher;
use crate::config::CloudStorageConfig;
use crate::layout;

const BACKEND: &str = "cloud";

type HmacSha256 = Hmac<Sha256>;

fn storage_err(e: impl Into<anyhow::Error>) -> HarvestError {
    HarvestError::storage(BACKEND, e)
}

// ============ AWS Credentials ============

/// AWS credentials loaded from environment variables.
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Store ============

pub struct S3Store {
    config: CloudStorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
    assets: AssetFetcher,
}

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Default, PartialEq)]
struct ListPage {
    keys: Vec<String>,
    is_truncated: bool,
    next_token: Option<String>,
}

impl S3Store {
    pub fn new(config: CloudStorageConfig, creds: AwsCredentials, assets: AssetFetcher) -> Self {
        Self {
            config,
            creds,
            client: reqwest::Client::new(),
            assets,
        }
    }

    pub fn from_env(config: CloudStorageConfig, assets: AssetFetcher) -> anyhow::Result<Self> {
        Ok(Self::new(config, AwsCredentials::from_env()?, assets))
    }

    /// Full object key for a layout-relative key.
    fn object_key(&self, key: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    /// Layout-relative key for a full object key.
    fn relative_key<'a>(&self, object_key: &'a str) -> &'a str {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            object_key
        } else {
            object_key
                .strip_prefix(prefix)
                .map(|s| s.trim_start_matches('/'))
                .unwrap_or(object_key)
        }
    }

    /// Build, sign and send a request. `key` is a full object key; `None`
    /// addresses the bucket itself.
    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(String, String)],
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> anyhow::Result<reqwest::Response> {
        let (scheme, host, path_style) = s3_endpoint(&self.config);

        let encoded_key = key
            .map(|k| k.split('/').map(uri_encode).collect::<Vec<_>>().join("/"))
            .unwrap_or_default();
        let canonical_uri = match (path_style, key) {
            (true, Some(_)) => format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key),
            (true, None) => format!("/{}", uri_encode(&self.config.bucket)),
            (false, _) => format!("/{}", encoded_key),
        };

        let mut sorted_params = query.to_vec();
        sorted_params.sort();
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_querystring,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut url = format!("{}://{}{}", scheme, host, canonical_uri);
        if !canonical_querystring.is_empty() {
            url.push('?');
            url.push_str(&canonical_querystring);
        }

        let mut req = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if let Some(ct) = content_type {
            req = req.header("Content-Type", ct);
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        req.send().await.map_err(|e| {
            anyhow::anyhow!(
                "S3 {} s3://{}/{} failed: {}",
                method,
                self.config.bucket,
                key.unwrap_or(""),
                e
            )
        })
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let full = self.object_key(key);
        let resp = self
            .send(Method::PUT, Some(&full), &[], body, Some(content_type))
            .await
            .map_err(storage_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(storage_err(anyhow::anyhow!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                full,
                text.chars().take(500).collect::<String>()
            )));
        }
        Ok(())
    }

    /// `None` when the object does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full = self.object_key(key);
        let resp = self
            .send(Method::GET, Some(&full), &[], Vec::new(), None)
            .await
            .map_err(storage_err)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(storage_err(anyhow::anyhow!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                full
            )));
        }
        Ok(Some(resp.bytes().await.map_err(storage_err)?.to_vec()))
    }

    /// Every layout-relative key under `key_prefix`, following continuation
    /// tokens.
    async fn list_keys(&self, key_prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.object_key(key_prefix);
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
                ("prefix".to_string(), full_prefix.clone()),
            ];
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self
                .send(Method::GET, None, &query, Vec::new(), None)
                .await
                .map_err(storage_err)?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(storage_err(anyhow::anyhow!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let xml = resp.bytes().await.map_err(storage_err)?;
            let page = parse_list_objects_response(&xml).map_err(storage_err)?;
            keys.extend(
                page.keys
                    .iter()
                    .map(|k| self.relative_key(k).to_string()),
            );

            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }

    /// Review object counts per identifier, plus the identifiers that have
    /// a `data.json`.
    async fn scan_raw_data(&self) -> Result<(HashSet<String>, HashMap<String, usize>)> {
        let mut ids = HashSet::new();
        let mut reviews: HashMap<String, usize> = HashMap::new();
        let prefix = format!("{}/", layout::RAW_DATA);
        for key in self.list_keys(&prefix).await? {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let mut parts = rest.splitn(2, '/');
            let (Some(id), Some(tail)) = (parts.next(), parts.next()) else {
                continue;
            };
            if tail == layout::DATA_FILE {
                ids.insert(id.to_string());
            } else if tail.starts_with(layout::REVIEWS_DIR) && tail.ends_with(".json") {
                *reviews.entry(id.to_string()).or_default() += 1;
            }
        }
        Ok((ids, reviews))
    }

    async fn read_item(&self, identifier: &str) -> Result<Option<Item>> {
        match self.get_object(&layout::data_key(identifier)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn read_feedback(&self, identifier: &str) -> Result<Vec<FeedbackEntry>> {
        let mut entries = Vec::new();
        for key in self.list_keys(&layout::reviews_prefix(identifier)).await? {
            if let Some(bytes) = self.get_object(&key).await? {
                entries.push(serde_json::from_slice::<FeedbackEntry>(&bytes).map_err(storage_err)?);
            }
        }
        entries.sort_by(|a, b| a.author.cmp(&b.author));
        Ok(entries)
    }
}

#[async_trait]
impl ItemStore for S3Store {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn save_item(
        &self,
        record: &ItemRecord,
        known_identifiers: &HashSet<String>,
    ) -> Result<()> {
        let id = layout::checked_identifier(BACKEND, record.identifier())?;

        let existing: HashSet<String> = self
            .list_keys(&layout::reviews_prefix(id))
            .await?
            .into_iter()
            .collect();

        if !known_identifiers.contains(id) && self.get_object(&layout::data_key(id)).await?.is_none()
        {
            let json = serde_json::to_vec_pretty(&record.item).map_err(storage_err)?;
            self.put_object(&layout::data_key(id), json, "application/json")
                .await?;
        }

        for entry in &record.feedback {
            let key = layout::review_key(id, &entry.author);
            if existing.contains(&key) {
                continue;
            }
            let json = serde_json::to_vec_pretty(entry).map_err(storage_err)?;
            self.put_object(&key, json, "application/json").await?;
        }
        debug!(identifier = id, feedback = record.feedback.len(), "saved to s3");
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
        if let Err(e) = self
            .put_object(&layout::cover_key(id), bytes, "image/jpeg")
            .await
        {
            warn!(identifier = id, error = %e, "failed to upload cover");
        }
        Ok(())
    }

    async fn satisfied_references(&self, threshold: usize) -> Result<HashSet<String>> {
        let (ids, reviews) = self.scan_raw_data().await?;
        let mut satisfied = HashSet::new();
        for id in ids {
            if reviews.get(&id).copied().unwrap_or(0) < threshold {
                continue;
            }
            if let Some(item) = self.read_item(&id).await? {
                satisfied.insert(item.source_reference);
            }
        }
        Ok(satisfied)
    }

    async fn known_identifiers(&self) -> Result<HashSet<String>> {
        Ok(self.scan_raw_data().await?.0)
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

// ============ AWS SigV4 Helpers ============

/// Scheme, host and addressing style for the configured bucket.
///
/// With a custom `endpoint_url` the bucket goes in the path; otherwise
/// the standard virtual-hosted `<bucket>.s3.<region>.amazonaws.com` is used.
fn s3_endpoint(config: &CloudStorageConfig) -> (&'static str, String, bool) {
    match config.endpoint_url {
        Some(ref endpoint) => {
            let scheme = if endpoint.starts_with("http://") {
                "http"
            } else {
                "https"
            };
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string();
            (scheme, host, true)
        }
        None => (
            "https",
            format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
            false,
        ),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~` unescaped.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing ============

fn parse_list_objects_response(xml: &[u8]) -> anyhow::Result<ListPage> {
    use quick_xml::events::Event;

    let mut page = ListPage::default();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_contents = false;
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"Contents" {
                    in_contents = true;
                }
                current = Some(name);
            }
            Ok(Event::Text(te)) => {
                let text = te.unescape().unwrap_or_default().into_owned();
                match current.as_deref() {
                    Some(b"Key") if in_contents => {
                        if !text.ends_with('/') {
                            page.keys.push(text);
                        }
                    }
                    Some(b"IsTruncated") => page.is_truncated = text == "true",
                    Some(b"NextContinuationToken") => page.next_token = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    in_contents = false;
                }
                current = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("malformed ListObjectsV2 response: {}", e),
            _ => {}
        }
        buf.clear();
    }

    Ok(page)
}
