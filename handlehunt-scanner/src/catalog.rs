// Site catalog acquisition: the WhatsMyName dataset, over HTTP or from disk

use crate::error::{Result, ScanError};
use crate::site::SiteDefinition;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/WebBreacher/WhatsMyName/main/wmn-data.json";

/// Anything that can hand the engine a list of sites.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fails with [`ScanError::CatalogUnavailable`] when the dataset cannot be
    /// retrieved or parsed as a whole.
    async fn fetch_catalog(&self) -> Result<Vec<SiteDefinition>>;
}

#[derive(Deserialize)]
struct CatalogDocument {
    sites: Vec<serde_json::Value>,
}

/// Parse a `wmn-data.json` document.
///
/// Entries that do not deserialize or fail [`SiteDefinition::validate`] are
/// skipped one by one; only a document without a `sites` array is an error.
pub fn parse_catalog(raw: &str) -> Result<Vec<SiteDefinition>> {
    let document: CatalogDocument = serde_json::from_str(raw)
        .map_err(|e| ScanError::CatalogUnavailable(format!("malformed catalog document: {}", e)))?;

    let total = document.sites.len();
    let mut sites = Vec::with_capacity(total);
    for (idx, entry) in document.sites.into_iter().enumerate() {
        let site = match serde_json::from_value::<SiteDefinition>(entry) {
            Ok(site) => site,
            Err(e) => {
                warn!("Skipping catalog entry #{}: {}", idx, e);
                continue;
            }
        };
        if let Err(e) = site.validate() {
            warn!("Skipping catalog entry #{}: {}", idx, e);
            continue;
        }
        sites.push(site);
    }

    debug!("Parsed {} of {} catalog entries", sites.len(), total);
    Ok(sites)
}

/// Fetches the catalog over HTTP.
pub struct RemoteCatalog {
    client: Client,
    url: String,
}

impl RemoteCatalog {
    pub fn new() -> Result<Self> {
        Self::with_url(DEFAULT_CATALOG_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("handlehunt/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CatalogSource for RemoteCatalog {
    async fn fetch_catalog(&self) -> Result<Vec<SiteDefinition>> {
        info!("Fetching site catalog from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ScanError::CatalogUnavailable(format!("request to {} failed: {}", self.url, e)))?;

        if response.status() != StatusCode::OK {
            return Err(ScanError::CatalogUnavailable(format!(
                "{} returned status {}",
                self.url,
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScanError::CatalogUnavailable(format!("reading {} failed: {}", self.url, e)))?;

        let sites = parse_catalog(&body)?;
        info!("Retrieved {} sites from catalog", sites.len());
        Ok(sites)
    }
}

/// Reads the catalog from a local copy of the dataset.
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CatalogSource for FileCatalog {
    async fn fetch_catalog(&self) -> Result<Vec<SiteDefinition>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ScanError::CatalogUnavailable(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        parse_catalog(&raw)
    }
}
