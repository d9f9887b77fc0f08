// SPDX-License-Identifier: GPL-3.0-only

//! Instance metadata lookups
//!
//! The metadata service is link-local and usually answers instantly, but
//! it can lag behind early boot. Lookups are retried a few times and then
//! reported as absent; callers decide what "absent" means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::{Result, SysError};

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Value stored under `key`, or `None` if it could not be fetched
    async fn fetch(&self, key: &str) -> Option<String>;
}

/// HTTP client for the instance metadata endpoint
#[derive(Debug, Clone)]
pub struct MetadataClient {
    base_url: Url,
    client: reqwest::Client,
    attempts: u32,
    backoff: Duration,
}

impl MetadataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Url::join replaces the last segment unless the base ends in '/'
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base)
            .map_err(|e| SysError::InvalidArgument(format!("metadata url {base}: {e}")))?;
        // Link-local endpoint; never send it through an environment proxy
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            base_url,
            client,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        })
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn url_for(&self, key: &str) -> Option<Url> {
        self.base_url.join(key).ok()
    }

    async fn get(&self, url: Url) -> reqwest::Result<String> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn fetch(&self, key: &str) -> Option<String> {
        let Some(url) = self.url_for(key) else {
            warn!("Invalid metadata key: {}", key);
            return None;
        };

        for attempt in 1..=self.attempts {
            debug!("Fetching {} (attempt {}/{})", url, attempt, self.attempts);
            match self.get(url.clone()).await {
                Ok(body) => return Some(body),
                Err(e) if attempt < self.attempts => {
                    debug!("Failed to fetch {}: {}; sleeping and retrying", url, e);
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    debug!("Giving up on {} after {} attempts: {}", url, attempt, e);
                }
            }
        }

        None
    }
}
