//! Blocking HTTP page fetcher
//!
//! Retries timeouts, and can keep fetched pages in a cache directory for
//! offline re-runs.

use super::{with_retry, PageFetcher, RetryPolicy};
use crate::{ChessError, NetConfig, Result};
use std::path::{Path, PathBuf};

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
    /// Optional cache directory for fetched HTML
    cache_dir: Option<PathBuf>,
    /// If true, only use cache (no network requests)
    offline_only: bool,
}

impl HttpFetcher {
    pub fn new(config: &NetConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;

        Ok(HttpFetcher {
            client,
            retry: RetryPolicy::from_config(config),
            cache_dir: None,
            offline_only: false,
        })
    }

    /// Create fetcher with a cache directory
    pub fn with_cache<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = Some(cache_dir.as_ref().to_path_buf());
        self
    }

    /// Set offline-only mode (no network requests, cache must exist)
    pub fn offline_only(mut self, offline: bool) -> Self {
        self.offline_only = offline;
        self
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(cache_file_name(url)))
    }

    fn load_from_cache(&self, url: &str) -> Option<String> {
        let path = self.cache_path(url)?;
        if path.exists() {
            log::debug!("Loading from cache: {}", path.display());
            std::fs::read_to_string(&path).ok()
        } else {
            None
        }
    }

    fn save_to_cache(&self, url: &str, html: &str) -> Result<()> {
        if let Some(path) = self.cache_path(url) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, html)?;
            log::debug!("Saved to cache: {}", path.display());
        }
        Ok(())
    }

    /// One GET, with timeouts reported as transient errors
    fn get(&self, url: &str) -> Result<String> {
        log::debug!("Fetching {}", url);

        let response = self.client.get(url).send().map_err(|e| classify(e, url))?;

        if !response.status().is_success() {
            return Err(ChessError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response.text().map_err(|e| classify(e, url))
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        if let Some(html) = self.load_from_cache(url) {
            return Ok(html);
        }

        if self.offline_only {
            return Err(ChessError::Offline {
                url: url.to_string(),
            });
        }

        let html = with_retry(|| self.get(url), self.retry)?;

        if let Err(e) = self.save_to_cache(url, &html) {
            log::warn!("Failed to cache {}: {}", url, e);
        }

        Ok(html)
    }
}

fn classify(e: reqwest::Error, url: &str) -> ChessError {
    if e.is_timeout() {
        ChessError::Timeout {
            url: url.to_string(),
        }
    } else {
        ChessError::Http(e)
    }
}

/// Create a safe filename from the URL
fn cache_file_name(url: &str) -> String {
    url.replace("https://", "")
        .replace("http://", "")
        .replace(['/', '?', '&', '='], "_")
        + ".html"
}
