use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Proxy};

use super::parser::{parse_feed, ParsedFeed};
use crate::config::{AppConfig, FetchConfig};
use crate::{Error, Result};

/// Anything that can turn a feed URL into a parsed document.
///
/// The scheduler only depends on this capability; [`FeedFetcher`] is the
/// HTTP implementation.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed>;
}

/// Single-shot HTTP feed fetcher. It never retries; the next scheduler
/// tick is the only retry.
pub struct FeedFetcher {
    client: Client,
    max_feed_bytes: usize,
}

impl FeedFetcher {
    /// Create a new feed fetcher with configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Self::build_client(&config.fetch)?;

        Ok(Self {
            client,
            max_feed_bytes: config.fetch.max_feed_bytes,
        })
    }

    /// Build HTTP client with timeout, identity and optional proxy
    fn build_client(config: &FetchConfig) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .default_headers(Self::build_headers())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = config.proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8",
            ),
        );
        headers
    }

    /// Download a feed body, failing on transport errors, non-2xx statuses
    /// and oversized responses
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchFailed(format!("HTTP {} for URL: {}", status, url)));
        }

        if let Some(length) = response.content_length() {
            self.ensure_content_size(length as usize, url)?;
        }

        let body = response.bytes().await.map_err(|e| transport_error(url, e))?;
        self.ensure_content_size(body.len(), url)?;

        Ok(body)
    }

    fn ensure_content_size(&self, size: usize, url: &str) -> Result<()> {
        if size > self.max_feed_bytes {
            return Err(Error::FetchFailed(format!(
                "Feed too large ({} bytes) for URL: {}",
                size, url
            )));
        }
        Ok(())
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchFailed(format!("Request timed out for URL: {}", url))
    } else {
        Error::FetchFailed(format!("Request failed for URL {}: {}", url, err))
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        tracing::debug!("Fetching feed from: {}", url);

        let content = self.fetch_bytes(url).await?;
        parse_feed(&content)
    }
}
