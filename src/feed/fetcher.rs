use futures::StreamExt;
use reqwest::redirect::Policy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{normalize_json, normalize_xml, ParseError};
use crate::net::{ConnectionKind, Reachability};
use crate::sources::{Registry, Source, SourceFormat};
use crate::storage::{Article, LocalStore};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Errors from a single endpoint attempt.
///
/// Everything except [`FetchError::Reachability`] is an endpoint failure:
/// the orchestrator logs it and moves on to the next candidate URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Payload could not be normalized
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Payload parsed but held no items
    #[error("Feed contained no items")]
    EmptyFeed,
    /// The network state could not be determined
    #[error("Reachability query failed: {0}")]
    Reachability(String),
}

/// Where the articles in a [`FetchOutcome`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Freshly fetched; the feed cache now holds the same list.
    Online,
    /// Served from the feed cache.
    Cache,
    /// Nothing could be served.
    Error,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Online => "online",
            Origin::Cache => "cache",
            Origin::Error => "error",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why cached data was served instead of a live fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Offline, or the wifi-only preference ruled out the current transport.
    NetworkUnavailable,
    /// Every candidate endpoint failed or was empty.
    SourceExhausted,
}

/// Result of [`Fetcher::fetch_news`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    pub origin: Origin,
    /// Set when `origin` is [`Origin::Cache`].
    pub fallback: Option<Fallback>,
}

impl FetchOutcome {
    fn online(articles: Vec<Article>) -> Self {
        Self {
            articles,
            origin: Origin::Online,
            fallback: None,
        }
    }

    fn cached(articles: Vec<Article>, fallback: Fallback) -> Self {
        Self {
            articles,
            origin: Origin::Cache,
            fallback: Some(fallback),
        }
    }

    fn error() -> Self {
        Self {
            articles: Vec::new(),
            origin: Origin::Error,
            fallback: None,
        }
    }
}

/// Build an HTTP client for feed endpoints.
///
/// `timeout` bounds each whole request. `accept_invalid_certs` is only for
/// sources registered with certificate verification off.
pub fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Per-source fetch orchestrator.
///
/// Holds the registry, the two HTTP clients, the reachability seam and the
/// store whose feed cache it reads and writes.
pub struct Fetcher {
    registry: Registry,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    reachability: Arc<dyn Reachability>,
    store: LocalStore,
}

impl Fetcher {
    pub fn new(
        registry: Registry,
        store: LocalStore,
        reachability: Arc<dyn Reachability>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            registry,
            client: build_client(timeout, false)?,
            insecure_client: build_client(timeout, true)?,
            reachability,
            store,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn reachability(&self) -> &dyn Reachability {
        self.reachability.as_ref()
    }

    /// Fetch articles for `source_id`.
    ///
    /// Unknown ids resolve to the default source. When the network is down,
    /// or `wifi_only` is set and the transport is not wifi, the cached list is
    /// returned without any request being made. Otherwise candidate URLs are
    /// tried in order; the first non-empty result replaces the cache entry and
    /// is returned as [`Origin::Online`]. If every candidate fails the cache is
    /// served instead.
    ///
    /// Never fails: a reachability error yields an empty list with
    /// [`Origin::Error`].
    pub async fn fetch_news(&self, wifi_only: bool, source_id: &str) -> FetchOutcome {
        let source = self.registry.resolve(source_id);

        let state = match self.reachability.network_state().await {
            Ok(state) => state,
            Err(e) => {
                let e = FetchError::Reachability(e.to_string());
                tracing::error!(source = %source.id, error = %e, "Fetch aborted");
                return FetchOutcome::error();
            }
        };

        let should_fetch = state.connected && (!wifi_only || state.kind == ConnectionKind::Wifi);
        if !should_fetch {
            tracing::info!(
                source = %source.id,
                connected = state.connected,
                kind = ?state.kind,
                wifi_only = wifi_only,
                "Network unavailable for fetching, serving cache"
            );
            let cached = self.store.get_feed_cache(&source.id).await;
            return FetchOutcome::cached(cached, Fallback::NetworkUnavailable);
        }

        for url in &source.urls {
            tracing::info!(source = %source.id, url = %url, "Fetching endpoint");
            match self.fetch_endpoint(source, url).await {
                Ok(articles) => {
                    tracing::info!(source = %source.id, url = %url, count = articles.len(), "Fetched articles");
                    self.store.save_feed_cache(&articles, &source.id).await;
                    return FetchOutcome::online(articles);
                }
                Err(FetchError::EmptyFeed) => {
                    tracing::debug!(source = %source.id, url = %url, "Endpoint returned no items, trying next");
                }
                Err(e) => {
                    tracing::warn!(source = %source.id, url = %url, error = %e, "Endpoint failed");
                }
            }
        }

        tracing::info!(source = %source.id, "All endpoints failed, serving cache");
        let cached = self.store.get_feed_cache(&source.id).await;
        FetchOutcome::cached(cached, Fallback::SourceExhausted)
    }

    /// One attempt against one candidate URL. An empty result is an error.
    async fn fetch_endpoint(&self, source: &Source, url: &str) -> Result<Vec<Article>, FetchError> {
        let client = if source.verify_cert {
            &self.client
        } else {
            &self.insecure_client
        };

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        let articles = match source.format {
            SourceFormat::Xml => normalize_xml(&String::from_utf8_lossy(&bytes), source)?,
            SourceFormat::Json => normalize_json(&bytes, source)?,
        };

        if articles.is_empty() {
            return Err(FetchError::EmptyFeed);
        }
        Ok(articles)
    }
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
