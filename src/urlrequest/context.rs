//! URL Request Context - Central configuration for network requests.
//!
//! Based on Chromium's net::URLRequestContext: one object, built at
//! startup, owning the cookie jar, the HTTP cache and the collaborators
//! every request uses.

use crate::base::neterror::NetError;
use crate::cookies::clock::CookieClock;
use crate::cookies::monster::CookieMonster;
use crate::cookies::persistence::CookieTable;
use crate::http::connection::HttpClient;
use crate::http::diskcache::BlobStore;
use crate::http::httpcache::HttpCache;
use crate::http::streamfactory::HyperClient;
use crate::socket::proxy::ProxySettings;
use crate::urlrequest::delegate::{AllowAll, NoopProgress, ProgressSink, RequestPermission};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Configuration options for URLRequestContext.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct URLRequestContextConfig {
    /// User-Agent string to use for requests.
    pub user_agent: String,

    /// Accept header value.
    pub accept: String,

    /// Accept-Language header value.
    pub accept_language: Option<String>,

    /// Accept-Encoding header value. Must only name encodings the
    /// HTTP client decodes.
    pub accept_encoding: String,

    /// Proxy settings (None for direct connections).
    #[serde(skip)]
    pub proxy: Option<ProxySettings>,

    /// Redirects followed before a request fails.
    pub max_redirects: usize,

    /// Largest body copied for the cache; bigger responses are not cached.
    pub max_recorded_body_bytes: usize,

    /// Freshness lifetime for responses without `Expires` or `max-age`.
    pub default_expiration_offset_secs: Option<i64>,

    /// Scheduled requests running at once.
    pub max_concurrent_requests: usize,

    /// Scheduled requests allowed to wait for a worker.
    pub max_queued_requests: usize,

    pub cache_max_entries: usize,

    pub cache_max_bytes: usize,

    /// Drop the cached entry for a URL when it answers with status >= 400.
    pub evict_cache_on_error: bool,
}

impl Default for URLRequestContextConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("pagenet/", env!("CARGO_PKG_VERSION")).to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .to_string(),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            accept_encoding: "gzip, deflate".to_string(),
            proxy: None,
            max_redirects: 30,
            max_recorded_body_bytes: 10 * 1024 * 1024,
            default_expiration_offset_secs: None,
            max_concurrent_requests: 3,
            max_queued_requests: 256,
            cache_max_entries: 1000,
            cache_max_bytes: 50 * 1024 * 1024,
            evict_cache_on_error: true,
        }
    }
}

impl std::fmt::Debug for URLRequestContextConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("URLRequestContextConfig")
            .field("user_agent", &self.user_agent)
            .field("accept_language", &self.accept_language)
            .field("accept_encoding", &self.accept_encoding)
            .field("proxy", &self.proxy.as_ref().map(|p| p.url.as_str()))
            .field("max_redirects", &self.max_redirects)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("max_queued_requests", &self.max_queued_requests)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("cache_max_bytes", &self.cache_max_bytes)
            .finish_non_exhaustive()
    }
}

impl URLRequestContextConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, NetError> {
        serde_json::from_str(json).map_err(|e| {
            tracing::debug!(error = %e, "invalid context config");
            NetError::InvalidArgument
        })
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    fn default_offset(&self) -> Option<time::Duration> {
        self.default_expiration_offset_secs.map(time::Duration::seconds)
    }
}

/// Central state shared by every request.
///
/// Mirrors Chromium's URLRequestContext, bundling together:
/// - The HTTP client collaborator
/// - Cookie store and HTTP cache
/// - Permission policy and progress sink
/// - Proxy settings and request header defaults
pub struct URLRequestContext {
    config: URLRequestContextConfig,
    client: Arc<dyn HttpClient>,
    cookie_store: Arc<CookieMonster>,
    http_cache: Arc<HttpCache>,
    permission: Arc<dyn RequestPermission>,
    progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for URLRequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("URLRequestContext")
            .field("config", &self.config)
            .field("cookie_store", &self.cookie_store)
            .field("http_cache", &self.http_cache)
            .finish_non_exhaustive()
    }
}

impl URLRequestContext {
    /// Context with default configuration and collaborators.
    pub fn new() -> Arc<Self> {
        URLRequestContextBuilder::new().build()
    }

    pub fn builder() -> URLRequestContextBuilder {
        URLRequestContextBuilder::new()
    }

    pub fn config(&self) -> &URLRequestContextConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    pub fn cookie_store(&self) -> &Arc<CookieMonster> {
        &self.cookie_store
    }

    pub fn http_cache(&self) -> &Arc<HttpCache> {
        &self.http_cache
    }

    pub fn permission(&self) -> &Arc<dyn RequestPermission> {
        &self.permission
    }

    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }

    /// The proxy to use for `url`, honoring bypass rules.
    pub fn proxy_for(&self, url: &Url) -> Option<&ProxySettings> {
        self.config
            .proxy
            .as_ref()
            .filter(|proxy| !proxy.should_bypass(url))
    }
}

/// Builder for [`URLRequestContext`].
pub struct URLRequestContextBuilder {
    config: URLRequestContextConfig,
    client: Option<Arc<dyn HttpClient>>,
    cookie_table: Option<Arc<dyn CookieTable>>,
    cookie_clock: Option<CookieClock>,
    blob_store: Option<Arc<dyn BlobStore>>,
    permission: Arc<dyn RequestPermission>,
    progress: Arc<dyn ProgressSink>,
}

impl Default for URLRequestContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl URLRequestContextBuilder {
    pub fn new() -> Self {
        Self {
            config: URLRequestContextConfig::default(),
            client: None,
            cookie_table: None,
            cookie_clock: None,
            blob_store: None,
            permission: Arc::new(AllowAll),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn config(mut self, config: URLRequestContextConfig) -> Self {
        self.config = config;
        self
    }

    /// HTTP client; defaults to [`HyperClient`].
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Persistent table for non-session cookies.
    pub fn cookie_table(mut self, table: Arc<dyn CookieTable>) -> Self {
        self.cookie_table = Some(table);
        self
    }

    pub fn cookie_clock(mut self, clock: CookieClock) -> Self {
        self.cookie_clock = Some(clock);
        self
    }

    /// Persistent tier of the HTTP cache.
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn permission(mut self, permission: Arc<dyn RequestPermission>) -> Self {
        self.permission = permission;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> Arc<URLRequestContext> {
        let mut cookie_store = match self.cookie_table {
            Some(table) => CookieMonster::with_table(table),
            None => CookieMonster::new(),
        };
        if let Some(clock) = self.cookie_clock {
            cookie_store = cookie_store.with_clock(clock);
        }

        let mut http_cache =
            HttpCache::with_limits(self.config.cache_max_entries, self.config.cache_max_bytes)
                .with_default_offset(self.config.default_offset());
        if let Some(store) = self.blob_store {
            http_cache = http_cache.with_blob_store(store);
        }

        Arc::new(URLRequestContext {
            client: self.client.unwrap_or_else(|| Arc::new(HyperClient::new())),
            cookie_store: Arc::new(cookie_store),
            http_cache: Arc::new(http_cache),
            permission: self.permission,
            progress: self.progress,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = URLRequestContextConfig::default();
        assert_eq!(config.max_redirects, 30);
        assert_eq!(config.max_concurrent_requests, 3);
        assert_eq!(config.max_recorded_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.accept_encoding, "gzip, deflate");
        assert!(config.evict_cache_on_error);
    }

    #[test]
    fn test_from_json_partial() {
        let config = URLRequestContextConfig::from_json_str(
            r#"{"user_agent": "test/1.0", "max_redirects": 5, "default_expiration_offset_secs": 60}"#,
        )
        .unwrap();
        assert_eq!(config.user_agent, "test/1.0");
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.default_offset(), Some(time::Duration::seconds(60)));
        assert_eq!(config.max_queued_requests, 256);
    }

    #[test]
    fn test_from_json_invalid() {
        assert_eq!(
            URLRequestContextConfig::from_json_str(r#"{"max_redirects": "many"}"#).unwrap_err(),
            NetError::InvalidArgument
        );
    }

    #[test]
    fn test_proxy_for_honors_bypass() {
        let proxy = ProxySettings::new("http://proxy.local:3128")
            .unwrap()
            .with_bypass("internal.corp");
        let context = URLRequestContext::builder()
            .config(URLRequestContextConfig::default().with_proxy(proxy))
            .build();

        let external = Url::parse("http://example.com/").unwrap();
        let internal = Url::parse("http://wiki.internal.corp/").unwrap();
        assert!(context.proxy_for(&external).is_some());
        assert!(context.proxy_for(&internal).is_none());
    }

    #[test]
    fn test_builder_applies_cache_config() {
        let config = URLRequestContextConfig {
            default_expiration_offset_secs: Some(30),
            ..Default::default()
        };
        let context = URLRequestContext::builder().config(config).build();
        assert_eq!(
            context.http_cache().default_offset(),
            Some(time::Duration::seconds(30))
        );
        assert!(context.http_cache().is_empty());
    }
}
