//! HTTP Cache implementation.
//!
//! Chromium mapping: net/http/http_cache.h (two-tier version)
//!
//! Provides a response cache with:
//! - A memory tier holding body, headers, expiry and an optional alt-object
//! - A persistent tier in a [`BlobStore`], one record per URL
//! - Promotion of persistent-only hits into memory
//! - Best-effort semantics: store failures never fail a request

use crate::http::cachepolicy::{compute_expiry, Expiry};
use crate::http::diskcache::{decode_cache_record, encode_cache_record, filter_headers, BlobStore};
use crate::http::orderedheaders::OrderedHeaderMap;
use bytes::Bytes;
use dashmap::DashMap;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use url::Url;

/// Headers a 304 may refresh on the stored response.
const REVALIDATION_HEADERS: &[&str] = &["date", "expires", "cache-control", "etag", "last-modified"];

/// Payload of an alternate object.
#[derive(Clone)]
pub enum AltKind {
    /// Serialized representation.
    Bytes(Bytes),
    /// Opaque handle to an already-built representation.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for AltKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AltKind::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            AltKind::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

/// Pre-built representation cached next to the raw body. The cache never
/// looks inside; `size` is only used for eviction accounting.
#[derive(Debug, Clone)]
pub struct AltObject {
    pub kind: AltKind,
    pub size: usize,
}

impl AltObject {
    pub fn bytes(data: Bytes) -> Self {
        let size = data.len();
        Self {
            kind: AltKind::Bytes(data),
            size,
        }
    }

    pub fn shared(handle: Arc<dyn Any + Send + Sync>, size: usize) -> Self {
        Self {
            kind: AltKind::Shared(handle),
            size,
        }
    }
}

/// Cached response entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Decoded response body
    pub body: Bytes,
    /// Response headers, hop-by-hop and encoding headers removed
    pub headers: OrderedHeaderMap,
    /// `None` when no expiry could be computed; such entries are stale.
    pub expiry: Option<Expiry>,
    /// Only ever present in the memory tier.
    pub alt_object: Option<AltObject>,
    /// When the request that produced this entry was made
    pub request_time: OffsetDateTime,
}

impl CacheEntry {
    fn charge(&self) -> usize {
        self.body.len() + self.alt_object.as_ref().map_or(0, |a| a.size)
    }

    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.expiry.is_some_and(|e| e.is_fresh(now))
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub entry: CacheEntry,
    /// False when the entry was read from the persistent tier only.
    pub in_memory: bool,
}

/// Two-tier HTTP cache.
///
/// Thread-safe implementation using DashMap for the memory tier.
/// Enforces entry and size limits with oldest-first eviction.
pub struct HttpCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    current_size: AtomicUsize,
    max_size_bytes: usize,
    blobs: Option<Arc<dyn BlobStore>>,
    default_offset: Option<Duration>,
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCache")
            .field("entries", &self.entries.len())
            .field("size_bytes", &self.size_bytes())
            .field("persistent", &self.blobs.is_some())
            .finish()
    }
}

/// Cache key: the URL without its fragment.
pub fn cache_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.into()
}

impl HttpCache {
    /// Create a memory-only cache with default limits.
    pub fn new() -> Self {
        Self::with_limits(1000, 50 * 1024 * 1024)
    }

    /// Create a cache with custom limits.
    pub fn with_limits(max_entries: usize, max_size_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            current_size: AtomicUsize::new(0),
            max_size_bytes,
            blobs: None,
            default_offset: None,
        }
    }

    /// Back the cache with a persistent blob store.
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Freshness granted to responses without explicit expiry headers.
    pub fn with_default_offset(mut self, offset: Option<Duration>) -> Self {
        self.default_offset = offset;
        self
    }

    pub fn default_offset(&self) -> Option<Duration> {
        self.default_offset
    }

    /// Look up the entry for `url`, memory first.
    ///
    /// Persistent read failures are logged and reported as a miss.
    pub fn lookup(&self, url: &Url) -> Option<CachedResponse> {
        let key = cache_key(url);
        if let Some(entry) = self.entries.get(&key) {
            return Some(CachedResponse {
                entry: entry.clone(),
                in_memory: true,
            });
        }

        let blobs = self.blobs.as_ref()?;
        let raw = match blobs.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(url = %key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match decode_cache_record(&raw) {
            Ok(record) => {
                let expiry = compute_expiry(&record.headers, record.request_time, self.default_offset);
                Some(CachedResponse {
                    entry: CacheEntry {
                        body: record.body,
                        headers: record.headers,
                        expiry,
                        alt_object: None,
                        request_time: record.request_time,
                    },
                    in_memory: false,
                })
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "corrupt cache record, treating as miss");
                None
            }
        }
    }

    /// Store a completed response in both tiers.
    pub fn store_response(
        &self,
        url: &Url,
        headers: &OrderedHeaderMap,
        body: Bytes,
        expiry: Option<Expiry>,
        alt_object: Option<AltObject>,
        request_time: OffsetDateTime,
    ) {
        let entry = CacheEntry {
            body,
            headers: filter_headers(headers),
            expiry,
            alt_object,
            request_time,
        };
        self.write_persistent(url, &entry);
        self.insert_memory(cache_key(url), entry);
    }

    /// Refresh an entry after a 304.
    ///
    /// Validator and freshness headers from the 304 replace the stored ones,
    /// the request time moves forward and the entry is written back to both
    /// tiers, promoting a persistent-only hit into memory.
    pub fn revalidation_hit(
        &self,
        url: &Url,
        cached: CachedResponse,
        not_modified: &OrderedHeaderMap,
        request_time: OffsetDateTime,
    ) -> CacheEntry {
        let mut entry = cached.entry;
        for &name in REVALIDATION_HEADERS {
            if !not_modified.contains(name) {
                continue;
            }
            entry.headers.remove(name);
            for value in not_modified.get_all(name) {
                entry
                    .headers
                    .append_header(http::HeaderName::from_static(name), value.clone());
            }
        }
        entry.request_time = request_time;
        entry.expiry = compute_expiry(&entry.headers, request_time, self.default_offset);

        self.write_persistent(url, &entry);
        self.insert_memory(cache_key(url), entry.clone());
        tracing::debug!(url = %url, promoted = !cached.in_memory, "cache entry revalidated");
        entry
    }

    /// Put an entry read from the persistent tier into memory.
    pub fn promote(&self, url: &Url, entry: CacheEntry) {
        self.insert_memory(cache_key(url), entry);
    }

    /// Remove an entry from both tiers.
    pub fn remove(&self, url: &Url) {
        let key = cache_key(url);
        self.remove_by_key(&key);
        if let Some(blobs) = &self.blobs {
            if let Err(e) = blobs.delete(&key) {
                tracing::warn!(url = %key, error = %e, "failed to delete cache record");
            }
        }
    }

    /// Clear the memory tier.
    pub fn clear(&self) {
        self.entries.clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Get the number of entries in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the memory tier is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes charged to the memory tier, alt-objects included.
    pub fn size_bytes(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }

    fn write_persistent(&self, url: &Url, entry: &CacheEntry) {
        let Some(blobs) = &self.blobs else {
            return;
        };
        let record = encode_cache_record(&entry.headers, entry.request_time, &entry.body);
        if let Err(e) = blobs.put(&cache_key(url), &record) {
            tracing::warn!(url = %url, error = %e, "cache write failed");
        }
    }

    fn insert_memory(&self, key: String, entry: CacheEntry) {
        self.remove_by_key(&key);
        let charge = entry.charge();
        if charge > self.max_size_bytes {
            tracing::debug!(url = %key, size = charge, "entry larger than memory cache");
            return;
        }
        self.maybe_evict(charge);
        self.current_size.fetch_add(charge, Ordering::Relaxed);
        // A concurrent store of the same key may have landed since the
        // removal above; its charge leaves with it.
        if let Some(replaced) = self.entries.insert(key, entry) {
            self.current_size
                .fetch_sub(replaced.charge(), Ordering::Relaxed);
        }
    }

    /// Evict entries if needed to make room.
    fn maybe_evict(&self, new_entry_size: usize) {
        while self.entries.len() >= self.max_entries && !self.entries.is_empty() {
            self.evict_one();
        }

        while self.current_size.load(Ordering::Relaxed) + new_entry_size > self.max_size_bytes
            && !self.entries.is_empty()
        {
            self.evict_one();
        }
    }

    /// Evict the entry with the oldest request time.
    fn evict_one(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().request_time)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            tracing::debug!(url = %key, "evicting cache entry");
            self.remove_by_key(&key);
        }
    }

    fn remove_by_key(&self, key: &str) {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.current_size
                .fetch_sub(entry.charge(), Ordering::Relaxed);
        }
    }
}
