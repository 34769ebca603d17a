use crate::cookies::canonicalcookie::CanonicalCookie;
use crate::cookies::clock::CookieClock;
use crate::cookies::cookieutil::path_matches;
use crate::cookies::parsedcookie::ParsedCookie;
use crate::cookies::persistence::{CookieRow, CookieTable};
use crate::cookies::psl::{canonical_host, is_valid_cookie_domain, possible_domains};
use cookie::Cookie;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

/// Maximum cookies per domain (Chromium default).
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Maximum total cookies.
/// Chromium uses 3300, but we use a slightly lower limit to keep memory usage predictable.
const MAX_COOKIES_TOTAL: usize = 3000;

/// The main entry point for cookie management.
/// Modeled after Chromium's `net::CookieMonster`.
pub struct CookieMonster {
    // Store: Map<Domain, List<Cookie>>
    store: Arc<DashMap<String, Vec<CanonicalCookie>>>,
    // Domains already read back from the persistent table.
    loaded: DashSet<String>,
    clock: CookieClock,
    table: Option<Arc<dyn CookieTable>>,
}

impl Default for CookieMonster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CookieMonster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieMonster")
            .field("domains", &self.store.len())
            .field("persistent", &self.table.is_some())
            .finish()
    }
}

impl CookieMonster {
    /// Memory-only jar.
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            loaded: DashSet::new(),
            clock: CookieClock::default(),
            table: None,
        }
    }

    /// Jar that writes non-session cookies through to `table`.
    pub fn with_table(table: Arc<dyn CookieTable>) -> Self {
        Self {
            table: Some(table),
            ..Self::new()
        }
    }

    pub fn with_clock(mut self, clock: CookieClock) -> Self {
        self.clock = clock;
        self
    }

    /// Parse a `Set-Cookie` line received from `url` and store the result.
    ///
    /// Never fails: malformed lines, missing names and domains the request
    /// host may not set are dropped with a debug log.
    pub fn parse_and_save_cookie(&self, url: &Url, cookie_line: &str) {
        let Some(parsed) = ParsedCookie::parse(cookie_line) else {
            tracing::debug!(url = %url, "dropping malformed cookie");
            return;
        };
        let Some(host) = url.host_str().map(canonical_host) else {
            tracing::debug!(url = %url, "dropping cookie for host-less url");
            return;
        };

        if let Some(domain) = parsed.domain.as_deref() {
            // PSL validation: reject cookies set on public suffixes or foreign domains
            if !is_valid_cookie_domain(domain, &host) {
                tracing::debug!(host = %host, domain = %domain, name = %parsed.name, "rejecting cookie domain");
                return;
            }
        }

        let cookie = CanonicalCookie::from_parsed(parsed, url, self.clock.stamp());
        self.ensure_loaded(&cookie.domain);

        if cookie.is_expired(self.clock.now()) {
            tracing::debug!(domain = %cookie.domain, name = %cookie.name, "cookie expired on arrival");
            self.delete(&cookie.domain, &cookie.name, &cookie.path);
            return;
        }

        self.set_canonical_cookie(cookie);
    }

    /// Insert or replace a cookie keyed by (domain, name, path).
    ///
    /// A replacement keeps the original creation time; its stamp becomes
    /// the last access time instead.
    pub fn set_canonical_cookie(&self, mut cookie: CanonicalCookie) {
        let mut evicted = Vec::new();
        let mut stale_row = false;
        {
            let mut entry = self.store.entry(cookie.domain.clone()).or_default();

            if let Some(existing) = entry.iter_mut().find(|c| c.same_key(&cookie)) {
                cookie.last_access_time = cookie.creation_time;
                cookie.creation_time = existing.creation_time;
                stale_row = !existing.is_session() && cookie.is_session();
                *existing = cookie.clone();
            } else {
                // Enforce per-domain limit, oldest first
                while entry.len() >= MAX_COOKIES_PER_DOMAIN {
                    let Some(oldest_idx) = entry
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, c)| c.creation_time)
                        .map(|(i, _)| i)
                    else {
                        break;
                    };
                    evicted.push(entry.remove(oldest_idx));
                }
                entry.push(cookie.clone());
            }
        }

        for old in &evicted {
            tracing::debug!(domain = %old.domain, name = %old.name, "evicting cookie (domain limit)");
            self.delete_row(old);
        }

        if !cookie.is_session() {
            self.persist(&cookie);
        } else if stale_row {
            self.delete_row(&cookie);
        }

        self.enforce_global_limit();
    }

    /// Enforce the global cookie limit by evicting oldest cookies.
    fn enforce_global_limit(&self) {
        while self.total_cookie_count() > MAX_COOKIES_TOTAL {
            let mut oldest: Option<(String, usize, OffsetDateTime)> = None;

            for entry in self.store.iter() {
                for (idx, cookie) in entry.value().iter().enumerate() {
                    let older = oldest
                        .as_ref()
                        .map_or(true, |(_, _, t)| cookie.creation_time < *t);
                    if older {
                        oldest = Some((entry.key().clone(), idx, cookie.creation_time));
                    }
                }
            }

            let Some((domain, idx, _)) = oldest else {
                break;
            };
            let removed = match self.store.get_mut(&domain) {
                Some(mut entry) if idx < entry.len() => Some(entry.remove(idx)),
                _ => None,
            };
            if let Some(old) = removed {
                tracing::debug!(domain = %old.domain, name = %old.name, "evicting cookie (global limit)");
                self.delete_row(&old);
            }
        }
    }

    /// Cookies applicable to a request, as (name, value) pairs in header
    /// order: longer paths first, then earlier creation first.
    ///
    /// Secure cookies are only returned for `https`. Expired cookies met
    /// along the way are removed.
    pub fn get_cookies(&self, scheme: &str, host: &str, path: &str) -> Vec<Cookie<'static>> {
        self.matching_cookies(scheme, host, path)
            .iter()
            .map(CanonicalCookie::to_cookie)
            .collect()
    }

    /// Get cookies matching the URL.
    pub fn get_cookies_for_url(&self, url: &Url) -> Vec<Cookie<'static>> {
        self.get_cookies(url.scheme(), url.host_str().unwrap_or(""), url.path())
    }

    /// Value for a `Cookie` request header, if any cookie applies.
    pub fn cookie_header_for_url(&self, url: &Url) -> Option<String> {
        let cookies = self.get_cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name(), c.value()))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn matching_cookies(&self, scheme: &str, host: &str, path: &str) -> Vec<CanonicalCookie> {
        let host = canonical_host(host);
        let secure_ok = scheme.eq_ignore_ascii_case("https");
        let now = self.clock.now();
        let mut result = Vec::new();
        let mut expired = Vec::new();

        for domain in possible_domains(&host) {
            self.ensure_loaded(&domain);
            let Some(mut entry) = self.store.get_mut(&domain) else {
                continue;
            };

            entry.retain(|c| {
                if c.is_expired(now) {
                    expired.push(c.clone());
                    false
                } else {
                    true
                }
            });

            for cookie in entry.iter_mut() {
                if cookie.host_only && cookie.domain != host {
                    continue;
                }
                if !path_matches(&cookie.path, path) {
                    continue;
                }
                if cookie.secure && !secure_ok {
                    continue;
                }
                cookie.last_access_time = now;
                result.push(cookie.clone());
            }
        }

        for old in &expired {
            tracing::debug!(domain = %old.domain, name = %old.name, "removing expired cookie");
            self.delete_row(old);
        }

        // Sort by path length (longest first) then creation time
        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });

        result
    }

    /// Read a domain's persisted cookies into memory the first time it is
    /// needed. Load failures leave the domain unloaded so a later call
    /// retries.
    fn ensure_loaded(&self, domain: &str) {
        let Some(table) = &self.table else {
            return;
        };
        if self.loaded.contains(domain) {
            return;
        }

        let rows = match table.query_domain(domain) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "failed to load persisted cookies");
                return;
            }
        };
        self.loaded.insert(domain.to_string());

        if rows.is_empty() {
            return;
        }
        let now = self.clock.now();
        let mut expired = Vec::new();
        {
            let mut entry = self.store.entry(domain.to_string()).or_default();
            for row in rows {
                let cookie = CanonicalCookie::from(row);
                if cookie.is_expired(now) {
                    expired.push(cookie);
                } else if !entry.iter().any(|c| c.same_key(&cookie)) {
                    entry.push(cookie);
                }
            }
            tracing::debug!(domain = %domain, count = entry.len(), "loaded persisted cookies");
        }

        for old in &expired {
            tracing::debug!(domain = %old.domain, name = %old.name, "dropping expired persisted cookie");
            self.delete_row(old);
        }
    }

    fn persist(&self, cookie: &CanonicalCookie) {
        if let Some(table) = &self.table {
            if let Err(e) = table.upsert(&CookieRow::from(cookie)) {
                tracing::warn!(domain = %cookie.domain, name = %cookie.name, error = %e, "failed to persist cookie");
            }
        }
    }

    fn delete_row(&self, cookie: &CanonicalCookie) {
        if let Some(table) = &self.table {
            if let Err(e) = table.delete(&cookie.domain, &cookie.name, &cookie.path) {
                tracing::warn!(domain = %cookie.domain, name = %cookie.name, error = %e, "failed to delete persisted cookie");
            }
        }
    }

    /// Remove the cookie keyed by (domain, name, path) from memory and the
    /// persistent table.
    pub fn delete(&self, domain: &str, name: &str, path: &str) {
        if let Some(mut entry) = self.store.get_mut(domain) {
            entry.retain(|c| c.name != name || c.path != path);
        }
        if let Some(table) = &self.table {
            if let Err(e) = table.delete(domain, name, path) {
                tracing::warn!(domain = %domain, name = %name, error = %e, "failed to delete persisted cookie");
            }
        }
    }

    /// Get total cookie count.
    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    /// Drop every in-memory cookie. Persisted cookies are read back on next use.
    pub fn clear(&self) {
        self.store.clear();
        self.loaded.clear();
    }

    /// Iterate over all in-memory cookies.
    pub fn iter_all_cookies(&self) -> impl Iterator<Item = CanonicalCookie> + '_ {
        self.store.iter().flat_map(|entry| entry.value().clone())
    }
}
