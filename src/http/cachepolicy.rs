//! Cache freshness and eligibility rules.
//!
//! Decides whether a response may be stored, when a stored response
//! expires, and how a request of a given kind may use a stored entry.

use crate::http::orderedheaders::OrderedHeaderMap;
use crate::urlrequest::request::RequestKind;
use http::StatusCode;
use time::format_description::well_known::Rfc2822;
use time::{Duration, OffsetDateTime};

/// Parsed Cache-Control directives.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    /// Parse every Cache-Control header in the list.
    pub fn parse(headers: &OrderedHeaderMap) -> Self {
        let mut cc = CacheControl::default();

        for value in headers.get_all("cache-control") {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for directive in value.split(',') {
                let directive = directive.trim().to_ascii_lowercase();

                if directive == "no-store" {
                    cc.no_store = true;
                } else if directive == "no-cache" || directive.starts_with("no-cache=") {
                    cc.no_cache = true;
                } else if let Some(age) = directive.strip_prefix("max-age=") {
                    if let Ok(age) = age.trim_matches('"').parse::<u64>() {
                        cc.max_age = Some(age);
                    }
                }
            }
        }

        cc
    }
}

/// When a stored response stops being fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    At(OffsetDateTime),
    /// Stored, but every use must be revalidated first.
    AlwaysRevalidate,
}

impl Expiry {
    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        match self {
            Expiry::At(t) => *t > now,
            Expiry::AlwaysRevalidate => false,
        }
    }
}

/// Parse an HTTP-date (`Date`, `Expires`, `Last-Modified`).
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc2822)
        .ok()
        .or_else(|| crate::cookies::cookieutil::parse_expires(value))
}

/// Format an instant as an IMF-fixdate.
pub fn format_http_date(t: OffsetDateTime) -> String {
    let t = t.to_offset(time::UtcOffset::UTC);
    let format = time::macros::format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    t.format(&format).unwrap_or_default()
}

/// Compute the expiry of a response.
///
/// `max-age` wins over `Expires`; `max-age=0` and an unparsable `Expires`
/// mean "always revalidate". Without either, a configured default offset is
/// added to the response `Date` (or the request time).
pub fn compute_expiry(
    headers: &OrderedHeaderMap,
    request_time: OffsetDateTime,
    default_offset: Option<Duration>,
) -> Option<Expiry> {
    let cc = CacheControl::parse(headers);
    if let Some(age) = cc.max_age {
        if age == 0 {
            return Some(Expiry::AlwaysRevalidate);
        }
        let age = i64::try_from(age).unwrap_or(i64::MAX);
        return Some(Expiry::At(
            request_time.saturating_add(Duration::seconds(age)),
        ));
    }

    if let Some(expires) = headers.get("expires") {
        return match expires.to_str().ok().and_then(parse_http_date) {
            Some(t) => Some(Expiry::At(t)),
            None => Some(Expiry::AlwaysRevalidate),
        };
    }

    let offset = default_offset?;
    let base = headers
        .get_str("date")
        .and_then(parse_http_date)
        .unwrap_or(request_time);
    Some(Expiry::At(base.saturating_add(offset)))
}

/// Whether a completed response may be stored. Returns its expiry if so.
pub fn cacheable_expiry(
    method: &http::Method,
    status: StatusCode,
    headers: &OrderedHeaderMap,
    request_time: OffsetDateTime,
    default_offset: Option<Duration>,
) -> Option<Expiry> {
    if method != http::Method::GET || status != StatusCode::OK {
        return None;
    }
    let cc = CacheControl::parse(headers);
    if cc.no_cache || cc.no_store {
        return None;
    }
    match compute_expiry(headers, request_time, default_offset)? {
        Expiry::At(t) if t > OffsetDateTime::UNIX_EPOCH => Some(Expiry::At(t)),
        _ => None,
    }
}

/// How a request may use the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Serve the stored entry without touching the network.
    Fresh,
    /// An entry exists but must be revalidated with a conditional request.
    Stale,
    /// Nothing stored; go to the network.
    Absent,
    /// This request never reads from the cache.
    NeverCache,
}

/// Decide how a request uses the cache. `stored` is `None` when nothing is
/// stored for the URL, otherwise the stored entry's expiry.
///
/// Reloads and downloads never read the cache. History navigation serves
/// any stored entry regardless of age. Address-bar navigation always
/// revalidates. Everything else follows the entry's expiry.
pub fn decide_read(
    kind: RequestKind,
    method: &http::Method,
    stored: Option<Option<Expiry>>,
    now: OffsetDateTime,
) -> CacheDecision {
    if method != http::Method::GET {
        return CacheDecision::NeverCache;
    }
    match kind {
        RequestKind::SoftReload | RequestKind::HardReload | RequestKind::Download => {
            return CacheDecision::NeverCache;
        }
        _ => {}
    }

    let Some(expiry) = stored else {
        return CacheDecision::Absent;
    };

    match kind {
        RequestKind::History => CacheDecision::Fresh,
        RequestKind::AddressBar => CacheDecision::Stale,
        _ => match expiry {
            Some(e) if e.is_fresh(now) => CacheDecision::Fresh,
            _ => CacheDecision::Stale,
        },
    }
}
