//! Public Suffix List (PSL) checks for cookie domain matching.
//!
//! Prevents supercookie attacks by rejecting cookies set on public
//! suffixes like `.com`, `.co.uk`, etc, and expands a request host into
//! every domain whose cookies may legally apply to it.
//!
//! Uses Mozilla's Public Suffix List via the `psl` crate.

use psl::{List, Psl};
use std::net::IpAddr;

/// Check if a domain is a public suffix (e.g., "com", "co.uk").
/// Returns true if the domain itself is a public suffix.
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.to_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    match List.suffix(domain_bytes) {
        Some(suffix) => suffix.as_bytes() == domain_bytes,
        None => false,
    }
}

/// Whether the domain ends in a suffix listed explicitly in the PSL,
/// as opposed to one matched only by the `*` default rule.
pub fn has_known_suffix(domain: &str) -> bool {
    let domain_lower = domain.to_lowercase();
    List.suffix(domain_lower.as_bytes())
        .map(|s| s.is_known())
        .unwrap_or(false)
}

/// Check if a cookie domain is valid for a given request host.
///
/// A leading dot is ignored. The domain is accepted when it equals the
/// host; otherwise the host must be a subdomain of it and the domain must
/// not be a public suffix.
pub fn is_valid_cookie_domain(cookie_domain: &str, url_host: &str) -> bool {
    let cookie_domain = cookie_domain.strip_prefix('.').unwrap_or(cookie_domain);
    if cookie_domain.is_empty() {
        return false;
    }
    let cookie_domain_lower = cookie_domain.to_lowercase();
    let url_host_lower = url_host.to_lowercase();

    if url_host_lower == cookie_domain_lower {
        return true;
    }

    if !url_host_lower.ends_with(&format!(".{}", cookie_domain_lower)) {
        return false;
    }

    !is_public_suffix(&cookie_domain_lower)
}

/// Host as cookies key it: lowercase, without a trailing root dot.
pub fn canonical_host(host: &str) -> String {
    host.trim_end_matches('.').to_lowercase()
}

/// Every domain whose cookies could apply to `host`, most specific first.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`,
/// `example.com`. Expansion stops before reaching a public suffix. IP
/// literals only ever match themselves.
pub fn possible_domains(host: &str) -> Vec<String> {
    let host = canonical_host(host);
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return vec![host];
    }

    let mut domains = vec![host.clone()];
    let mut current = host.as_str();
    while let Some((_, parent)) = current.split_once('.') {
        if parent.is_empty() || is_public_suffix(parent) || !is_valid_cookie_domain(parent, &host)
        {
            break;
        }
        domains.push(parent.to_string());
        current = parent;
    }
    domains
}
