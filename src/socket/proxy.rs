//! HTTP proxy configuration with NO_PROXY bypass rules.
//!
//! Bypass rules follow curl's NO_PROXY behavior: comma-separated entries,
//! each a domain (leading dot optional, subdomains included), an IP
//! address, a CIDR range, or `*` for every host.

use std::net::IpAddr;
use url::Url;
use zeroize::Zeroizing;

/// One NO_PROXY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BypassRule {
    All,
    Domain(String),
    Ip(IpAddr),
    Cidr(IpAddr, u8),
}

impl BypassRule {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        if entry == "*" {
            return Some(BypassRule::All);
        }
        if let Some((ip, prefix)) = entry.split_once('/') {
            if let (Ok(ip), Ok(prefix)) = (ip.parse::<IpAddr>(), prefix.parse::<u8>()) {
                return Some(BypassRule::Cidr(ip, prefix));
            }
        }
        if let Ok(ip) = entry.parse::<IpAddr>() {
            return Some(BypassRule::Ip(ip));
        }
        let domain = entry.strip_prefix('.').unwrap_or(entry).to_lowercase();
        Some(BypassRule::Domain(domain))
    }

    fn matches(&self, host: &str, ip: Option<IpAddr>) -> bool {
        match (self, ip) {
            (BypassRule::All, _) => true,
            (BypassRule::Ip(rule), Some(ip)) => *rule == ip,
            (BypassRule::Cidr(net, prefix), Some(ip)) => cidr_contains(*net, *prefix, ip),
            (BypassRule::Domain(domain), None) => {
                host == domain || host.ends_with(&format!(".{domain}"))
            }
            _ => false,
        }
    }
}

fn cidr_contains(network: IpAddr, prefix: u8, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0);
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}

/// Proxy configuration with bypass rules.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Proxy URL (e.g., `http://proxy.com:8080`)
    pub url: Url,
    /// Proxy username for authentication
    pub username: Option<String>,
    /// Proxy password (zeroized on drop)
    pub password: Option<Zeroizing<String>>,
    bypass: Vec<BypassRule>,
}

impl ProxySettings {
    /// Create proxy settings from an `http://` proxy URL.
    pub fn new(url_str: &str) -> Option<Self> {
        let url = Url::parse(url_str).ok()?;
        if url.scheme() != "http" || url.host_str().is_none() {
            tracing::debug!(proxy = %url_str, "unsupported proxy url");
            return None;
        }
        Some(Self {
            url,
            username: None,
            password: None,
            bypass: Vec::new(),
        })
    }

    /// Create proxy from environment variables.
    ///
    /// Checks `HTTP_PROXY`/`http_proxy` and applies `NO_PROXY`/`no_proxy`.
    pub fn from_env() -> Option<Self> {
        let url_str = std::env::var("HTTP_PROXY")
            .or_else(|_| std::env::var("http_proxy"))
            .ok()?;
        let no_proxy = std::env::var("NO_PROXY")
            .or_else(|_| std::env::var("no_proxy"))
            .unwrap_or_default();
        Some(Self::new(&url_str)?.with_bypass(&no_proxy))
    }

    /// Add authentication credentials.
    pub fn with_auth(mut self, user: &str, pass: &str) -> Self {
        self.username = Some(user.to_string());
        self.password = Some(Zeroizing::new(pass.to_string()));
        self
    }

    /// Replace the bypass rules with a NO_PROXY string.
    pub fn with_bypass(mut self, no_proxy: &str) -> Self {
        self.bypass = no_proxy.split(',').filter_map(BypassRule::parse).collect();
        self
    }

    /// Check if a request to `target` should skip the proxy.
    pub fn should_bypass(&self, target: &Url) -> bool {
        let Some(host) = target.host_str() else {
            return false;
        };
        let host = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();
        let ip = host.parse::<IpAddr>().ok();
        self.bypass.iter().any(|rule| rule.matches(&host, ip))
    }

    /// `Proxy-Authorization` header value, when credentials are set.
    pub fn auth_header(&self) -> Option<Zeroizing<String>> {
        use base64::{engine::general_purpose, Engine as _};

        let (user, pass) = (self.username.as_ref()?, self.password.as_ref()?);
        let creds = Zeroizing::new(format!("{}:{}", user, pass.as_str()));
        Some(Zeroizing::new(format!(
            "Basic {}",
            general_purpose::STANDARD.encode(creds.as_bytes())
        )))
    }

    /// Proxy host and port.
    pub fn host_port(&self) -> Option<(&str, u16)> {
        let host = self.url.host_str()?;
        Some((host, self.url.port().unwrap_or(80)))
    }
}

/// Builder for ProxySettings.
#[derive(Default)]
pub struct ProxyBuilder {
    url: Option<String>,
    username: Option<String>,
    password: Option<Zeroizing<String>>,
    no_proxy: String,
}

impl ProxyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the proxy as `host:port` or a full `http://` URL.
    pub fn http(mut self, url: &str) -> Self {
        self.url = Some(format!("http://{}", url.trim_start_matches("http://")));
        self
    }

    pub fn auth(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(Zeroizing::new(password.to_string()));
        self
    }

    /// Set NO_PROXY bypass rules.
    pub fn no_proxy(mut self, rules: &str) -> Self {
        self.no_proxy = rules.to_string();
        self
    }

    pub fn build(self) -> Option<ProxySettings> {
        let mut settings = ProxySettings::new(self.url.as_deref()?)?.with_bypass(&self.no_proxy);
        settings.username = self.username;
        settings.password = self.password;
        Some(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(no_proxy: &str) -> ProxySettings {
        ProxySettings::new("http://proxy.local:3128")
            .unwrap()
            .with_bypass(no_proxy)
    }

    fn bypasses(p: &ProxySettings, url: &str) -> bool {
        p.should_bypass(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_rejects_non_http_proxy() {
        assert!(ProxySettings::new("socks5://proxy:1080").is_none());
        assert!(ProxySettings::new("not a url").is_none());
    }

    #[test]
    fn test_wildcard() {
        let p = proxy("*");
        assert!(bypasses(&p, "http://anything.com/"));
        assert!(bypasses(&p, "http://192.168.1.1/"));
    }

    #[test]
    fn test_domain_rules() {
        let p = proxy("example.com, .internal.corp");
        assert!(bypasses(&p, "http://example.com/"));
        assert!(bypasses(&p, "http://WWW.Example.com/"));
        assert!(bypasses(&p, "http://api.internal.corp/"));
        assert!(bypasses(&p, "http://internal.corp/"));
        assert!(!bypasses(&p, "http://notexample.com/"));
    }

    #[test]
    fn test_ip_and_cidr_rules() {
        let p = proxy("10.0.0.5, 192.168.1.0/24, 2001:db8::/32, ::1");
        assert!(bypasses(&p, "http://10.0.0.5/"));
        assert!(bypasses(&p, "http://192.168.1.254/"));
        assert!(!bypasses(&p, "http://192.168.2.1/"));
        assert!(bypasses(&p, "http://[2001:db8::1]/"));
        assert!(bypasses(&p, "http://[::1]:8080/"));
        assert!(!bypasses(&p, "http://[2001:db9::1]/"));
    }

    #[test]
    fn test_no_rules_never_bypass() {
        let p = proxy("");
        assert!(!bypasses(&p, "http://example.com/"));
    }

    #[test]
    fn test_auth_header() {
        let p = proxy("").with_auth("user", "pass");
        assert_eq!(p.auth_header().unwrap().as_str(), "Basic dXNlcjpwYXNz");
        assert!(proxy("").auth_header().is_none());
    }

    #[test]
    fn test_builder() {
        let p = ProxyBuilder::new()
            .http("proxy.local:8080")
            .auth("u", "p")
            .no_proxy("localhost")
            .build()
            .unwrap();
        assert_eq!(p.host_port(), Some(("proxy.local", 8080)));
        assert!(bypasses(&p, "http://localhost/"));
        assert!(p.auth_header().is_some());
    }
}
