use crate::cookies::cookieutil::effective_path;
use crate::cookies::parsedcookie::ParsedCookie;
use crate::cookies::psl::canonical_host;
use time::{Duration, OffsetDateTime};
use url::Url;

/// Represents a cookie.
/// Modeled after Chromium's `net::CanonicalCookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCookie {
    pub name: String,
    pub value: String,
    /// Lower-cased, without a leading dot.
    pub domain: String,
    pub path: String,
    /// Stamped by the jar's clock; strictly increasing across the process.
    pub creation_time: OffsetDateTime,
    /// `None` for session cookies.
    pub expiration_time: Option<OffsetDateTime>,
    /// `Max-Age` as sent, kept for the persistent row.
    pub max_age: Option<i64>,
    pub last_access_time: OffsetDateTime,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the cookie carried no `Domain` attribute.
    pub host_only: bool,
}

impl CanonicalCookie {
    pub fn new(
        name: String,
        value: String,
        domain: String,
        path: String,
        creation_time: OffsetDateTime,
        expiration_time: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            name,
            value,
            domain,
            path,
            creation_time,
            expiration_time,
            max_age: None,
            last_access_time: creation_time,
            secure: false,
            http_only: false,
            host_only: true,
        }
    }

    /// Resolve a parsed `Set-Cookie` line against the URL that sent it.
    ///
    /// A positive `Max-Age` wins over `Expires`. A non-positive one pins the
    /// expiry to the epoch so the cookie is expired on arrival.
    pub fn from_parsed(parsed: ParsedCookie, url: &Url, creation_time: OffsetDateTime) -> Self {
        let host = canonical_host(url.host_str().unwrap_or(""));
        let (domain, host_only) = match parsed.domain {
            Some(d) => (d, false),
            None => (host, true),
        };
        let path = effective_path(parsed.path.as_deref(), url);

        let expiration_time = match parsed.max_age {
            Some(secs) if secs > 0 => {
                Some(creation_time.saturating_add(Duration::seconds(secs)))
            }
            Some(_) => Some(OffsetDateTime::UNIX_EPOCH),
            None => parsed.expires,
        };

        Self {
            name: parsed.name,
            value: parsed.value,
            domain,
            path,
            creation_time,
            expiration_time,
            max_age: parsed.max_age,
            last_access_time: creation_time,
            secure: parsed.secure,
            http_only: parsed.http_only,
            host_only,
        }
    }

    /// Expired once the expiry is at or before `current_time`. Session
    /// cookies never expire by this check.
    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        match self.expiration_time {
            Some(expiry) => expiry <= current_time,
            None => false,
        }
    }

    pub fn is_session(&self) -> bool {
        self.expiration_time.is_none()
    }

    /// Jar identity within a domain.
    pub fn same_key(&self, other: &CanonicalCookie) -> bool {
        self.domain == other.domain && self.name == other.name && self.path == other.path
    }

    /// The (name, value) pair handed to callers.
    pub fn to_cookie(&self) -> cookie::Cookie<'static> {
        cookie::Cookie::new(self.name.clone(), self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn parse(line: &str) -> ParsedCookie {
        ParsedCookie::parse(line).unwrap()
    }

    #[test]
    fn test_host_only_without_domain() {
        let url = Url::parse("http://Sub.Example.com/a/b").unwrap();
        let now = datetime!(2024-01-01 00:00 UTC);
        let c = CanonicalCookie::from_parsed(parse("k=v"), &url, now);
        assert_eq!(c.domain, "sub.example.com");
        assert!(c.host_only);
        assert_eq!(c.path, "/a");
        assert!(c.is_session());
    }

    #[test]
    fn test_domain_cookie() {
        let url = Url::parse("http://sub.example.com/").unwrap();
        let now = datetime!(2024-01-01 00:00 UTC);
        let c = CanonicalCookie::from_parsed(parse("k=v; Domain=.example.com; Path=/"), &url, now);
        assert_eq!(c.domain, "example.com");
        assert!(!c.host_only);
    }

    #[test]
    fn test_max_age_overrides_expires() {
        let url = Url::parse("http://example.com/").unwrap();
        let now = datetime!(2024-01-01 00:00 UTC);
        let c = CanonicalCookie::from_parsed(
            parse("k=v; Max-Age=3600; Expires=Wed, 09 Jun 2021 10:18:14 GMT"),
            &url,
            now,
        );
        assert_eq!(c.expiration_time, Some(datetime!(2024-01-01 01:00 UTC)));
        assert!(!c.is_expired(now));
    }

    #[test]
    fn test_non_positive_max_age_is_expired() {
        let url = Url::parse("http://example.com/").unwrap();
        let now = datetime!(2024-01-01 00:00 UTC);
        let c = CanonicalCookie::from_parsed(parse("k=v; Max-Age=0"), &url, now);
        assert!(c.is_expired(now));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = datetime!(2024-01-01 00:00 UTC);
        let c = CanonicalCookie::new(
            "a".into(),
            "b".into(),
            "example.com".into(),
            "/".into(),
            now,
            Some(now),
        );
        assert!(c.is_expired(now));
        assert!(!c.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn test_to_cookie_exposes_pair_only() {
        let now = datetime!(2024-01-01 00:00 UTC);
        let c = CanonicalCookie::new(
            "a".into(),
            "b".into(),
            "example.com".into(),
            "/".into(),
            now,
            None,
        );
        let pair = c.to_cookie();
        assert_eq!(pair.name(), "a");
        assert_eq!(pair.value(), "b");
        assert_eq!(pair.domain(), None);
    }
}
