//! Cookie helpers shared by the parser and the jar.
//!
//! Mirrors Chromium's `net/cookies/cookie_util.cc`: the RFC 6265 lenient
//! date algorithm (§5.1.1), default-path computation (§5.1.4) and
//! path-matching (§5.1.4).

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use url::Url;

fn is_delimiter(c: char) -> bool {
    matches!(c,
        '\x09'
        | '\x20'..='\x2F'
        | '\x3B'..='\x40'
        | '\x5B'..='\x60'
        | '\x7B'..='\x7E')
}

/// Leading run of ASCII digits of at most `max` characters, provided at
/// least `min` are present.
fn leading_digits(s: &str, min: usize, max: usize) -> Option<(u32, &str)> {
    let len = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    if len < min || len > max {
        return None;
    }
    let value = s[..len].parse().ok()?;
    Some((value, &s[len..]))
}

fn parse_time_token(token: &str) -> Option<(u8, u8, u8)> {
    let (h, rest) = leading_digits(token, 1, 2)?;
    let rest = rest.strip_prefix(':')?;
    let (m, rest) = leading_digits(rest, 1, 2)?;
    let rest = rest.strip_prefix(':')?;
    let (s, rest) = leading_digits(rest, 1, 2)?;
    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some((h as u8, m as u8, s as u8))
}

fn parse_day_token(token: &str) -> Option<u8> {
    let (day, rest) = leading_digits(token, 1, 2)?;
    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(day as u8)
}

fn parse_month_token(token: &str) -> Option<Month> {
    let prefix = token.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(month)
}

fn parse_year_token(token: &str) -> Option<i32> {
    let (year, rest) = leading_digits(token, 2, 4)?;
    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(year as i32)
}

/// Parse a cookie `Expires` value with the RFC 6265 §5.1.1 algorithm.
///
/// Each token is tried, in order, as a time, a day of month, a month and a
/// year; each component is taken from the first token that matches it.
/// Returns `None` unless all four were found and form a valid date no
/// earlier than 1601.
pub fn parse_expires(text: &str) -> Option<OffsetDateTime> {
    let mut time: Option<(u8, u8, u8)> = None;
    let mut day: Option<u8> = None;
    let mut month: Option<Month> = None;
    let mut year: Option<i32> = None;

    for token in text.split(is_delimiter).filter(|t| !t.is_empty()) {
        if time.is_none() {
            if let Some(t) = parse_time_token(token) {
                time = Some(t);
                continue;
            }
        }
        if day.is_none() {
            if let Some(d) = parse_day_token(token) {
                day = Some(d);
                continue;
            }
        }
        if month.is_none() {
            if let Some(m) = parse_month_token(token) {
                month = Some(m);
                continue;
            }
        }
        if year.is_none() {
            if let Some(y) = parse_year_token(token) {
                year = Some(y);
            }
        }
    }

    let (hour, minute, second) = time?;
    let day = day?;
    let month = month?;
    let mut year = year?;

    if (70..=99).contains(&year) {
        year += 1900;
    } else if (0..=69).contains(&year) {
        year += 2000;
    }

    if !(1..=31).contains(&day) || year < 1601 || hour > 23 || minute > 59 || second > 59 {
        tracing::debug!(value = %text, "rejecting cookie date");
        return None;
    }

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Default cookie path for a request URL (RFC 6265 §5.1.4).
pub fn default_path(url: &Url) -> String {
    let path = url.path();
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Path a cookie is stored under: its own `Path` attribute when that is
/// absolute, otherwise the request's default path.
pub fn effective_path(raw: Option<&str>, url: &Url) -> String {
    match raw {
        Some(p) if p.starts_with('/') => p.to_string(),
        _ => default_path(url),
    }
}

/// RFC 6265 §5.1.4 path-match.
pub fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    if !request_path.starts_with(cookie_path) {
        return false;
    }
    cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_expires_rfc1123() {
        assert_eq!(
            parse_expires("Wed, 09 Jun 2021 10:18:14 GMT"),
            Some(datetime!(2021-06-09 10:18:14 UTC))
        );
    }

    #[test]
    fn test_parse_expires_rfc850_two_digit_year() {
        assert_eq!(
            parse_expires("Sunday, 06-Nov-94 08:49:37 GMT"),
            Some(datetime!(1994-11-06 08:49:37 UTC))
        );
        assert_eq!(
            parse_expires("Thu, 01-Jan-30 00:00:01 GMT"),
            Some(datetime!(2030-01-01 00:00:01 UTC))
        );
    }

    #[test]
    fn test_parse_expires_asctime() {
        assert_eq!(
            parse_expires("Sun Nov  6 08:49:37 1994"),
            Some(datetime!(1994-11-06 08:49:37 UTC))
        );
    }

    #[test]
    fn test_parse_expires_rejects_garbage() {
        assert_eq!(parse_expires("garbage"), None);
        assert_eq!(parse_expires(""), None);
        assert_eq!(parse_expires("Wed, 09 Jun 2021"), None);
    }

    #[test]
    fn test_parse_expires_rejects_out_of_range() {
        assert_eq!(parse_expires("Wed, 32 Jun 2021 10:18:14 GMT"), None);
        assert_eq!(parse_expires("Wed, 09 Jun 1600 10:18:14 GMT"), None);
        assert_eq!(parse_expires("Wed, 09 Jun 2021 24:00:00 GMT"), None);
        assert_eq!(parse_expires("Wed, 31 Feb 2021 10:18:14 GMT"), None);
    }

    #[test]
    fn test_default_path() {
        let url = Url::parse("http://example.com/a/b/c").unwrap();
        assert_eq!(default_path(&url), "/a/b");
        let url = Url::parse("http://example.com/a").unwrap();
        assert_eq!(default_path(&url), "/");
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(default_path(&url), "/");
    }

    #[test]
    fn test_effective_path() {
        let url = Url::parse("http://example.com/docs/page").unwrap();
        assert_eq!(effective_path(Some("/x"), &url), "/x");
        assert_eq!(effective_path(Some("relative"), &url), "/docs");
        assert_eq!(effective_path(None, &url), "/docs");
    }

    #[test]
    fn test_path_matches() {
        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/a", "/a"));
        assert!(path_matches("/a", "/a/b"));
        assert!(path_matches("/a/", "/a/b"));
        assert!(!path_matches("/a", "/ab"));
        assert!(!path_matches("/a/b", "/a"));
    }
}
