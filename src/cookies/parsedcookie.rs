//! `Set-Cookie` header parsing.
//!
//! Mirrors Chromium's `net::ParsedCookie`: the first `name=value` pair is
//! held to a strict token grammar, attributes after it are matched
//! case-insensitively and unknown ones are ignored. Malformed input yields
//! `None`; it is never an error.

use crate::cookies::cookieutil::parse_expires;
use time::OffsetDateTime;

/// Attributes of a single `Set-Cookie` line, before they are resolved
/// against the request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCookie {
    pub name: String,
    pub value: String,
    /// `Domain` attribute, lower-cased with any leading dot removed.
    pub domain: Option<String>,
    /// `Path` attribute as sent.
    pub path: Option<String>,
    pub expires: Option<OffsetDateTime>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

/// RFC 2616 token characters.
fn is_token_char(c: char) -> bool {
    c.is_ascii()
        && !c.is_ascii_control()
        && !matches!(
            c,
            '(' | ')'
                | '<'
                | '>'
                | '@'
                | ','
                | ';'
                | ':'
                | '\\'
                | '"'
                | '/'
                | '['
                | ']'
                | '?'
                | '='
                | '{'
                | '}'
                | ' '
                | '\t'
        )
}

/// RFC 6265 cookie-octet.
fn is_cookie_octet(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x2B' | '\x2D'..='\x3A' | '\x3C'..='\x5B' | '\x5D'..='\x7E')
}

fn is_valid_value(value: &str) -> bool {
    let inner = match value.strip_prefix('"') {
        Some(rest) => match rest.strip_suffix('"') {
            Some(inner) => inner,
            None => return false,
        },
        None => value,
    };
    inner.chars().all(is_cookie_octet)
}

impl ParsedCookie {
    /// Parse one `Set-Cookie` header value.
    pub fn parse(line: &str) -> Option<Self> {
        let mut segments = line.split(';');
        let pair = segments.next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        let value = value.trim();

        if name.is_empty() || !name.chars().all(is_token_char) || !is_valid_value(value) {
            tracing::debug!(cookie = %pair, "malformed cookie pair");
            return None;
        }

        let mut cookie = ParsedCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: None,
            path: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
        };

        for attr in segments {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "max-age" => match val.parse::<i64>() {
                    Ok(secs) => {
                        if secs <= 0 {
                            tracing::debug!(name = %cookie.name, max_age = secs, "cookie expires immediately");
                        }
                        cookie.max_age = Some(secs);
                    }
                    Err(_) => {
                        tracing::debug!(name = %cookie.name, value = %val, "ignoring invalid max-age");
                    }
                },
                "path" => cookie.path = Some(val.to_string()),
                "domain" => {
                    let d = val.strip_prefix('.').unwrap_or(val);
                    if !d.is_empty() {
                        cookie.domain = Some(d.to_lowercase());
                    }
                }
                "expires" => match parse_expires(val) {
                    Some(t) => cookie.expires = Some(t),
                    None => tracing::debug!(name = %cookie.name, value = %val, "ignoring invalid expires"),
                },
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        Some(cookie)
    }
}
