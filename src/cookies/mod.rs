//! Cookie management.
//!
//! This module provides the cookie jar used by request jobs:
//!
//! - **Parsing**: `Set-Cookie` grammar ([`ParsedCookie`](parsedcookie::ParsedCookie))
//!   and the RFC 6265 lenient date algorithm ([`cookieutil`])
//! - **Storage**: In-memory cookie jar ([`CookieMonster`](monster::CookieMonster))
//! - **Persistence**: Write-through table for non-session cookies ([`persistence`])
//! - **Domain rules**: Public suffix checks and domain expansion ([`psl`])
//!
//! # Architecture
//!
//! This implementation mirrors Chromium's cookie storage architecture:
//!
//! | Chromium (C++) | pagenet (Rust) | Responsibility |
//! |----------------|------------------|----------------|
//! | `net::CookieMonster` | [`CookieMonster`](monster::CookieMonster) | Cookie jar with oldest-first eviction |
//! | `net::CanonicalCookie` | [`CanonicalCookie`](canonicalcookie::CanonicalCookie) | Single cookie representation |
//! | `net::ParsedCookie` | [`ParsedCookie`](parsedcookie::ParsedCookie) | `Set-Cookie` line parser |
//! | `SqlitePersistentCookieStore` | [`persistence`] | Disk persistence |
//!
//! # Example
//!
//! ```rust
//! use pagenet::cookies::monster::CookieMonster;
//! use url::Url;
//!
//! let jar = CookieMonster::new();
//! let url = Url::parse("https://www.example.com/account").unwrap();
//! jar.parse_and_save_cookie(&url, "sid=42; Domain=example.com; Secure");
//!
//! let cookies = jar.get_cookies("https", "example.com", "/");
//! assert_eq!(cookies[0].value(), "42");
//! assert!(jar.get_cookies("http", "example.com", "/").is_empty());
//! ```
//!
//! # Chromium References
//!
//! - Cookie monster: `net/cookies/cookie_monster.cc`
//! - Date parsing: `net/cookies/cookie_util.cc`
//! - Database schema: `net/extras/sqlite/sqlite_persistent_cookie_store.cc`

pub mod canonicalcookie;
pub mod clock;
pub mod cookieutil;
pub mod monster;
pub mod parsedcookie;
pub mod persistence;
pub mod psl;
