//! Best-effort promotion of user-typed text to a URL.

use crate::base::neterror::NetError;
use crate::cookies::psl;
use url::Url;

/// Schemes accepted when the text parses as an absolute URL by itself.
/// Anything else (`localhost:8080`, `example.com:80/x`) is re-guessed.
const KNOWN_SCHEMES: &[&str] = &[
    "http", "https", "file", "ftp", "ws", "wss", "data", "about", "mailto",
];

/// Guess the URL meant by `text`, resolving relative text against `base`.
///
/// Text that does not parse is treated as an absolute path, a drive-letter
/// path or a bare host, in that order. Text containing a space is rejected.
pub fn guess_url(base: Option<&Url>, text: &str) -> Result<Url, NetError> {
    let text = text.trim();
    if text.is_empty() || text.contains(' ') {
        return Err(NetError::InvalidUrl);
    }

    let direct = match base {
        Some(base) => base.join(text).ok(),
        None => Url::parse(text)
            .ok()
            .filter(|u| KNOWN_SCHEMES.contains(&u.scheme())),
    };
    if let Some(url) = direct {
        return Ok(url);
    }

    let candidate = if text.starts_with('/') {
        format!("file://{text}")
    } else if is_drive_letter_path(text) {
        format!("file:///{}", text.replace('\\', "/"))
    } else if looks_like_host(text) {
        format!("http://{text}")
    } else {
        tracing::debug!(text = %text, "cannot guess url");
        return Err(NetError::InvalidUrl);
    };

    Url::parse(&candidate).map_err(|e| {
        tracing::debug!(text = %text, error = %e, "guessed url does not parse");
        NetError::InvalidUrl
    })
}

fn is_drive_letter_path(text: &str) -> bool {
    let b = text.as_bytes();
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && (b[2] == b'\\' || b[2] == b'/')
}

/// `www.` prefix, a known public suffix, or a two or three letter last label.
fn looks_like_host(text: &str) -> bool {
    let host = text
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit_once(':').map_or(host, |(h, port)| {
        if port.bytes().all(|c| c.is_ascii_digit()) {
            h
        } else {
            host
        }
    });
    let host = host.to_ascii_lowercase();

    if host.is_empty() {
        return false;
    }
    if host.starts_with("www.") || host == "localhost" {
        return true;
    }
    let Some((_, last)) = host.rsplit_once('.') else {
        return false;
    };
    if (2..=3).contains(&last.len()) && last.bytes().all(|c| c.is_ascii_alphabetic()) {
        return true;
    }
    psl::has_known_suffix(&host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guess(text: &str) -> Result<String, NetError> {
        guess_url(None, text).map(String::from)
    }

    #[test]
    fn test_absolute_url_parses_directly() {
        assert_eq!(guess("https://example.com/a").unwrap(), "https://example.com/a");
    }

    #[test]
    fn test_relative_to_base() {
        let base = Url::parse("http://example.com/dir/page.html").unwrap();
        assert_eq!(
            guess_url(Some(&base), "other.html").unwrap().as_str(),
            "http://example.com/dir/other.html"
        );
    }

    #[test]
    fn test_bare_hosts() {
        assert_eq!(guess("example.com").unwrap(), "http://example.com/");
        assert_eq!(guess("www.example").unwrap(), "http://www.example/");
        assert_eq!(guess("news.bbc.co.uk/sport").unwrap(), "http://news.bbc.co.uk/sport");
        assert_eq!(guess("localhost:8080").unwrap(), "http://localhost:8080/");
        assert_eq!(guess("shop.example.technology").unwrap(), "http://shop.example.technology/");
    }

    #[test]
    fn test_paths() {
        assert_eq!(guess("/etc/hosts").unwrap(), "file:///etc/hosts");
        assert_eq!(guess("C:\\docs\\a.html").unwrap(), "file:///C:/docs/a.html");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(guess("hello world"), Err(NetError::InvalidUrl));
        assert_eq!(guess("justaword"), Err(NetError::InvalidUrl));
        assert_eq!(guess("   "), Err(NetError::InvalidUrl));
        assert_eq!(guess("example.c0m"), Err(NetError::InvalidUrl));
    }
}
