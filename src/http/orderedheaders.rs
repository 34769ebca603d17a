use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::str::FromStr;

/// A header list that strictly preserves insertion order and repeated names.
/// Used for request headers, whose order is observable on the wire, and for
/// response headers as the connection reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaderMap {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl OrderedHeaderMap {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing the first existing value in place.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let (name, value) = parse_pair(name, value)?;
        self.insert_header(name, value);
        Ok(())
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        // Chromium behavior: update in place if exists, else append.
        if let Some(idx) = self.headers.iter().position(|(n, _)| *n == name) {
            self.headers[idx].1 = value;
            let mut seen = false;
            self.headers.retain(|(n, _)| {
                if *n != name {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        } else {
            self.headers.push((name, value));
        }
    }

    /// Add a header without touching existing values of the same name.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let (name, value) = parse_pair(name, value)?;
        self.headers.push((name, value));
        Ok(())
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value));
    }

    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_str(name) {
            self.headers.retain(|(n, _)| *n != target);
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let target = HeaderName::from_str(name).ok()?;
        self.headers
            .iter()
            .find(|(n, _)| *n == target)
            .map(|(_, v)| v)
    }

    /// First value of `name` as text, if it is valid visible ASCII.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of `name`, in order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        let target = HeaderName::from_str(name).ok();
        self.headers
            .iter()
            .filter(move |(n, _)| Some(n) == target.as_ref())
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns a standard http::HeaderMap with the same order.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

impl From<&HeaderMap> for OrderedHeaderMap {
    fn from(map: &HeaderMap) -> Self {
        Self {
            headers: map.iter().map(|(n, v)| (n.clone(), v.clone())).collect(),
        }
    }
}

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), NetError> {
    let name = HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
    let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
    Ok((name, value))
}
