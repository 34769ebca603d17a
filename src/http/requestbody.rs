//! Request body for POST operations.

use crate::base::neterror::NetError;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;

/// Request body handed to an [`HttpConnection`](super::connection::HttpConnection).
#[derive(Default)]
pub enum RequestBody {
    /// No body (GET, HEAD).
    #[default]
    Empty,
    /// Fully buffered body.
    Bytes(Bytes),
    /// Body produced incrementally, e.g. multipart uploads reading from disk.
    Stream(BoxStream<'static, Result<Bytes, NetError>>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl RequestBody {
    /// `application/x-www-form-urlencoded` body from name/value pairs.
    pub fn form_urlencoded<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        RequestBody::Bytes(Bytes::from(encoded))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Bytes(b) => b.is_empty(),
            RequestBody::Stream(_) => false,
        }
    }

    /// Length in bytes, when known up front.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(b) => Some(b.len() as u64),
            RequestBody::Stream(_) => None,
        }
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for RequestBody {
    fn from(s: &'static str) -> Self {
        RequestBody::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}
