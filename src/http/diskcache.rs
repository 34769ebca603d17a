//! Persistent tier of the HTTP cache.
//!
//! A [`BlobStore`] holds one record per URL. A record is the response
//! header block followed by the decoded body:
//!
//! ```text
//! content-type: text/html\r\n
//! date: Wed, 09 Jun 2021 10:18:14 GMT\r\n
//! content-length: 5\r\n
//! X-Request-Time: 1623233894000\r\n
//! \r\n
//! hello
//! ```

use crate::base::neterror::NetError;
use crate::http::cachepolicy::format_http_date;
use crate::http::orderedheaders::OrderedHeaderMap;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use time::OffsetDateTime;

/// Synthetic header carrying the time the cached request was made.
pub const REQUEST_TIME_HEADER: &str = "x-request-time";

/// Headers never written to a record. The body is stored decoded, so
/// `Content-Encoding` would be wrong; hop-by-hop headers describe the
/// original connection only.
const SKIPPED_HEADERS: &[&str] = &[
    "content-encoding",
    REQUEST_TIME_HEADER,
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Byte-blob storage keyed by URL. Implementations serialize their own
/// writers.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Bytes>, NetError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), NetError>;

    fn delete(&self, key: &str) -> Result<(), NetError>;
}

/// Blob store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, NetError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), NetError> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), NetError> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Blob store in a SQLite table. Each namespace is its own table, so one
/// database can hold several stores.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
    table: String,
}

impl std::fmt::Debug for SqliteBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBlobStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SqliteBlobStore {
    /// Open (or create) namespace `namespace` in the database at `path`.
    pub fn open(path: &Path, namespace: &str) -> Result<Self, NetError> {
        let conn = Connection::open(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to open cache database");
            NetError::PersistentStoreFailure
        })?;
        Self::with_connection(conn, namespace)
    }

    pub fn open_in_memory(namespace: &str) -> Result<Self, NetError> {
        Self::with_connection(Connection::open_in_memory()?, namespace)
    }

    fn with_connection(conn: Connection, namespace: &str) -> Result<Self, NetError> {
        if namespace.is_empty()
            || !namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(NetError::InvalidArgument);
        }
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {namespace} (key TEXT PRIMARY KEY NOT NULL, value BLOB NOT NULL);"
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: namespace.to_string(),
        })
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, NetError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let value: Option<Vec<u8>> = conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.table),
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value.map(Bytes::from))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), NetError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                self.table
            ),
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), NetError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", self.table),
            params![key],
        )?;
        Ok(())
    }
}

/// Copy of `headers` without the headers a cache never stores.
pub fn filter_headers(headers: &OrderedHeaderMap) -> OrderedHeaderMap {
    let mut out = OrderedHeaderMap::new();
    for (name, value) in headers.iter() {
        if !SKIPPED_HEADERS.contains(&name.as_str()) {
            out.append_header(name.clone(), value.clone());
        }
    }
    out
}

/// Serialize a response for the blob store.
///
/// `Date` is filled from the request time when the origin sent none, and
/// `Content-Length` always reflects the stored body.
pub fn encode_cache_record(
    headers: &OrderedHeaderMap,
    request_time: OffsetDateTime,
    body: &[u8],
) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + 512);
    let mut has_date = false;

    for (name, value) in headers.iter() {
        let name = name.as_str();
        if SKIPPED_HEADERS.contains(&name) || name == "content-length" {
            continue;
        }
        if name == "date" {
            has_date = true;
        }
        out.put_slice(name.as_bytes());
        out.put_slice(b": ");
        out.put_slice(value.as_bytes());
        out.put_slice(b"\r\n");
    }

    if !has_date {
        out.put_slice(b"date: ");
        out.put_slice(format_http_date(request_time).as_bytes());
        out.put_slice(b"\r\n");
    }
    out.put_slice(format!("content-length: {}\r\n", body.len()).as_bytes());

    let millis = request_time.unix_timestamp_nanos() / 1_000_000;
    out.put_slice(format!("X-Request-Time: {millis}\r\n\r\n").as_bytes());
    out.put_slice(body);
    out.freeze()
}

/// A record read back from the blob store.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    /// Header names lower-cased; the synthetic request-time header removed.
    pub headers: OrderedHeaderMap,
    pub request_time: OffsetDateTime,
    pub body: Bytes,
}

/// Parse a record produced by [`encode_cache_record`].
pub fn decode_cache_record(raw: &Bytes) -> Result<CacheRecord, NetError> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(NetError::CacheReadFailure)?;
    let head = std::str::from_utf8(&raw[..split]).map_err(|_| NetError::CacheReadFailure)?;
    let body = raw.slice(split + 4..);

    let mut headers = OrderedHeaderMap::new();
    let mut request_time = None;

    for line in head.split("\r\n") {
        let (name, value) = line.split_once(':').ok_or(NetError::CacheReadFailure)?;
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();

        if name == REQUEST_TIME_HEADER {
            let millis: i128 = value.parse().map_err(|_| NetError::CacheReadFailure)?;
            request_time = OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).ok();
            continue;
        }

        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| NetError::CacheReadFailure)?;
        let value = HeaderValue::from_str(value).map_err(|_| NetError::CacheReadFailure)?;
        headers.append_header(name, value);
    }

    Ok(CacheRecord {
        headers,
        request_time: request_time.ok_or(NetError::CacheReadFailure)?,
        body,
    })
}
