//! Persistent cookie table.
//!
//! Long-lived owner of non-session cookies. The jar writes through to it on
//! every save and reads a domain back only when memory has nothing for it.
//! Rows are keyed by (domain, name, path).
//!
//! Two implementations ship: [`InMemoryCookieTable`] for tests and
//! ephemeral profiles, [`SqliteCookieTable`] for disk, using a schema
//! modeled on `net/extras/sqlite/sqlite_persistent_cookie_store.cc`.

use crate::base::neterror::NetError;
use crate::cookies::canonicalcookie::CanonicalCookie;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use time::OffsetDateTime;

/// Row shape of the persistent table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRow {
    pub domain: String,
    pub name: String,
    pub path: String,
    pub value: String,
    pub secure: bool,
    pub http_only: bool,
    pub host_only: bool,
    pub creation_time: OffsetDateTime,
    pub expiration_time: Option<OffsetDateTime>,
}

impl From<&CanonicalCookie> for CookieRow {
    fn from(c: &CanonicalCookie) -> Self {
        Self {
            domain: c.domain.clone(),
            name: c.name.clone(),
            path: c.path.clone(),
            value: c.value.clone(),
            secure: c.secure,
            http_only: c.http_only,
            host_only: c.host_only,
            creation_time: c.creation_time,
            expiration_time: c.expiration_time,
        }
    }
}

impl From<CookieRow> for CanonicalCookie {
    fn from(row: CookieRow) -> Self {
        let mut cookie = CanonicalCookie::new(
            row.name,
            row.value,
            row.domain,
            row.path,
            row.creation_time,
            row.expiration_time,
        );
        cookie.secure = row.secure;
        cookie.http_only = row.http_only;
        cookie.host_only = row.host_only;
        cookie
    }
}

/// Storage contract the jar relies on. Implementations serialize their
/// own writers.
pub trait CookieTable: Send + Sync {
    fn upsert(&self, row: &CookieRow) -> Result<(), NetError>;

    fn query_domain(&self, domain: &str) -> Result<Vec<CookieRow>, NetError>;

    fn delete(&self, domain: &str, name: &str, path: &str) -> Result<(), NetError>;
}

type RowKey = (String, String, String);

/// Cookie table held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCookieTable {
    rows: Mutex<HashMap<RowKey, CookieRow>>,
}

impl InMemoryCookieTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CookieTable for InMemoryCookieTable {
    fn upsert(&self, row: &CookieRow) -> Result<(), NetError> {
        let key = (row.domain.clone(), row.name.clone(), row.path.clone());
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, row.clone());
        Ok(())
    }

    fn query_domain(&self, domain: &str) -> Result<Vec<CookieRow>, NetError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .values()
            .filter(|r| r.domain == domain)
            .cloned()
            .collect())
    }

    fn delete(&self, domain: &str, name: &str, path: &str) -> Result<(), NetError> {
        let key = (domain.to_string(), name.to_string(), path.to_string());
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        Ok(())
    }
}

fn to_nanos(t: OffsetDateTime) -> i64 {
    t.unix_timestamp_nanos().clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn from_nanos(n: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(n as i128).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Cookie table stored in a SQLite database.
pub struct SqliteCookieTable {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteCookieTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCookieTable").finish_non_exhaustive()
    }
}

impl SqliteCookieTable {
    /// Open (or create) the table in the database at `path`.
    pub fn open(path: &Path) -> Result<Self, NetError> {
        let conn = Connection::open(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to open cookie database");
            NetError::PersistentStoreFailure
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, NetError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, NetError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cookies (
                host_key TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                value TEXT NOT NULL,
                is_secure INTEGER NOT NULL,
                is_httponly INTEGER NOT NULL,
                is_host_only INTEGER NOT NULL,
                creation_utc INTEGER NOT NULL,
                expires_utc INTEGER,
                UNIQUE (host_key, name, path)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CookieTable for SqliteCookieTable {
    fn upsert(&self, row: &CookieRow) -> Result<(), NetError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO cookies
                (host_key, name, path, value, is_secure, is_httponly, is_host_only, creation_utc, expires_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.domain,
                row.name,
                row.path,
                row.value,
                row.secure,
                row.http_only,
                row.host_only,
                to_nanos(row.creation_time),
                row.expiration_time.map(to_nanos),
            ],
        )?;
        Ok(())
    }

    fn query_domain(&self, domain: &str) -> Result<Vec<CookieRow>, NetError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT host_key, name, path, value, is_secure, is_httponly, is_host_only, creation_utc, expires_utc
             FROM cookies WHERE host_key = ?1",
        )?;
        let rows = stmt.query_map(params![domain], |r| {
            Ok(CookieRow {
                domain: r.get(0)?,
                name: r.get(1)?,
                path: r.get(2)?,
                value: r.get(3)?,
                secure: r.get(4)?,
                http_only: r.get(5)?,
                host_only: r.get(6)?,
                creation_time: from_nanos(r.get(7)?),
                expiration_time: r.get::<_, Option<i64>>(8)?.map(from_nanos),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn delete(&self, domain: &str, name: &str, path: &str) -> Result<(), NetError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "DELETE FROM cookies WHERE host_key = ?1 AND name = ?2 AND path = ?3",
            params![domain, name, path],
        )?;
        Ok(())
    }
}
