//! Ergonomic error context helpers.
//!
//! Provides extension traits for converting IO errors into `NetError`
//! variants, logging the failing endpoint once at the conversion site.

use crate::base::neterror::NetError;
use std::io::{self, ErrorKind};

/// Map an IO error kind onto the closest network error.
pub fn net_error_from_io(err: &io::Error) -> NetError {
    match err.kind() {
        ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        ErrorKind::ConnectionReset => NetError::ConnectionReset,
        ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        ErrorKind::NotConnected | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
            NetError::ConnectionClosed
        }
        ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        ErrorKind::AddrNotAvailable => NetError::AddressUnreachable,
        ErrorKind::NotFound => NetError::FileNotFound,
        _ => NetError::Failed,
    }
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use pagenet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 80)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add DNS resolution context to an IO error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Add upload file context to an IO error.
    fn file_context(self, path: &std::path::Path) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, port, error = %e, "connection failed");
            net_error_from_io(&e)
        })
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(domain = %domain, error = %e, "name resolution failed");
            NetError::NameNotResolved
        })
    }

    fn file_context(self, path: &std::path::Path) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "upload file unreadable");
            match e.kind() {
                ErrorKind::NotFound => NetError::FileNotFound,
                _ => NetError::UploadFileChanged,
            }
        })
    }
}
