use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic Errors
    #[error("Operation failed")]
    Failed,
    #[error("Request aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("File not found")]
    FileNotFound,
    #[error("Insufficient resources")]
    InsufficientResources,
    #[error("Upload file changed")]
    UploadFileChanged,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Internet disconnected")]
    InternetDisconnected,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Tunnel connection failed")]
    TunnelConnectionFailed,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Proxy connection failed")]
    ProxyConnectionFailed,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid redirect")]
    InvalidRedirect,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Method not supported")]
    MethodNotSupported,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,

    // Cache Errors
    #[error("Cache miss")]
    CacheMiss,
    #[error("Cache read failure")]
    CacheReadFailure,
    #[error("Cache write failure")]
    CacheWriteFailure,

    // Crate-specific errors (codes start at -10000)
    #[error("Redirect cycle detected")]
    RedirectCycleDetected,
    #[error("Persistent store failure")]
    PersistentStoreFailure,
    #[error("Invalid header")]
    InvalidHeader,
    #[error("HTTP body error")]
    HttpBodyError,
    #[error("Invalid UTF-8")]
    InvalidUtf8,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    /// True when the error only signals that the request was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NetError::Aborted)
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::FileNotFound => -6,
            NetError::InsufficientResources => -12,
            NetError::UploadFileChanged => -14,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::InternetDisconnected => -106,
            NetError::AddressUnreachable => -109,
            NetError::TunnelConnectionFailed => -111,
            NetError::ConnectionTimedOut => -118,
            NetError::ProxyConnectionFailed => -130,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidRedirect => -303,
            NetError::TooManyRedirects => -310,
            NetError::InvalidResponse => -320,
            NetError::MethodNotSupported => -322,
            NetError::EmptyResponse => -324,
            NetError::ContentDecodingFailed => -330,
            NetError::InvalidHttpResponse => -370,

            NetError::CacheMiss => -400,
            NetError::CacheReadFailure => -401,
            NetError::CacheWriteFailure => -410,

            NetError::RedirectCycleDetected => -10000,
            NetError::PersistentStoreFailure => -10001,
            NetError::InvalidHeader => -10002,
            NetError::HttpBodyError => -10003,
            NetError::InvalidUtf8 => -10004,
            NetError::Unknown(code) => *code,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -6 => NetError::FileNotFound,
            -12 => NetError::InsufficientResources,
            -14 => NetError::UploadFileChanged,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -106 => NetError::InternetDisconnected,
            -109 => NetError::AddressUnreachable,
            -111 => NetError::TunnelConnectionFailed,
            -118 => NetError::ConnectionTimedOut,
            -130 => NetError::ProxyConnectionFailed,

            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -302 => NetError::UnknownUrlScheme,
            -303 => NetError::InvalidRedirect,
            -310 => NetError::TooManyRedirects,
            -320 => NetError::InvalidResponse,
            -322 => NetError::MethodNotSupported,
            -324 => NetError::EmptyResponse,
            -330 => NetError::ContentDecodingFailed,
            -370 => NetError::InvalidHttpResponse,

            -400 => NetError::CacheMiss,
            -401 => NetError::CacheReadFailure,
            -410 => NetError::CacheWriteFailure,

            -10000 => NetError::RedirectCycleDetected,
            -10001 => NetError::PersistentStoreFailure,
            -10002 => NetError::InvalidHeader,
            -10003 => NetError::HttpBodyError,
            -10004 => NetError::InvalidUtf8,
            _ => NetError::Unknown(code),
        }
    }
}

impl From<rusqlite::Error> for NetError {
    fn from(_: rusqlite::Error) -> Self {
        NetError::PersistentStoreFailure
    }
}
