//! HTTP layer.
//!
//! - [`connection`]: the `HttpClient` / `HttpConnection` seam the pipeline drives
//! - [`streamfactory`]: hyper-backed HTTP/1.1 client
//! - [`cachepolicy`], [`httpcache`], [`diskcache`]: freshness rules and the two-tier cache
//! - [`orderedheaders`]: header list that keeps insertion order

pub mod cachepolicy;
pub mod connection;
pub mod diskcache;
pub mod httpcache;
pub mod multipart;
pub mod orderedheaders;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod streamfactory;

// Re-exports for convenience
pub use connection::{HttpClient, HttpConnection};
pub use httpcache::HttpCache;
pub use orderedheaders::OrderedHeaderMap;
pub use requestbody::RequestBody;
pub use response::HttpResponse;
pub use responsebody::ResponseBody;
