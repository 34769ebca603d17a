//! Request layer.
//!
//! - [`pipeline::RequestPipeline`]: inline and scheduled execution
//! - [`job::URLRequestJob`]: cache, network and redirect handling for one request
//! - [`context::URLRequestContext`]: shared cookie jar, cache and collaborators
//! - [`request`]: request descriptors and cancellable handles
//! - [`delegate`]: permission, progress and consumer callbacks

pub mod context;
pub mod delegate;
pub mod guess;
pub mod job;
pub mod pipeline;
pub mod pool;
pub mod request;
pub mod resolve;

pub use context::{URLRequestContext, URLRequestContextBuilder, URLRequestContextConfig};
pub use pipeline::RequestPipeline;
pub use request::{RequestDescriptor, RequestHandler, RequestKind};
