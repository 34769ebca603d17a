//! # pagenet
//!
//! A Chromium-inspired request pipeline for document engines.
//!
//! `pagenet` sits between a document consumer and the network. Per request
//! it decides whether a cached response can be reused, attaches and stores
//! cookies, follows redirects with loop detection, and streams the response
//! to a caller-supplied consumer.
//!
//! ## Features
//!
//! - **Cookie Management**: RFC 6265 parsing, domain/path matching and ordering, PSL validation
//! - **Two-tier Cache**: memory entries with alt-objects over a persistent blob store
//! - **Cache Policy**: per-request-kind reads, conditional revalidation with `If-Modified-Since`
//! - **Redirects**: bounded, with loop detection and credential stripping
//! - **Worker Pool**: bounded concurrency with per-request cancellation
//! - **Proxy Support**: HTTP proxies via CONNECT, with NO_PROXY rules
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pagenet::urlrequest::{RequestDescriptor, RequestHandler, RequestPipeline, URLRequestContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = RequestPipeline::new(URLRequestContext::new());
//!     let url = url::Url::parse("http://example.com/").unwrap();
//!     let handler = RequestHandler::new(RequestDescriptor::get(url));
//!     pipeline.inline(&handler, Box::new(MyConsumer)).await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and load states
//! - [`cookies`] - Cookie parsing, storage and persistence
//! - [`http`] - HTTP client seam, cache and bodies
//! - [`socket`] - TCP connection setup and proxies
//! - [`urlrequest`] - Request pipeline, worker pool and collaborators

pub mod base;
pub mod cookies;
pub mod http;
pub mod socket;
pub mod urlrequest;
