//! Socket layer.
//!
//! Establishes the byte streams HTTP/1.1 connections run over:
//! - [`ConnectJob`](connectjob::ConnectJob): DNS, TCP and proxy tunnel setup
//! - [`ProxySettings`](proxy::ProxySettings): Proxy endpoint, credentials and NO_PROXY rules

pub mod connectjob;
pub mod proxy;
