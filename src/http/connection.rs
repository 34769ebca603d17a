//! Transport seam between the request pipeline and an HTTP implementation.
//!
//! The pipeline drives a connection through a fixed sequence: configure
//! method and headers, [`send_request`](HttpConnection::send_request),
//! [`read_response_head`](HttpConnection::read_response_head), then
//! [`read_chunk`](HttpConnection::read_chunk) until `None`.
//! [`disconnect`](HttpConnection::disconnect) may be called at any point.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::RequestBody;
use crate::socket::proxy::ProxySettings;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Method, StatusCode};
use url::Url;

/// Pending result of [`HttpClient::open`].
pub type Opening = BoxFuture<'static, Result<Box<dyn HttpConnection>, NetError>>;

/// Opens connections for the pipeline.
pub trait HttpClient: Send + Sync {
    /// Open a connection able to carry one request to `url`.
    fn open(&self, url: &Url, proxy: Option<&ProxySettings>) -> Opening;
}

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    /// Headers in wire order, repeated names preserved.
    pub headers: OrderedHeaderMap,
}

/// A single-request HTTP/1.1 exchange.
pub trait HttpConnection: Send {
    fn set_method(&mut self, method: Method);

    /// The pipeline always passes `false`; redirects are handled above
    /// the transport.
    fn set_follow_redirects(&mut self, follow: bool);

    fn request_headers_mut(&mut self) -> &mut OrderedHeaderMap;

    fn send_request(&mut self, body: RequestBody) -> BoxFuture<'_, Result<(), NetError>>;

    fn read_response_head(&mut self) -> BoxFuture<'_, Result<ResponseHead, NetError>>;

    /// Next decoded body chunk, `None` at end of body.
    fn read_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, NetError>>;

    /// Abort the exchange and release the socket.
    fn disconnect(&mut self);
}
