//! [`HttpClient`] over hyper HTTP/1.1 client connections.
//!
//! One connection per request: `open` runs a [`ConnectJob`], performs the
//! HTTP/1.1 handshake and spawns the connection driver. Response bodies
//! with `Content-Encoding: gzip` or `deflate` are decoded while streaming.

use crate::base::neterror::NetError;
use crate::http::connection::{HttpClient, HttpConnection, Opening, ResponseHead};
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::RequestBody;
use crate::socket::connectjob::ConnectJob;
use crate::socket::proxy::ProxySettings;
use bytes::Bytes;
use flate2::write::{GzDecoder, ZlibDecoder};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HOST};
use http::{Method, Request, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::io::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

type OutgoingBody = UnsyncBoxBody<Bytes, NetError>;

/// Opens plain-`http` connections, directly or through a CONNECT tunnel.
#[derive(Debug, Clone, Default)]
pub struct HyperClient {
    connect_timeout: Option<Duration>,
}

impl HyperClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound DNS, TCP, tunnel and handshake setup.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn establish(url: Url, proxy: Option<ProxySettings>) -> Result<HyperConnection, NetError> {
        let stream = ConnectJob::connect(&url, proxy.as_ref()).await?;
        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| {
                tracing::debug!(url = %url, error = %e, "http/1.1 handshake failed");
                NetError::ConnectionFailed
            })?;

        let driver_url = url.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(url = %driver_url, error = %e, "connection driver ended");
            }
        });

        Ok(HyperConnection {
            url,
            method: Method::GET,
            headers: OrderedHeaderMap::new(),
            sender: Some(sender),
            pending: None,
            body: None,
            decoder: None,
            driver,
        })
    }
}

impl HttpClient for HyperClient {
    fn open(&self, url: &Url, proxy: Option<&ProxySettings>) -> Opening {
        let url = url.clone();
        let proxy = proxy.cloned();
        let timeout = self.connect_timeout;
        Box::pin(async move {
            if url.scheme() != "http" {
                return Err(NetError::DisallowedUrlScheme);
            }
            let conn = match timeout {
                Some(limit) => tokio::time::timeout(limit, Self::establish(url, proxy))
                    .await
                    .map_err(|_| NetError::ConnectionTimedOut)??,
                None => Self::establish(url, proxy).await?,
            };
            Ok(Box::new(conn) as Box<dyn HttpConnection>)
        })
    }
}

/// One request/response exchange on a hyper connection.
pub struct HyperConnection {
    url: Url,
    method: Method,
    headers: OrderedHeaderMap,
    sender: Option<http1::SendRequest<OutgoingBody>>,
    pending: Option<BoxFuture<'static, Result<Response<Incoming>, hyper::Error>>>,
    body: Option<Incoming>,
    decoder: Option<ContentDecoder>,
    driver: JoinHandle<()>,
}

impl HyperConnection {
    fn build_request(&self, body: RequestBody) -> Result<Request<OutgoingBody>, NetError> {
        let mut target = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut builder = Request::builder().method(self.method.clone()).uri(target);
        if !self.headers.contains(HOST.as_str()) {
            let host = self.url.host_str().ok_or(NetError::InvalidUrl)?;
            let host = match self.url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            builder = builder.header(HOST, host);
        }
        for (name, value) in self.headers.iter() {
            builder = builder.header(name, value);
        }

        builder.body(outgoing_body(body)).map_err(|e| {
            tracing::debug!(url = %self.url, error = %e, "invalid request");
            NetError::InvalidArgument
        })
    }
}

impl HttpConnection for HyperConnection {
    fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    // hyper's connection-level client never follows redirects.
    fn set_follow_redirects(&mut self, _follow: bool) {}

    fn request_headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    fn send_request(&mut self, body: RequestBody) -> BoxFuture<'_, Result<(), NetError>> {
        Box::pin(async move {
            let request = self.build_request(body)?;
            let sender = self.sender.as_mut().ok_or(NetError::ConnectionClosed)?;
            sender.ready().await.map_err(|e| map_hyper_error(&e))?;
            self.pending = Some(Box::pin(sender.send_request(request)));
            Ok(())
        })
    }

    fn read_response_head(&mut self) -> BoxFuture<'_, Result<ResponseHead, NetError>> {
        Box::pin(async move {
            let pending = self.pending.take().ok_or(NetError::InvalidArgument)?;
            let response = pending.await.map_err(|e| {
                tracing::debug!(url = %self.url, error = %e, "no response head");
                map_hyper_error(&e)
            })?;
            let (parts, body) = response.into_parts();

            let mut headers = OrderedHeaderMap::from(&parts.headers);
            self.decoder = headers
                .get_str(CONTENT_ENCODING.as_str())
                .and_then(ContentDecoder::for_encoding);
            if self.decoder.is_some() {
                headers.remove(CONTENT_ENCODING.as_str());
                headers.remove(CONTENT_LENGTH.as_str());
            }
            self.body = Some(body);

            Ok(ResponseHead {
                status: parts.status,
                headers,
            })
        })
    }

    fn read_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, NetError>> {
        Box::pin(async move {
            loop {
                let Some(body) = self.body.as_mut() else {
                    return Ok(None);
                };
                match body.frame().await {
                    None => {
                        self.body = None;
                        let tail = match self.decoder.take() {
                            Some(decoder) => decoder.finish()?,
                            None => Bytes::new(),
                        };
                        return Ok((!tail.is_empty()).then_some(tail));
                    }
                    Some(Err(e)) => {
                        tracing::debug!(url = %self.url, error = %e, "body read failed");
                        self.body = None;
                        return Err(NetError::HttpBodyError);
                    }
                    Some(Ok(frame)) => {
                        let Ok(data) = frame.into_data() else {
                            continue;
                        };
                        let data = match self.decoder.as_mut() {
                            Some(decoder) => decoder.feed(&data)?,
                            None => data,
                        };
                        if !data.is_empty() {
                            return Ok(Some(data));
                        }
                    }
                }
            }
        })
    }

    fn disconnect(&mut self) {
        self.pending = None;
        self.body = None;
        self.sender = None;
        self.driver.abort();
    }
}

impl Drop for HyperConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn outgoing_body(body: RequestBody) -> OutgoingBody {
    match body {
        RequestBody::Empty => Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync(),
        RequestBody::Bytes(b) => Full::new(b).map_err(|never| match never {}).boxed_unsync(),
        RequestBody::Stream(s) => StreamBody::new(s.map_ok(Frame::data)).boxed_unsync(),
    }
}

fn map_hyper_error(e: &hyper::Error) -> NetError {
    if e.is_parse() {
        NetError::InvalidHttpResponse
    } else if e.is_incomplete_message() {
        NetError::EmptyResponse
    } else if e.is_canceled() || e.is_closed() {
        NetError::ConnectionClosed
    } else if e.is_timeout() {
        NetError::ConnectionTimedOut
    } else {
        NetError::ConnectionReset
    }
}

/// Streaming `Content-Encoding` decoder.
enum ContentDecoder {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl ContentDecoder {
    fn for_encoding(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(ContentDecoder::Gzip(GzDecoder::new(Vec::new()))),
            "deflate" => Some(ContentDecoder::Deflate(ZlibDecoder::new(Vec::new()))),
            other => {
                if !other.is_empty() && other != "identity" {
                    tracing::debug!(encoding = %other, "passing through undecoded body");
                }
                None
            }
        }
    }

    fn feed(&mut self, data: &[u8]) -> Result<Bytes, NetError> {
        let out = match self {
            ContentDecoder::Gzip(d) => {
                d.write_all(data).map_err(decode_error)?;
                std::mem::take(d.get_mut())
            }
            ContentDecoder::Deflate(d) => {
                d.write_all(data).map_err(decode_error)?;
                std::mem::take(d.get_mut())
            }
        };
        Ok(Bytes::from(out))
    }

    fn finish(self) -> Result<Bytes, NetError> {
        let out = match self {
            ContentDecoder::Gzip(d) => d.finish(),
            ContentDecoder::Deflate(d) => d.finish(),
        }
        .map_err(decode_error)?;
        Ok(Bytes::from(out))
    }
}

fn decode_error(e: std::io::Error) -> NetError {
    tracing::debug!(error = %e, "content decoding failed");
    NetError::ContentDecodingFailed
}
