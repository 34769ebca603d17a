//! Shared fixtures: a scripted in-process HTTP client and recording
//! collaborators.

#![allow(dead_code)]

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use http::{Method, StatusCode};
use pagenet::base::neterror::NetError;
use pagenet::http::connection::{HttpClient, HttpConnection, Opening, ResponseHead};
use pagenet::http::httpcache::AltObject;
use pagenet::http::orderedheaders::OrderedHeaderMap;
use pagenet::http::requestbody::RequestBody;
use pagenet::http::response::HttpResponse;
use pagenet::socket::proxy::ProxySettings;
use pagenet::urlrequest::delegate::{
    PermissionKind, ProgressEvent, ProgressKind, ProgressSink, RequestPermission, ResponseConsumer,
};
use pagenet::urlrequest::{URLRequestContext, URLRequestContextConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use url::Url;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    chunks: Vec<Bytes>,
    hang: bool,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            headers: Vec::new(),
            chunks: Vec::new(),
            hang: false,
        }
    }

    pub fn ok(body: &str) -> Self {
        Self::new(200).body(body)
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).header("location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.chunks = vec![Bytes::copy_from_slice(body.as_bytes())];
        self
    }

    pub fn chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|c| Bytes::copy_from_slice(c.as_bytes())).collect();
        self
    }

    /// Never finish the body after the scripted chunks.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub url: Url,
    pub method: Method,
    pub headers: OrderedHeaderMap,
    pub body: Bytes,
    pub proxied: bool,
}

impl SentRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_str(name)
    }
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<SentRequest>>,
    opens: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Scripted [`HttpClient`]. Each URL answers with its queued responses in
/// order; the last one repeats.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<MockState>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, url: &str, response: MockResponse) -> &Self {
        self.state
            .routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn next_response(&self, key: &str) -> Option<MockResponse> {
        let mut routes = self.state.routes.lock().unwrap();
        let queue = routes.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl HttpClient for MockClient {
    fn open(&self, url: &Url, proxy: Option<&ProxySettings>) -> Opening {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let mut key = url.clone();
        key.set_fragment(None);
        let response = self.next_response(key.as_str());
        let conn = MockConnection {
            url: url.clone(),
            method: Method::GET,
            headers: OrderedHeaderMap::new(),
            state: self.state.clone(),
            response,
            chunks: VecDeque::new(),
            proxied: proxy.is_some(),
        };
        Box::pin(async move {
            if conn.response.is_none() {
                return Err(NetError::NameNotResolved);
            }
            Ok(Box::new(conn) as Box<dyn HttpConnection>)
        })
    }
}

struct MockConnection {
    url: Url,
    method: Method,
    headers: OrderedHeaderMap,
    state: Arc<MockState>,
    response: Option<MockResponse>,
    chunks: VecDeque<Bytes>,
    proxied: bool,
}

impl HttpConnection for MockConnection {
    fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    fn set_follow_redirects(&mut self, follow: bool) {
        assert!(!follow, "the pipeline handles redirects itself");
    }

    fn request_headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    fn send_request(&mut self, body: RequestBody) -> BoxFuture<'_, Result<(), NetError>> {
        Box::pin(async move {
            let body = match body {
                RequestBody::Empty => Bytes::new(),
                RequestBody::Bytes(b) => b,
                RequestBody::Stream(s) => {
                    let parts: Vec<Bytes> = s.try_collect().await?;
                    Bytes::from(parts.concat())
                }
            };
            self.state.requests.lock().unwrap().push(SentRequest {
                url: self.url.clone(),
                method: self.method.clone(),
                headers: self.headers.clone(),
                body,
                proxied: self.proxied,
            });
            Ok(())
        })
    }

    fn read_response_head(&mut self) -> BoxFuture<'_, Result<ResponseHead, NetError>> {
        Box::pin(async move {
            let response = self.response.as_ref().ok_or(NetError::EmptyResponse)?;
            let mut headers = OrderedHeaderMap::new();
            for (name, value) in &response.headers {
                headers.append(name, value)?;
            }
            self.chunks = response.chunks.iter().cloned().collect();
            Ok(ResponseHead {
                status: response.status,
                headers,
            })
        })
    }

    fn read_chunk(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, NetError>> {
        Box::pin(async move {
            if let Some(chunk) = self.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            if self.response.as_ref().is_some_and(|r| r.hang) {
                futures::future::pending::<()>().await;
            }
            Ok(None)
        })
    }

    fn disconnect(&mut self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.chunks.clear();
    }
}

/// What a consumer received.
#[derive(Debug)]
pub enum Outcome {
    Response {
        url: Url,
        status: StatusCode,
        body: Bytes,
        from_cache: bool,
        revalidated: bool,
        alt: Option<AltObject>,
    },
    Error(NetError),
    Cancelled,
}

impl Outcome {
    pub fn body_text(&self) -> String {
        match self {
            Outcome::Response { body, .. } => String::from_utf8_lossy(body).into_owned(),
            other => panic!("expected a response, got {other:?}"),
        }
    }
}

/// Reads the whole body, reports the outcome and optionally returns an
/// alt-object for caching.
pub struct Collector {
    tx: oneshot::Sender<Outcome>,
    alt: Option<AltObject>,
}

pub fn collector() -> (Box<dyn ResponseConsumer>, oneshot::Receiver<Outcome>) {
    collector_with_alt(None)
}

pub fn collector_with_alt(
    alt: Option<AltObject>,
) -> (Box<dyn ResponseConsumer>, oneshot::Receiver<Outcome>) {
    let (tx, rx) = oneshot::channel();
    (Box::new(Collector { tx, alt }), rx)
}

impl ResponseConsumer for Collector {
    fn on_response(
        self: Box<Self>,
        response: HttpResponse,
    ) -> BoxFuture<'static, Result<Option<AltObject>, NetError>> {
        Box::pin(async move {
            let url = response.url().clone();
            let status = response.status();
            let from_cache = response.is_from_cache();
            let revalidated = response.was_revalidated();
            let alt = response.alt_object().cloned();
            match response.bytes().await {
                Ok(body) => {
                    let _ = self.tx.send(Outcome::Response {
                        url,
                        status,
                        body,
                        from_cache,
                        revalidated,
                        alt,
                    });
                    Ok(self.alt)
                }
                Err(e) => {
                    let _ = self.tx.send(Outcome::Error(e));
                    Err(e)
                }
            }
        })
    }

    fn on_error(self: Box<Self>, error: NetError) {
        let _ = self.tx.send(Outcome::Error(error));
    }

    fn on_cancelled(self: Box<Self>) {
        let _ = self.tx.send(Outcome::Cancelled);
    }
}

/// Records progress event kinds.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn kinds(&self) -> Vec<ProgressKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Denies one permission kind.
pub struct Deny(pub PermissionKind);

impl RequestPermission for Deny {
    fn is_request_permitted(&self, _url: &Url, kind: PermissionKind) -> bool {
        kind != self.0
    }
}

pub fn context(client: &MockClient) -> Arc<URLRequestContext> {
    context_with(client, URLRequestContextConfig::default())
}

pub fn context_with(client: &MockClient, config: URLRequestContextConfig) -> Arc<URLRequestContext> {
    URLRequestContext::builder()
        .config(config)
        .http_client(Arc::new(client.clone()))
        .build()
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Start a one-request-per-connection HTTP server on localhost. `respond`
/// gets the raw request head and returns the raw response.
pub async fn spawn_http_server<F, R>(respond: F) -> String
where
    F: Fn(&str) -> R + Send + Sync + 'static,
    R: Into<Vec<u8>>,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut len = 0;
                // Read until the end of the head plus any declared body.
                loop {
                    let n = socket.read(&mut buf[len..]).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    len += n;
                    let text = String::from_utf8_lossy(&buf[..len]);
                    if let Some(end) = text.find("\r\n\r\n") {
                        let body_len = text[..end]
                            .lines()
                            .find_map(|l| {
                                let (k, v) = l.split_once(':')?;
                                k.eq_ignore_ascii_case("content-length")
                                    .then(|| v.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if len >= end + 4 + body_len {
                            break;
                        }
                    }
                    if len == buf.len() {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..len]).into_owned();
                let response: Vec<u8> = respond(&request).into();
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Raw `HTTP/1.1` response with a `Content-Length` and `Connection: close`.
pub fn raw_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    out
}
