//! Per-request state machine.
//!
//! A job resolves the connection URL, consults the cache, talks to the
//! network, follows redirects in a bounded loop and hands the response to
//! the consumer. Cache and cookie writes are best-effort side effects.

use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::http::cachepolicy::{cacheable_expiry, decide_read, format_http_date, CacheDecision, Expiry};
use crate::http::connection::HttpConnection;
use crate::http::httpcache::{CacheEntry, CachedResponse};
use crate::http::multipart::{Form, Part};
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::RequestBody;
use crate::http::response::HttpResponse;
use crate::http::responsebody::{BodyRecorder, LoadProgress, ResponseBody};
use crate::urlrequest::context::URLRequestContext;
use crate::urlrequest::delegate::{
    report_failure, PermissionKind, ProgressEvent, ProgressKind, ResponseConsumer,
};
use crate::urlrequest::request::{Enctype, FormValue, RequestHandler};
use crate::urlrequest::resolve::resolve_connection_url;
use http::{Method, StatusCode};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Response headers that carry cookies.
const SET_COOKIE_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// Extra request headers dropped when a redirect leaves the origin.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization"];

/// Identity of a resource for redirect loop detection.
type Signature = (String, String, u16, String);

fn signature(url: &Url) -> Signature {
    (
        url.scheme().to_string(),
        url.host_str().unwrap_or_default().to_ascii_lowercase(),
        url.port_or_known_default().unwrap_or(0),
        url.path().to_string(),
    )
}

/// Body still to be written for the current hop.
enum PendingBody {
    None,
    Raw(String, bytes::Bytes),
    Form,
}

/// Cacheable network response waiting for its body to be read.
struct CacheWrite {
    url: Url,
    headers: OrderedHeaderMap,
    expiry: Expiry,
    request_time: OffsetDateTime,
    recorder: Arc<Mutex<BodyRecorder>>,
}

/// Response ready for the consumer.
struct Delivery {
    response: HttpResponse,
    cache_write: Option<CacheWrite>,
    /// Entry the response was served from, if any.
    cache_hit: Option<(Url, CacheEntry)>,
}

/// Drives one [`RequestHandler`] to completion.
pub struct URLRequestJob {
    context: Arc<URLRequestContext>,
    handler: RequestHandler,
    method: Method,
    url: Url,
}

impl URLRequestJob {
    pub fn new(context: Arc<URLRequestContext>, handler: RequestHandler) -> Self {
        let desc = handler.descriptor();
        let method = desc.method.clone();
        let url = desc.url.clone();
        Self {
            context,
            handler,
            method,
            url,
        }
    }

    /// Run the request and deliver its outcome to `consumer`, exactly once.
    ///
    /// Returns the request's outcome as well.
    pub async fn run(mut self, consumer: Box<dyn ResponseConsumer>) -> Result<(), NetError> {
        let delivery = match self.fetch().await {
            Ok(delivery) => delivery,
            Err(e) => {
                if e.is_cancellation() {
                    tracing::debug!(url = %self.url, "request cancelled");
                } else {
                    tracing::debug!(url = %self.url, error = %e, "request failed");
                }
                self.finish();
                report_failure(consumer, e);
                return Err(e);
            }
        };

        self.set_state(LoadState::Building);
        self.progress(ProgressKind::Building, 0, None);

        let Delivery {
            response,
            cache_write,
            cache_hit,
        } = delivery;
        let result = consumer.on_response(response).await;
        let alt_object = result.as_ref().ok().cloned().flatten();

        if let Some(write) = cache_write {
            let body = write
                .recorder
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .take_complete();
            match body {
                Some(body) => self.context.http_cache().store_response(
                    &write.url,
                    &write.headers,
                    body,
                    Some(write.expiry),
                    alt_object,
                    write.request_time,
                ),
                None => tracing::debug!(url = %write.url, "body incomplete or too large, not cached"),
            }
        } else if let (Some((url, mut entry)), Some(alt)) = (cache_hit, alt_object) {
            if entry.alt_object.is_none() {
                entry.alt_object = Some(alt);
                self.context.http_cache().promote(&url, entry);
            }
        }

        self.finish();
        result.map(|_| ())
    }

    async fn fetch(&mut self) -> Result<Delivery, NetError> {
        let context = self.context.clone();
        let config = context.config();
        let cache = context.http_cache();
        let handler = self.handler.clone();
        let desc = handler.descriptor();
        let token = handler.token().clone();

        self.url = resolve_connection_url(desc);
        let mut pending_body = match (&desc.alt_post_body, desc.params.is_empty()) {
            _ if desc.method != Method::POST => PendingBody::None,
            (Some((content_type, body)), _) => PendingBody::Raw(content_type.clone(), body.clone()),
            (None, false) => PendingBody::Form,
            (None, true) => PendingBody::None,
        };
        let mut extra_headers = desc.extra_headers.clone();
        let mut seen = HashSet::from([signature(&self.url)]);
        let mut depth = 0usize;

        loop {
            if token.is_cancelled() {
                return Err(NetError::Aborted);
            }

            // Cache lookup.
            let now = OffsetDateTime::now_utc();
            let mut stale = None;
            if decide_read(desc.kind, &self.method, None, now) != CacheDecision::NeverCache {
                let cached = cache.lookup(&self.url);
                let stored = cached.as_ref().map(|c| c.entry.expiry);
                match (decide_read(desc.kind, &self.method, stored, now), cached) {
                    (CacheDecision::Fresh, Some(cached)) => {
                        tracing::debug!(url = %self.url, "served from cache");
                        if !cached.in_memory {
                            cache.promote(&self.url, cached.entry.clone());
                        }
                        return Ok(self.deliver_cached(cached.entry, false));
                    }
                    (CacheDecision::Stale, Some(cached)) => stale = Some(cached),
                    _ => {}
                }
            }

            // Connect.
            self.set_state(LoadState::Connecting);
            self.progress(ProgressKind::Connecting, 0, None);
            let proxy = context.proxy_for(&self.url);
            let mut conn = race(&token, context.client().open(&self.url, proxy)).await?;
            conn.set_method(self.method.clone());
            conn.set_follow_redirects(false);

            let body = self.prepare_request(conn.as_mut(), &pending_body, &extra_headers, stale.as_ref())?;

            // Send and wait for the head.
            self.set_state(LoadState::SendingRequest);
            self.progress(ProgressKind::Sending, 0, None);
            let request_time = OffsetDateTime::now_utc();
            if let Err(e) = race(&token, conn.send_request(body)).await {
                conn.disconnect();
                return Err(e);
            }

            self.set_state(LoadState::WaitingForResponse);
            self.progress(ProgressKind::Waiting, 0, None);
            let head = match race(&token, conn.read_response_head()).await {
                Ok(head) => head,
                Err(e) => {
                    conn.disconnect();
                    return Err(e);
                }
            };
            tracing::debug!(url = %self.url, status = head.status.as_u16(), "response head");

            // Cookies are stored before anything is delivered.
            self.save_cookies(&head.headers);

            match head.status {
                StatusCode::NOT_MODIFIED => {
                    conn.disconnect();
                    let Some(cached) = stale else {
                        tracing::debug!(url = %self.url, "304 without a cached entry");
                        return Err(NetError::InvalidResponse);
                    };
                    let entry = cache.revalidation_hit(&self.url, cached, &head.headers, request_time);
                    return Ok(self.deliver_cached(entry, true));
                }
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {
                    if let Some(target) = redirect_target(&self.url, &head.headers)? {
                        conn.disconnect();
                        depth += 1;
                        if depth > config.max_redirects {
                            return Err(NetError::TooManyRedirects);
                        }
                        if !seen.insert(signature(&target)) {
                            tracing::debug!(url = %target, "redirect loop");
                            return Err(NetError::RedirectCycleDetected);
                        }

                        let to_get = (head.status == StatusCode::SEE_OTHER
                            && self.method != Method::HEAD)
                            || self.method == Method::POST;
                        if to_get {
                            self.method = Method::GET;
                            pending_body = PendingBody::None;
                        }
                        if target.origin() != self.url.origin() {
                            for name in CREDENTIAL_HEADERS {
                                extra_headers.remove(name);
                            }
                        }

                        tracing::debug!(from = %self.url, to = %target, depth, "following redirect");
                        self.url = target;
                        continue;
                    }
                }
                _ => {}
            }

            return Ok(self.deliver_network(conn, head.status, head.headers, request_time, &token));
        }
    }

    /// Attach headers to `conn` and build the request body.
    fn prepare_request(
        &self,
        conn: &mut dyn HttpConnection,
        pending_body: &PendingBody,
        extra_headers: &OrderedHeaderMap,
        stale: Option<&CachedResponse>,
    ) -> Result<RequestBody, NetError> {
        let context = &self.context;
        let config = context.config();
        let desc = self.handler.descriptor();
        let headers = conn.request_headers_mut();

        headers.insert("user-agent", &config.user_agent)?;
        headers.insert("accept", &config.accept)?;
        headers.insert("accept-encoding", &config.accept_encoding)?;
        if let Some(lang) = &config.accept_language {
            headers.insert("accept-language", lang)?;
        }

        if let Some(stale) = stale {
            let since = match stale.entry.headers.get_str("date") {
                Some(date) => date.to_string(),
                None => format_http_date(stale.entry.request_time),
            };
            headers.insert("if-modified-since", &since)?;
        }

        if let Some(referrer) = &desc.referrer {
            if context
                .permission()
                .is_request_permitted(&self.url, PermissionKind::Referrer)
            {
                let mut referrer = referrer.clone();
                referrer.set_fragment(None);
                let _ = referrer.set_username("");
                let _ = referrer.set_password(None);
                headers.insert("referer", referrer.as_str())?;
            }
        }

        if context
            .permission()
            .is_request_permitted(&self.url, PermissionKind::Cookie)
        {
            if let Some(cookies) = context.cookie_store().cookie_header_for_url(&self.url) {
                headers.insert("cookie", &cookies)?;
            }
        }

        for (name, value) in extra_headers.iter() {
            headers.insert_header(name.clone(), value.clone());
        }

        let body = match pending_body {
            PendingBody::None => RequestBody::Empty,
            PendingBody::Raw(content_type, body) => {
                headers.insert("content-type", content_type)?;
                RequestBody::Bytes(body.clone())
            }
            PendingBody::Form => match desc.enctype {
                Enctype::UrlEncoded => {
                    headers.insert("content-type", "application/x-www-form-urlencoded")?;
                    let texts: Vec<(String, String)> = desc
                        .params
                        .iter()
                        .map(|f| (f.name.clone(), f.value.as_text()))
                        .collect();
                    RequestBody::form_urlencoded(texts.iter().map(|(n, v)| (n.as_str(), v.as_str())))
                }
                Enctype::Multipart => {
                    let form = desc.params.iter().fold(Form::new(), |form, field| {
                        form.part(field.name.clone(), multipart_part(&field.value))
                    });
                    headers.insert("content-type", &form.content_type())?;
                    form.into_body()
                }
            },
        };
        Ok(body)
    }

    fn save_cookies(&self, headers: &OrderedHeaderMap) {
        let has_cookies = SET_COOKIE_HEADERS.iter().any(|name| headers.contains(name));
        if !has_cookies
            || !self
                .context
                .permission()
                .is_request_permitted(&self.url, PermissionKind::Cookie)
        {
            return;
        }
        let jar = self.context.cookie_store();
        for name in SET_COOKIE_HEADERS {
            for value in headers.get_all(name) {
                match value.to_str() {
                    Ok(line) => jar.parse_and_save_cookie(&self.url, line),
                    Err(_) => tracing::debug!(url = %self.url, "non-ascii set-cookie ignored"),
                }
            }
        }
    }

    fn deliver_cached(&self, entry: CacheEntry, revalidated: bool) -> Delivery {
        let response = HttpResponse::from_cache(
            self.url.clone(),
            entry.headers.clone(),
            entry.body.clone(),
            entry.alt_object.clone(),
            revalidated,
        );
        Delivery {
            response,
            cache_write: None,
            cache_hit: Some((self.url.clone(), entry)),
        }
    }

    fn deliver_network(
        &self,
        conn: Box<dyn HttpConnection>,
        status: StatusCode,
        headers: OrderedHeaderMap,
        request_time: OffsetDateTime,
        token: &CancellationToken,
    ) -> Delivery {
        let config = self.context.config();
        let cache = self.context.http_cache();

        let expiry = cacheable_expiry(&self.method, status, &headers, request_time, cache.default_offset());
        let evict = self.method == Method::GET
            && expiry.is_none()
            && (status == StatusCode::OK || (config.evict_cache_on_error && status.as_u16() >= 400));
        if evict {
            cache.remove(&self.url);
        }

        let cache_write = expiry.map(|expiry| CacheWrite {
            url: self.url.clone(),
            headers: headers.clone(),
            expiry,
            request_time,
            recorder: BodyRecorder::shared(config.max_recorded_body_bytes),
        });

        let max = headers
            .get_str("content-length")
            .and_then(|v| v.trim().parse().ok());
        let progress = LoadProgress {
            sink: self.context.progress().clone(),
            url: self.url.clone(),
            method: self.method.clone(),
            max,
        };
        let body = ResponseBody::network(
            conn,
            token.clone(),
            Some(progress),
            cache_write.as_ref().map(|w| w.recorder.clone()),
        );

        self.set_state(LoadState::ReadingResponse);
        Delivery {
            response: HttpResponse::from_network(self.url.clone(), status, headers, body),
            cache_write,
            cache_hit: None,
        }
    }

    fn finish(&self) {
        self.set_state(LoadState::Done);
        self.progress(ProgressKind::Done, 0, None);
    }

    fn set_state(&self, state: LoadState) {
        tracing::trace!(url = %self.url, ?state, "load state");
        self.handler.set_load_state(state);
    }

    fn progress(&self, kind: ProgressKind, value: u64, max: Option<u64>) {
        self.context.progress().on_progress(&ProgressEvent {
            kind,
            url: self.url.clone(),
            method: self.method.clone(),
            value,
            max,
        });
    }
}

fn multipart_part(value: &FormValue) -> Part {
    match value {
        FormValue::Text(text) => Part::text(text.clone()),
        FormValue::File {
            path,
            file_name,
            content_type,
        } => {
            let mut part = Part::file(path.clone());
            if let Some(name) = file_name {
                part = part.file_name(name.clone());
            }
            if let Some(mime) = content_type {
                part = part.content_type(mime.clone());
            }
            part
        }
    }
}

/// Resolve the `Location` of a redirect against `base`.
///
/// `Ok(None)` when there is no usable Location; the response is then
/// delivered as-is. Targets outside http(s) fail.
fn redirect_target(base: &Url, headers: &OrderedHeaderMap) -> Result<Option<Url>, NetError> {
    let Some(location) = headers.get_str("location").map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let Ok(mut target) = base.join(location) else {
        tracing::debug!(location = %location, "unparseable redirect location");
        return Ok(None);
    };
    if !matches!(target.scheme(), "http" | "https") {
        tracing::debug!(url = %target, "redirect to unsupported scheme");
        return Err(NetError::InvalidRedirect);
    }
    if target.fragment().is_none() {
        target.set_fragment(base.fragment());
    }
    Ok(Some(target))
}

/// Await `fut` unless the request is cancelled first.
async fn race<T, F>(token: &CancellationToken, fut: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(NetError::Aborted),
        result = fut => result,
    }
}
