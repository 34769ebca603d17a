//! Caller-supplied collaborators: permission policy, progress sink and
//! response consumer.

use crate::base::neterror::NetError;
use crate::http::httpcache::AltObject;
use crate::http::response::HttpResponse;
use futures::future::BoxFuture;
use http::Method;
use url::Url;

/// What a request is asking permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    /// Sending a `Referer` header.
    Referrer,
    /// Sending or accepting cookies.
    Cookie,
    Css,
    Image,
    Script,
}

/// Policy consulted before referrers and cookies are attached or accepted.
pub trait RequestPermission: Send + Sync {
    fn is_request_permitted(&self, url: &Url, kind: PermissionKind) -> bool;
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RequestPermission for AllowAll {
    fn is_request_permitted(&self, _url: &Url, _kind: PermissionKind) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKind {
    Connecting,
    Sending,
    Waiting,
    Loading,
    Building,
    Done,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub url: Url,
    pub method: Method,
    /// Bytes received so far for `Loading`, zero otherwise.
    pub value: u64,
    /// Content-Length when known.
    pub max: Option<u64>,
}

/// Receives progress events. Called on the request's task, so
/// implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Discards progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Receives the outcome of one request. Exactly one method is called.
pub trait ResponseConsumer: Send {
    /// Handle a response. The body streams from the network or the cache.
    ///
    /// A returned [`AltObject`] is cached next to the body when the
    /// response is cacheable and was read to the end.
    fn on_response(
        self: Box<Self>,
        response: HttpResponse,
    ) -> BoxFuture<'static, Result<Option<AltObject>, NetError>>;

    /// The request failed before a response could be delivered.
    fn on_error(self: Box<Self>, error: NetError);

    /// The request was cancelled before a response could be delivered.
    fn on_cancelled(self: Box<Self>);
}

/// Deliver a pre-delivery failure to `consumer`.
pub(crate) fn report_failure(consumer: Box<dyn ResponseConsumer>, error: NetError) {
    if error.is_cancellation() {
        consumer.on_cancelled();
    } else {
        consumer.on_error(error);
    }
}
