//! HTTP Response with body access.

use crate::base::neterror::NetError;
use crate::http::httpcache::AltObject;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::responsebody::ResponseBody;
use bytes::Bytes;
use http::StatusCode;
use url::Url;

/// Response handed to a [`ResponseConsumer`](crate::urlrequest::delegate::ResponseConsumer).
#[derive(Debug)]
pub struct HttpResponse {
    url: Url,
    status: StatusCode,
    headers: OrderedHeaderMap,
    body: ResponseBody,
    from_cache: bool,
    revalidated: bool,
    alt_object: Option<AltObject>,
}

impl HttpResponse {
    pub(crate) fn from_network(
        url: Url,
        status: StatusCode,
        headers: OrderedHeaderMap,
        body: ResponseBody,
    ) -> Self {
        Self {
            url,
            status,
            headers,
            body,
            from_cache: false,
            revalidated: false,
            alt_object: None,
        }
    }

    /// A stored entry served as a 200.
    pub(crate) fn from_cache(
        url: Url,
        headers: OrderedHeaderMap,
        body: Bytes,
        alt_object: Option<AltObject>,
        revalidated: bool,
    ) -> Self {
        Self {
            url,
            status: StatusCode::OK,
            headers,
            body: ResponseBody::cached(body),
            from_cache: true,
            revalidated,
            alt_object,
        }
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_str(name)
    }

    /// Content-Length when the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// True when the body comes from the cache, revalidated or not.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// True when a 304 confirmed the cached body.
    pub fn was_revalidated(&self) -> bool {
        self.revalidated
    }

    /// Alternate representation stored with a cache hit.
    pub fn alt_object(&self) -> Option<&AltObject> {
        self.alt_object.as_ref()
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Convenience method to consume body as bytes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        self.body.bytes().await
    }

    /// Convenience method to consume body as text.
    pub async fn text(self) -> Result<String, NetError> {
        self.body.text().await
    }
}
