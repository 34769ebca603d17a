//! Turn a request descriptor into the URL actually connected to.

use crate::urlrequest::request::RequestDescriptor;
use http::Method;
use url::Url;

/// The URL a request connects to.
///
/// GET parameters are appended to the query as percent-encoded UTF-8.
/// `file:` URLs lose their query. The fragment is always preserved.
pub fn resolve_connection_url(desc: &RequestDescriptor) -> Url {
    let mut url = desc.url.clone();

    if url.scheme() == "file" {
        url.set_query(None);
        return url;
    }

    if desc.method == Method::GET && !desc.params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for field in &desc.params {
            pairs.append_pair(&field.name, &field.value.as_text());
        }
    }
    url
}
