//! Logical requests: what to fetch, why, and how to cancel it.

use crate::base::loadstate::LoadState;
use crate::http::orderedheaders::OrderedHeaderMap;
use bytes::Bytes;
use http::Method;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a request is made. Drives cache policy, never transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestKind {
    /// URL typed or pasted by the user.
    AddressBar,
    LinkClick,
    /// Subresources and script-triggered fetches.
    #[default]
    Programmatic,
    /// Back/forward navigation.
    History,
    SoftReload,
    HardReload,
    Download,
}

/// Value of a form parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    /// File upload. Only multipart bodies carry the contents.
    File {
        path: PathBuf,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

impl FormValue {
    /// Text sent for this value in urlencoded forms and query strings.
    pub fn as_text(&self) -> String {
        match self {
            FormValue::Text(s) => s.clone(),
            FormValue::File {
                path, file_name, ..
            } => file_name.clone().unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

/// POST body encoding for form parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enctype {
    #[default]
    UrlEncoded,
    Multipart,
}

/// Everything needed to issue a request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub referrer: Option<Url>,
    /// Appended to the query for GET, encoded as the body for POST.
    pub params: Vec<FormField>,
    pub enctype: Enctype,
    /// Raw POST body and its content type; takes precedence over `params`.
    pub alt_post_body: Option<(String, Bytes)>,
    pub extra_headers: OrderedHeaderMap,
    pub kind: RequestKind,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            referrer: None,
            params: Vec::new(),
            enctype: Enctype::default(),
            alt_post_body: None,
            extra_headers: OrderedHeaderMap::new(),
            kind: RequestKind::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.push(FormField {
            name: name.to_string(),
            value: FormValue::Text(value.to_string()),
        });
        self
    }

    /// Add a file field. Switches the body to multipart.
    pub fn with_file(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.params.push(FormField {
            name: name.to_string(),
            value: FormValue::File {
                path: path.into(),
                file_name: None,
                content_type: None,
            },
        });
        self.enctype = Enctype::Multipart;
        self
    }

    pub fn with_enctype(mut self, enctype: Enctype) -> Self {
        self.enctype = enctype;
        self
    }

    pub fn with_alt_post_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.alt_post_body = Some((content_type.to_string(), body.into()));
        self
    }

    /// Add an extra request header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.extra_headers.append(name, value) {
            tracing::debug!(header = %name, error = %e, "ignoring invalid extra header");
        }
        self
    }
}

struct HandlerInner {
    descriptor: RequestDescriptor,
    cancel: CancellationToken,
    state: Mutex<LoadState>,
}

/// Shared handle to one logical request.
///
/// Cloning is cheap; every clone cancels the same request.
#[derive(Clone)]
pub struct RequestHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("method", &self.inner.descriptor.method)
            .field("url", &self.inner.descriptor.url.as_str())
            .field("state", &self.load_state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl RequestHandler {
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                descriptor,
                cancel: CancellationToken::new(),
                state: Mutex::new(LoadState::Idle),
            }),
        }
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.inner.descriptor
    }

    /// Cancel the request. A pending network read is aborted and the
    /// connection dropped; queued work is skipped.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stage the request has reached.
    pub fn load_state(&self) -> LoadState {
        *self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn set_load_state(&self, state: LoadState) {
        *self.inner.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

impl From<RequestDescriptor> for RequestHandler {
    fn from(descriptor: RequestDescriptor) -> Self {
        Self::new(descriptor)
    }
}
