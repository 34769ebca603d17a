//! `multipart/form-data` encoding (RFC 7578).
//!
//! File parts are not buffered: [`Form::into_stream`] opens each file when
//! the encoder reaches it and yields its contents in fixed-size chunks.
//!
//! # Example
//! ```ignore
//! use pagenet::http::multipart::{Form, Part};
//!
//! let form = Form::new()
//!     .text("username", "user123")
//!     .part("upload", Part::file("/tmp/report.pdf").file_name("report.pdf"));
//! let content_type = form.content_type();
//! let body = form.into_body();
//! ```

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::requestbody::RequestBody;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::io::ReaderStream;

const FILE_CHUNK: usize = 16 * 1024;

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
enum Source {
    Bytes(Bytes),
    File(PathBuf),
}

/// One field of a multipart form.
#[derive(Debug)]
pub struct Part {
    source: Source,
    content_type: Option<String>,
    file_name: Option<String>,
}

impl Part {
    pub fn text<V: Into<Cow<'static, str>>>(value: V) -> Self {
        Self {
            source: Source::Bytes(Bytes::from(value.into().into_owned())),
            content_type: None,
            file_name: None,
        }
    }

    pub fn bytes<B: Into<Bytes>>(data: B) -> Self {
        Self {
            source: Source::Bytes(data.into()),
            content_type: Some("application/octet-stream".to_string()),
            file_name: None,
        }
    }

    /// A part streamed from a file on disk.
    ///
    /// The file name defaults to the last path component.
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            source: Source::File(path),
            content_type: Some("application/octet-stream".to_string()),
            file_name,
        }
    }

    pub fn content_type<S: Into<String>>(mut self, mime: S) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    pub fn file_name<S: Into<String>>(mut self, name: S) -> Self {
        self.file_name = Some(name.into());
        self
    }

    fn head(&self, boundary: &str, name: &str) -> Bytes {
        let mut head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
            escape_quoted(name)
        );
        if let Some(file_name) = &self.file_name {
            head.push_str(&format!("; filename=\"{}\"", escape_quoted(file_name)));
        }
        if let Some(mime) = &self.content_type {
            head.push_str(&format!("\r\nContent-Type: {mime}"));
        }
        head.push_str("\r\n\r\n");
        Bytes::from(head)
    }

    fn into_stream(self) -> BoxStream<'static, Result<Bytes, NetError>> {
        match self.source {
            Source::Bytes(b) => stream::once(async move { Ok(b) }).boxed(),
            Source::File(path) => stream::once(async move {
                let file = tokio::fs::File::open(&path).await.file_context(&path)?;
                Ok::<_, NetError>(
                    ReaderStream::with_capacity(file, FILE_CHUNK)
                        .map_err(move |e| {
                            tracing::debug!(error = %e, "upload file read failed");
                            NetError::UploadFileChanged
                        }),
                )
            })
            .try_flatten()
            .boxed(),
        }
    }
}

/// A `multipart/form-data` body under construction.
#[derive(Debug)]
pub struct Form {
    boundary: String,
    parts: Vec<(String, Part)>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn text<N, V>(self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<Cow<'static, str>>,
    {
        self.part(name, Part::text(value))
    }

    pub fn part<N: Into<String>>(mut self, name: N, part: Part) -> Self {
        self.parts.push((name.into(), part));
        self
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the form as a chunked byte stream.
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, NetError>> {
        let boundary = self.boundary;
        let mut pieces: Vec<BoxStream<'static, Result<Bytes, NetError>>> = Vec::new();
        for (name, part) in self.parts {
            let head = part.head(&boundary, &name);
            pieces.push(stream::once(async move { Ok(head) }).boxed());
            pieces.push(part.into_stream());
            pieces.push(stream::once(async { Ok(Bytes::from_static(b"\r\n")) }).boxed());
        }
        let closing = Bytes::from(format!("--{boundary}--\r\n"));
        pieces.push(stream::once(async move { Ok(closing) }).boxed());
        stream::iter(pieces).flatten().boxed()
    }

    pub fn into_body(self) -> RequestBody {
        RequestBody::Stream(self.into_stream())
    }
}

fn escape_quoted(s: &str) -> Cow<'_, str> {
    if s.contains(['"', '\\', '\r', '\n']) {
        Cow::Owned(
            s.replace('\\', "\\\\")
                .replace('"', "%22")
                .replace('\r', "%0D")
                .replace('\n', "%0A"),
        )
    } else {
        Cow::Borrowed(s)
    }
}

fn generate_boundary() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("----pagenet{:x}{:x}{:04x}", nanos, std::process::id(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect(form: Form) -> Result<String, NetError> {
        let chunks: Vec<Bytes> = form.into_stream().try_collect().await?;
        Ok(chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect())
    }

    #[tokio::test]
    async fn test_empty_form_is_only_closing_boundary() {
        let form = Form::new();
        let boundary = form.boundary().to_string();
        assert_eq!(collect(form).await.unwrap(), format!("--{boundary}--\r\n"));
    }

    #[tokio::test]
    async fn test_text_fields() {
        let form = Form::new().text("user", "alice").text("lang", "rust");
        let b = form.boundary().to_string();
        let expected = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"user\"\r\n\r\nalice\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"lang\"\r\n\r\nrust\r\n\
             --{b}--\r\n"
        );
        assert_eq!(collect(form).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_file_part_streams_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let contents = "x".repeat(FILE_CHUNK * 2 + 7);
        file.write_all(contents.as_bytes()).unwrap();

        let form = Form::new().part(
            "upload",
            Part::file(file.path())
                .file_name("data.txt")
                .content_type("text/plain"),
        );
        let body = collect(form).await.unwrap();
        assert!(body.contains("name=\"upload\"; filename=\"data.txt\"\r\nContent-Type: text/plain\r\n\r\n"));
        assert!(body.contains(&format!("{contents}\r\n")));
    }

    #[tokio::test]
    async fn test_missing_file_fails_stream() {
        let form = Form::new().part("upload", Part::file("/nonexistent/pagenet-upload.bin"));
        assert_eq!(collect(form).await.unwrap_err(), NetError::FileNotFound);
    }

    #[test]
    fn test_boundaries_are_unique() {
        assert_ne!(Form::new().boundary(), Form::new().boundary());
        assert!(Form::new()
            .content_type()
            .starts_with("multipart/form-data; boundary=----pagenet"));
    }

    #[test]
    fn test_escape_quoted() {
        assert_eq!(escape_quoted("plain"), "plain");
        assert_eq!(escape_quoted("a\"b"), "a%22b");
        assert_eq!(escape_quoted("line\r\nbreak"), "line%0D%0Abreak");
    }
}
