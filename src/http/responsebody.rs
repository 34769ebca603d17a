//! Response body streaming.
//! Mirrors Chromium's HttpStream::ReadResponseBody.
//!
//! Network reads race the request's cancellation token and may be mirrored
//! into a bounded [`BodyRecorder`] so the body can be cached once the
//! consumer has read it.

use crate::base::neterror::NetError;
use crate::http::connection::HttpConnection;
use crate::urlrequest::delegate::{ProgressEvent, ProgressKind, ProgressSink};
use bytes::{Bytes, BytesMut};
use http::Method;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Copy of a response body kept for the cache.
#[derive(Debug)]
pub(crate) struct BodyRecorder {
    buf: BytesMut,
    cap: usize,
    overflowed: bool,
    complete: bool,
}

impl BodyRecorder {
    pub(crate) fn shared(cap: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            buf: BytesMut::new(),
            cap,
            overflowed: false,
            complete: false,
        }))
    }

    fn record(&mut self, chunk: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.buf.len() + chunk.len() > self.cap {
            self.overflowed = true;
            self.buf = BytesMut::new();
            return;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// The full body, if it was read to the end within the cap.
    pub(crate) fn take_complete(&mut self) -> Option<Bytes> {
        if self.complete && !self.overflowed {
            self.complete = false;
            Some(std::mem::take(&mut self.buf).freeze())
        } else {
            None
        }
    }
}

pub(crate) struct LoadProgress {
    pub sink: Arc<dyn ProgressSink>,
    pub url: Url,
    pub method: Method,
    pub max: Option<u64>,
}

enum Source {
    Cached(Option<Bytes>),
    Network(Box<dyn HttpConnection>),
    Finished,
}

/// Response body, read chunk by chunk.
pub struct ResponseBody {
    source: Source,
    cancel: CancellationToken,
    progress: Option<LoadProgress>,
    recorder: Option<Arc<Mutex<BodyRecorder>>>,
    received: u64,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Cached(_) => "cached",
            Source::Network(_) => "network",
            Source::Finished => "finished",
        };
        f.debug_struct("ResponseBody")
            .field("source", &source)
            .field("received", &self.received)
            .finish()
    }
}

impl ResponseBody {
    /// Body served from memory.
    pub fn cached(body: Bytes) -> Self {
        Self {
            source: Source::Cached(Some(body)),
            cancel: CancellationToken::new(),
            progress: None,
            recorder: None,
            received: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            source: Source::Finished,
            cancel: CancellationToken::new(),
            progress: None,
            recorder: None,
            received: 0,
        }
    }

    pub(crate) fn network(
        conn: Box<dyn HttpConnection>,
        cancel: CancellationToken,
        progress: Option<LoadProgress>,
        recorder: Option<Arc<Mutex<BodyRecorder>>>,
    ) -> Self {
        Self {
            source: Source::Network(conn),
            cancel,
            progress,
            recorder,
            received: 0,
        }
    }

    /// Read the next chunk. `None` once the body is exhausted.
    ///
    /// Fails with [`NetError::Aborted`] if the request is cancelled while
    /// the read is pending; the connection is dropped in that case.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, NetError> {
        let conn = match &mut self.source {
            Source::Cached(body) => return Ok(body.take().filter(|b| !b.is_empty())),
            Source::Finished => return Ok(None),
            Source::Network(conn) => conn,
        };

        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            r = conn.read_chunk() => Some(r),
        };

        match read {
            None => {
                conn.disconnect();
                self.source = Source::Finished;
                Err(NetError::Aborted)
            }
            Some(Err(e)) => {
                conn.disconnect();
                self.source = Source::Finished;
                Err(e)
            }
            Some(Ok(None)) => {
                self.source = Source::Finished;
                if let Some(recorder) = &self.recorder {
                    recorder.lock().unwrap_or_else(|p| p.into_inner()).complete = true;
                }
                Ok(None)
            }
            Some(Ok(Some(data))) => {
                self.received += data.len() as u64;
                tracing::trace!(bytes = data.len(), total = self.received, "body chunk");
                if let Some(recorder) = &self.recorder {
                    recorder.lock().unwrap_or_else(|p| p.into_inner()).record(&data);
                }
                if let Some(progress) = &self.progress {
                    progress.sink.on_progress(&ProgressEvent {
                        kind: ProgressKind::Loading,
                        url: progress.url.clone(),
                        method: progress.method.clone(),
                        value: self.received,
                        max: progress.max,
                    });
                }
                Ok(Some(data))
            }
        }
    }

    /// Read the rest of the body.
    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Read the rest of the body as UTF-8.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }
}
