use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::{CleanupToken, PreparedDownload};
use crate::extractors::AUDIO_MIME_TYPE;
use crate::utils::format_file_size;
use crate::DownloadError;

/// Which terminal event ended a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// Every byte was read
    Completed,
    /// Reading the file failed mid-transfer
    StreamError,
    /// The body was dropped before the end, usually the client going away
    PeerClosed,
}

/// File bytes for the response body, chunk by chunk.
///
/// Each terminal event fires the artifact's cleanup token; the token makes
/// sure only the first one deletes anything.
pub struct ArtifactStream {
    inner: ReaderStream<File>,
    cleanup: CleanupToken,
    sent: u64,
    expected: u64,
}

impl ArtifactStream {
    pub fn new(file: File, expected: u64, cleanup: CleanupToken) -> Self {
        Self {
            inner: ReaderStream::new(file),
            cleanup,
            sent: 0,
            expected,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    fn finish(&self, signal: CompletionSignal) {
        if !self.cleanup.fire().won() {
            return;
        }
        match signal {
            CompletionSignal::Completed => tracing::info!(
                size = %format_file_size(self.sent),
                "Audio sent, temporary file removed"
            ),
            CompletionSignal::StreamError => tracing::warn!(
                sent = self.sent,
                expected = self.expected,
                "Stream failed, temporary file removed"
            ),
            CompletionSignal::PeerClosed => tracing::info!(
                sent = self.sent,
                expected = self.expected,
                "Cleaned up after client disconnection"
            ),
        }
    }
}

impl Stream for ArtifactStream {
    type Item = <ReaderStream<File> as Stream>::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match ready!(self.inner.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                self.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Error streaming file");
                self.finish(CompletionSignal::StreamError);
                Poll::Ready(Some(Err(e)))
            }
            None => {
                self.finish(CompletionSignal::Completed);
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for ArtifactStream {
    // Blocking unlink on purpose: a spawned task might never run during shutdown.
    fn drop(&mut self) {
        self.finish(CompletionSignal::PeerClosed);
    }
}

/// Build the `200` response that streams a prepared artifact.
///
/// Failing to open the file happens before anything is committed, so it comes
/// back as an error and the artifact is removed here. Once the response is
/// returned, a read failure can only abort the connection.
pub async fn artifact_response(prepared: PreparedDownload) -> Result<Response, DownloadError> {
    let PreparedDownload {
        path,
        size,
        download_name,
        cleanup,
    } = prepared;

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            cleanup.fire();
            return Err(DownloadError::StreamError(e));
        }
    };

    let disposition = match HeaderValue::from_str(&format!("attachment; filename=\"{}\"", download_name)) {
        Ok(value) => value,
        Err(e) => {
            cleanup.fire();
            return Err(DownloadError::Unknown(format!("invalid download name: {}", e)));
        }
    };

    let stream = ArtifactStream::new(file, size, cleanup);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(AUDIO_MIME_TYPE)),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
