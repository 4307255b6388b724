//! Bounded capture of a child's output stream.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::text::truncation_marker;

/// Output collected from one stream.
///
/// Holds at most `limit * 4` bytes (the UTF-8 worst case for `limit`
/// characters); anything past that is only counted.
#[derive(Debug)]
pub(crate) struct CaptureBuffer {
    limit: usize,
    bytes: Vec<u8>,
    overflow_chars: usize,
}

impl CaptureBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: Vec::new(),
            overflow_chars: 0,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        let room = self
            .limit
            .saturating_mul(4)
            .saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
        self.overflow_chars += count_chars(&chunk[take..]);
    }

    /// Decode the captured bytes, capping at `limit` characters.
    pub(crate) fn to_text(&self) -> String {
        let text = String::from_utf8_lossy(&self.bytes);
        match text.char_indices().nth(self.limit) {
            None if self.overflow_chars == 0 => text.into_owned(),
            None => format!("{}{}", text, truncation_marker(self.overflow_chars)),
            Some((idx, _)) => {
                let omitted = text[idx..].chars().count() + self.overflow_chars;
                format!("{}{}", &text[..idx], truncation_marker(omitted))
            }
        }
    }
}

/// Count UTF-8 characters by their leading bytes.
fn count_chars(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| (**b & 0xC0) != 0x80).count()
}

/// A stream being drained into a shared buffer by a background task.
pub(crate) struct StreamCapture {
    buffer: Arc<Mutex<CaptureBuffer>>,
    task: JoinHandle<()>,
}

impl StreamCapture {
    pub(crate) fn spawn<R>(mut reader: R, limit: usize, name: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(CaptureBuffer::new(limit)));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink.lock().push(&chunk[..n]),
                    Err(e) => {
                        debug!("Stopped reading {}: {}", name, e);
                        break;
                    }
                }
            }
        });

        Self { buffer, task }
    }

    /// Wait up to `grace` for the stream to close, then return what was read.
    ///
    /// A stream still held open (for example by a detached grandchild) is
    /// abandoned once the grace period ends.
    pub(crate) async fn finish(self, grace: std::time::Duration) -> String {
        let Self { buffer, mut task } = self;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            debug!("Output stream still open after {:?}; abandoning reader", grace);
            task.abort();
        }
        buffer.lock().to_text()
    }
}
