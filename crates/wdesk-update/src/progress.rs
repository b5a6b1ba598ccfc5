use std::io::Read;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use log::info;
use tokio::io::{AsyncRead, ReadBuf};

/// Receives the download percentage (0–100). Runs on the reading task, so it
/// must hand heavy work off elsewhere.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Byte-stream wrapper that reports how much of a known-length stream has been
/// consumed. Bytes and errors pass through untouched.
pub struct ProgressReader<R> {
    inner: R,
    total: u64,
    read_so_far: u64,
    last_reported: u64,
    callback: Option<ProgressFn>,
}

impl<R> ProgressReader<R> {
    /// Wrap `inner`. A `total` of `None` or zero disables reporting.
    pub fn new(inner: R, total: Option<u64>, callback: Option<ProgressFn>) -> Self {
        Self {
            inner,
            total: total.unwrap_or(0),
            read_so_far: 0,
            last_reported: 0,
            callback,
        }
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.read_so_far
    }

    fn record(&mut self, read: usize) {
        if read == 0 {
            return;
        }
        self.read_so_far += read as u64;

        if self.total == 0 {
            return;
        }
        let step = self.total / 100;
        if self.read_so_far - self.last_reported < step && self.read_so_far != self.total {
            return;
        }

        let percent = self.read_so_far as f64 * 100.0 / self.total as f64;
        match &self.callback {
            Some(callback) => callback(percent),
            None => info!("Download progress: {percent:.2}%"),
        }
        self.last_reported = self.read_so_far;
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.record(read);
        Ok(read)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read = buf.filled().len() - before;
            this.record(read);
        }
        poll
    }
}
