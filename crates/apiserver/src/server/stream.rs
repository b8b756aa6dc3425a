//! Accepted connection streams with a write-stall timeout.
//!
//! The server hands hyper either a plain TCP stream or a TLS stream wrapped in
//! [`TimedStream`]. Reads pass straight through (header and body read bounds
//! are enforced by hyper's header timer and the body timeout layer); writes
//! that make no progress for longer than the write timeout fail with
//! [`io::ErrorKind::TimedOut`], which closes the connection.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Sleep;
use tokio_rustls::server::TlsStream;

/// Either a plaintext TCP stream or a server-side TLS stream over TCP.
pub enum RawStream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A [`RawStream`] whose writes are bounded by a stall timeout.
pub struct TimedStream {
    inner: RawStream,
    write_timeout: Duration,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl TimedStream {
    pub fn new(inner: RawStream, write_timeout: Duration) -> Self {
        Self {
            inner,
            write_timeout,
            write_deadline: None,
        }
    }

    /// Called after the inner stream returned `Pending` on a write-side
    /// operation. Arms the deadline on the first stall and fails once it
    /// elapses.
    fn poll_stalled<T>(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<T>> {
        let timeout = self.write_timeout;
        let deadline = self
            .write_deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.write_deadline = None;
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "write timed out",
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn on_progress<T>(&mut self, res: Poll<io::Result<T>>, cx: &mut Context<'_>) -> Poll<io::Result<T>> {
        match res {
            Poll::Ready(r) => {
                self.write_deadline = None;
                Poll::Ready(r)
            }
            Poll::Pending => self.poll_stalled(cx),
        }
    }
}

impl AsyncRead for TimedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            RawStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            RawStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TimedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = match &mut this.inner {
            RawStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            RawStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        };
        this.on_progress(res, cx)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = match &mut this.inner {
            RawStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            RawStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        };
        this.on_progress(res, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = match &mut this.inner {
            RawStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            RawStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        };
        this.on_progress(res, cx)
    }
}
