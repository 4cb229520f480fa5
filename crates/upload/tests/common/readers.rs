use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Deterministic content of `len` bytes.
#[allow(dead_code)]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Hands out at most `step` bytes per read, like a slow socket.
#[allow(dead_code)]
pub struct Trickle {
    data: Vec<u8>,
    pos: usize,
    step: usize,
}

#[allow(dead_code)]
impl Trickle {
    pub fn new(data: Vec<u8>, step: usize) -> Self {
        Self { data, pos: 0, step }
    }
}

impl AsyncRead for Trickle {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let end = (this.pos + this.step)
            .min(this.data.len())
            .min(this.pos + buf.remaining());
        buf.put_slice(&this.data[this.pos..end]);
        this.pos = end;
        Poll::Ready(Ok(()))
    }
}

/// Yields `good` bytes and then fails every read.
#[allow(dead_code)]
pub struct Failing {
    remaining: usize,
}

#[allow(dead_code)]
impl Failing {
    pub fn after(good: usize) -> Self {
        Self { remaining: good }
    }
}

impl AsyncRead for Failing {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "stream reset",
            )));
        }
        let n = this.remaining.min(buf.remaining());
        buf.put_slice(&vec![7u8; n]);
        this.remaining -= n;
        Poll::Ready(Ok(()))
    }
}

/// Wraps a reader and raises a flag when it is dropped.
#[allow(dead_code)]
pub struct DropFlag<R> {
    inner: R,
    dropped: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl<R> DropFlag<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }
}

impl<R> Drop for DropFlag<R> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DropFlag<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

/// Never produces data.
#[allow(dead_code)]
pub struct Stalled;

impl AsyncRead for Stalled {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}
