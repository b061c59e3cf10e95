//! Rate limited reader.

use crate::throttle::bucket::{Grant, TokenBucket};

use std::future::Future;
use std::io;
use std::num::NonZeroU64;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep};

/// An [`AsyncRead`] adapter that caps sustained throughput.
///
/// Each read asks the bucket for permission first. If the bucket is short,
/// the reader sleeps until it refills, so the average rate over any long
/// window stays under the ceiling with at most one bucket of burst.
pub struct ThrottledReader<R> {
    inner: R,
    bucket: Option<TokenBucket>,
    scratch: Vec<u8>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<R> ThrottledReader<R> {
    /// Wraps `inner`. A `rate` of `None` disables throttling.
    ///
    /// `burst` is the caller's buffer size and bounds the bucket capacity.
    pub fn new(inner: R, rate: Option<NonZeroU64>, burst: usize) -> Self {
        Self {
            inner,
            bucket: rate.map(|rate| TokenBucket::new(rate, burst, Instant::now())),
            scratch: Vec::new(),
            sleep: None,
        }
    }

    /// Returns `true` if reads are paced.
    pub fn is_throttled(&self) -> bool {
        self.bucket.is_some()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(bucket) = this.bucket.as_mut() else {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        };
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if let Some(sleep) = this.sleep.as_mut() {
                ready!(sleep.as_mut().poll(cx));
                this.sleep = None;
            }

            match bucket.grant(buf.remaining(), Instant::now()) {
                Grant::Ready(n) => {
                    if this.scratch.len() < n {
                        this.scratch.resize(n, 0);
                    }
                    let mut limited = ReadBuf::new(&mut this.scratch[..n]);
                    ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;
                    let read = limited.filled();
                    bucket.consume(read.len());
                    buf.put_slice(read);
                    return Poll::Ready(Ok(()));
                }
                Grant::Wait(delay) => {
                    this.sleep = Some(Box::pin(tokio::time::sleep(delay)));
                }
            }
        }
    }
}
