use {
    std::{
        future::Future,
        io::{self, ErrorKind, IoSlice},
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    },
    tokio::{
        io::{AsyncRead, AsyncWrite, ReadBuf},
        time::{Instant, Sleep, sleep},
    },
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    /// Waiting for the first byte of a request.
    Idle,

    /// A request has started arriving and no response has been written yet.
    Request,

    /// The response is being written.
    Response,
}

/// A connection with HTTP-server style deadlines.
///
/// * The first request must start within `read_timeout` of accepting the connection; later requests within
///   `idle_timeout` of the previous response.
/// * Once the first byte of a request arrives, the rest of it must arrive within `read_timeout`.
/// * The response must be completely written within `write_timeout` of the first byte of its request.
pub(crate) struct DeadlineStream<S> {
    inner: S,
    phase: Phase,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    read_deadline: Pin<Box<Sleep>>,
    write_deadline: Pin<Box<Sleep>>,
}

impl<S> DeadlineStream<S> {
    pub(crate) fn new(inner: S, read_timeout: Duration, write_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            inner,
            phase: Phase::Idle,
            read_timeout,
            write_timeout,
            idle_timeout,
            read_deadline: Box::pin(sleep(read_timeout)),
            write_deadline: Box::pin(sleep(write_timeout)),
        }
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(ErrorKind::TimedOut, format!("{what} timed out"))
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // Reading after a response means waiting for the next keep-alive request.
        if this.phase == Phase::Response {
            this.phase = Phase::Idle;
            this.read_deadline.as_mut().reset(Instant::now() + this.idle_timeout);
        }

        let filled = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if this.phase == Phase::Idle && buf.filled().len() > filled {
                    let now = Instant::now();
                    this.phase = Phase::Request;
                    this.read_deadline.as_mut().reset(now + this.read_timeout);
                    this.write_deadline.as_mut().reset(now + this.write_timeout);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => match this.read_deadline.as_mut().poll(cx) {
                Poll::Ready(()) if this.phase == Phase::Idle => Poll::Ready(Err(timed_out("Idle connection"))),
                Poll::Ready(()) => Poll::Ready(Err(timed_out("Request read"))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<S: AsyncWrite + Unpin> DeadlineStream<S> {
    /// Run a write-side operation against the response deadline.
    fn poll_write_op<T>(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        op: impl FnOnce(Pin<&mut S>, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        let this = self.get_mut();
        match this.phase {
            // hyper flushes on every turn, including between requests.
            Phase::Idle => return op(Pin::new(&mut this.inner), cx),
            Phase::Request => this.phase = Phase::Response,
            Phase::Response => (),
        }

        if this.write_deadline.is_elapsed() {
            return Poll::Ready(Err(timed_out("Response write")));
        }

        match op(Pin::new(&mut this.inner), cx) {
            Poll::Pending => match this.write_deadline.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(timed_out("Response write"))),
                Poll::Pending => Poll::Pending,
            },
            ready => ready,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.poll_write_op(cx, |s, cx| s.poll_write(cx, buf))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.poll_write_op(cx, |s, cx| s.poll_write_vectored(cx, bufs))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_write_op(cx, |s, cx| s.poll_flush(cx))
    }

    // Closing is never bounded by the response deadline.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
