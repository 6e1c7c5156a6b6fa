//! Response destinations that can report a caller has gone away

use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Output for a query response
///
/// The rebuild loop polls `is_cancelled` between records and stops writing
/// as soon as it returns true.
pub trait ResponseSink: Write {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl ResponseSink for Vec<u8> {}

impl ResponseSink for io::Stdout {}

impl ResponseSink for io::StdoutLock<'_> {}

impl<W: ResponseSink + ?Sized> ResponseSink for &mut W {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

impl<W: ResponseSink> ResponseSink for BufWriter<W> {
    fn is_cancelled(&self) -> bool {
        self.get_ref().is_cancelled()
    }
}

/// Shared flag a connection handler flips when its client disconnects
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Any writer paired with a [`CancelToken`]
#[derive(Debug)]
pub struct CancellableSink<W> {
    inner: W,
    token: CancelToken,
}

impl<W: Write> CancellableSink<W> {
    pub fn new(inner: W, token: CancelToken) -> Self {
        CancellableSink { inner, token }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CancellableSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> ResponseSink for CancellableSink<W> {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let sink = CancellableSink::new(Vec::new(), token.clone());
        assert!(!sink.is_cancelled());

        token.cancel();
        assert!(sink.is_cancelled());
    }

    #[test]
    fn test_buffered_sink_forwards_cancellation() {
        let token = CancelToken::new();
        let sink = BufWriter::new(CancellableSink::new(Vec::new(), token.clone()));
        token.cancel();
        assert!(sink.is_cancelled());
    }
}
