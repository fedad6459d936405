//! Reusable per-connection read buffer with a `[cursor, end)` valid region.

use crate::{errors::Error, http::types::Span, limits::EngineLimits};
use memchr::memchr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Growable byte buffer backing every slice a request handler observes.
///
/// One per connection, reused across all requests on it. `cursor` is the
/// first unread byte, `end` is one past the last byte received. Freeing
/// is deferred and coarse so that spans handed out during lazy parsing
/// stay valid for the whole in-flight request.
#[derive(Debug, PartialEq)]
pub(crate) struct ReadBuffer {
    data: Vec<u8>,
    pub(crate) cursor: usize,
    pub(crate) end: usize,
    max_capacity: usize,
}

impl ReadBuffer {
    #[inline(always)]
    pub(crate) fn new(limits: &EngineLimits) -> Self {
        ReadBuffer {
            data: vec![0; limits.read_buffer_capacity],
            cursor: 0,
            end: 0,
            max_capacity: limits.read_buffer_max,
        }
    }

    #[cfg(test)]
    pub(crate) fn from<V: AsRef<[u8]>>(limits: &EngineLimits, value: V) -> Self {
        let value = value.as_ref();
        let mut data = vec![0; limits.read_buffer_capacity.max(value.len())];
        data[..value.len()].copy_from_slice(value);

        ReadBuffer {
            data,
            cursor: 0,
            end: value.len(),
            max_capacity: limits.read_buffer_max,
        }
    }

    #[inline(always)]
    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub(crate) fn slice(&self, span: Span) -> &[u8] {
        span.of(&self.data)
    }

    #[inline(always)]
    #[allow(dead_code)]
    pub(crate) fn current_size(&self) -> usize {
        self.end - self.cursor
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        self.cursor == self.end
    }
}

// Reading
impl ReadBuffer {
    /// Pulls more bytes from the socket into `[end, ..)`.
    ///
    /// Doubles the backing storage when full; reaching `max_capacity` is
    /// `BufferOverflow`. `Ok(0)` means the peer closed the socket.
    /// `size` caps the read; `None` reads into all remaining space.
    pub(crate) async fn read_more<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        size: Option<usize>,
    ) -> Result<usize, Error> {
        if self.end == self.data.len() {
            if self.data.len() >= self.max_capacity {
                return Err(Error::BufferOverflow);
            }
            let next = (self.data.len() * 2).min(self.max_capacity);
            self.data.resize(next, 0);
        }

        let available = self.data.len() - self.end;
        let limit = size.map_or(available, |s| s.min(available));

        let received = stream
            .read(&mut self.data[self.end..self.end + limit])
            .await
            .map_err(Error::Io)?;
        self.end += received;
        Ok(received)
    }

    /// Ensures `n` bytes are buffered starting at offset `start` and
    /// returns their span.
    pub(crate) async fn read_n<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        start: usize,
        n: usize,
    ) -> Result<Span, Error> {
        while self.end < start + n {
            if self.read_more(stream, None).await? == 0 {
                return Err(Error::Closed);
            }
        }
        Ok(Span::new(start, start + n))
    }

    /// Scans forward from `*cur` for `delim`, pulling more data as
    /// needed. Returns the pre-delimiter span and leaves `*cur` just
    /// past the delimiter.
    pub(crate) async fn read_until<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        cur: &mut usize,
        delim: u8,
    ) -> Result<Span, Error> {
        let start = *cur;
        let mut scan = start;

        loop {
            if scan < self.end {
                if let Some(pos) = memchr(delim, &self.data[scan..self.end]) {
                    let at = scan + pos;
                    *cur = at + 1;
                    return Ok(Span::new(start, at));
                }
                scan = self.end;
            }

            if self.read_more(stream, None).await? == 0 {
                return Err(Error::Closed);
            }
        }
    }
}

// Reclaiming
impl ReadBuffer {
    /// Marks `[i1, i2)` as unneeded.
    ///
    /// The whole valid region resets the buffer; a leading prefix
    /// advances `cursor`; a trailing suffix retracts `end`. An interior
    /// hole is compacted only once tail free space drops below a quarter
    /// of capacity; otherwise the hole stays until the request-boundary
    /// free sweeps it up.
    pub(crate) fn free(&mut self, i1: usize, i2: usize) {
        debug_assert!(i1 <= i2);
        debug_assert!(i2 <= self.data.len());

        if i1 == self.cursor && i2 == self.end {
            self.cursor = 0;
            self.end = 0;
        } else if i1 == self.cursor {
            self.cursor = i2;
        } else if i2 == self.end {
            self.end = i1;
        } else if self.data.len() - self.end < self.data.len() / 4 {
            self.data.copy_within(i2..self.end, i1);
            self.end -= i2 - i1;
        }
    }

    /// Moves the bytes of `src` down to offset `dest` (overlap-safe).
    /// Used to compact chunked payloads in place.
    #[inline(always)]
    pub(crate) fn move_within(&mut self, src: Span, dest: usize) {
        self.data.copy_within(src.start..src.end, dest);
    }

    /// Relocates the valid region to offset 0.
    #[allow(dead_code)]
    pub(crate) fn reset(&mut self) {
        debug_assert!(self.cursor <= self.end);

        if self.cursor == self.end {
            self.cursor = 0;
            self.end = 0;
        } else {
            self.data.copy_within(self.cursor..self.end, 0);
            self.end -= self.cursor;
            self.cursor = 0;
        }
    }
}


#[cfg(test)]
mod read_tests {
    use super::*;
    use crate::tools::*;

    fn empty() -> ReadBuffer {
        ReadBuffer::new(&EngineLimits::default())
    }

    #[tokio::test]
    async fn read_more_advances_end() {
        let mut rb = empty();
        let mut stream = MockStream::request("hello");

        assert_eq!(rb.read_more(&mut stream, None).await.unwrap(), 5);
        assert_eq!(rb.end, 5);
        assert_eq!(rb.slice(Span::new(0, 5)), b"hello");

        // Socket closed.
        assert_eq!(rb.read_more(&mut stream, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_more_respects_size() {
        let mut rb = empty();
        let mut stream = MockStream::request("hello");

        assert_eq!(rb.read_more(&mut stream, Some(2)).await.unwrap(), 2);
        assert_eq!(rb.end, 2);
    }

    #[tokio::test]
    async fn growth_doubles_until_cap() {
        let limits = EngineLimits {
            read_buffer_capacity: 4,
            read_buffer_max: 8,
            ..EngineLimits::default()
        };
        let mut rb = ReadBuffer::new(&limits);
        let mut stream = MockStream::chunked(b"abcdefghij", 4);

        assert_eq!(rb.read_more(&mut stream, None).await.unwrap(), 4);
        assert_eq!(rb.data().len(), 4);

        // Full buffer doubles to the cap, then refuses to grow further.
        assert_eq!(rb.read_more(&mut stream, None).await.unwrap(), 4);
        assert_eq!(rb.data().len(), 8);
        assert_eq!(
            rb.read_more(&mut stream, None).await.unwrap_err(),
            Error::BufferOverflow
        );
    }

    #[tokio::test]
    async fn read_n_pulls_fragments() {
        let mut rb = empty();
        let mut stream = MockStream::chunked(b"hello world", 3);

        let span = rb.read_n(&mut stream, 0, 11).await.unwrap();
        assert_eq!(rb.slice(span), b"hello world");
    }

    #[tokio::test]
    async fn read_n_closed_mid_read() {
        let mut rb = empty();
        let mut stream = MockStream::request("short");

        assert_eq!(
            rb.read_n(&mut stream, 0, 10).await.unwrap_err(),
            Error::Closed
        );
    }

    #[tokio::test]
    async fn read_until_fragmented() {
        let mut rb = empty();
        let mut stream = MockStream::chunked(b"5\r\nhello", 1);

        let mut cur = 0;
        let span = rb.read_until(&mut stream, &mut cur, b'\r').await.unwrap();
        assert_eq!(rb.slice(span), b"5");
        assert_eq!(cur, 2);
    }

    #[tokio::test]
    async fn read_until_missing_delimiter() {
        let mut rb = empty();
        let mut stream = MockStream::request("no delimiter");

        let mut cur = 0;
        assert_eq!(
            rb.read_until(&mut stream, &mut cur, b'\r')
                .await
                .unwrap_err(),
            Error::Closed
        );
    }
}
