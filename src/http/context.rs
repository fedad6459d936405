//! Per-connection request/response state machine.

use crate::{
    errors::Error,
    http::{
        buffer::ReadBuffer,
        types::{self, Span},
    },
    limits::{EngineLimits, HEADER_SCRATCH_CAPACITY, MAX_HEADER_LINES},
    server::connection::Socket,
};

/// The engine's per-connection context: owns the socket and the read
/// buffer, exposes lazy accessors over the current request and the
/// response-building API.
///
/// Created once per connection and reset between requests. Everything
/// parsed out of a request (method, url, header names and values, cookie
/// and query pairs, the body) is a span into the shared read buffer and
/// stays valid until [`prepare_next_request`](Self::prepare_next_request)
/// reclaims the request's footprint.
#[derive(Debug)]
pub struct HttpContext<S> {
    pub(crate) stream: S,
    pub(crate) rb: ReadBuffer,

    // Response state.
    pub(crate) status: &'static str,
    pub(crate) header_scratch: Box<[u8]>,
    pub(crate) scratch_len: usize,
    pub(crate) response_written: bool,

    // Request-line state, lazily parsed.
    pub(crate) method: Span,
    pub(crate) url: Span,
    pub(crate) version: Span,
    pub(crate) query_string: Span,

    // Header state.
    pub(crate) header_lines: [usize; MAX_HEADER_LINES],
    pub(crate) header_lines_len: usize,
    pub(crate) header_map: Vec<(Span, Span)>,
    pub(crate) cookie_map: Vec<(Span, Span)>,
    pub(crate) query_map: Vec<(Span, Span)>,
    pub(crate) form_map: Vec<(Span, Span)>,

    // Body state.
    pub(crate) content_length: usize,
    pub(crate) chunked: bool,
    pub(crate) content_type: Span,
    pub(crate) is_body_read: bool,
    pub(crate) body_start: Span,
    pub(crate) body: Span,
    pub(crate) body_end: usize,
}

impl<S> HttpContext<S> {
    pub fn new(stream: S, limits: &EngineLimits) -> Self {
        HttpContext {
            stream,
            rb: ReadBuffer::new(limits),

            status: "200 OK",
            header_scratch: vec![0; HEADER_SCRATCH_CAPACITY].into_boxed_slice(),
            scratch_len: 0,
            response_written: false,

            method: Span::empty(),
            url: Span::empty(),
            version: Span::empty(),
            query_string: Span::empty(),

            header_lines: [0; MAX_HEADER_LINES],
            header_lines_len: 0,
            header_map: Vec::with_capacity(20),
            cookie_map: Vec::with_capacity(8),
            query_map: Vec::with_capacity(10),
            form_map: Vec::with_capacity(10),

            content_length: 0,
            chunked: false,
            content_type: Span::empty(),
            is_body_read: false,
            body_start: Span::empty(),
            body: Span::empty(),
            body_end: 0,
        }
    }

    /// Derives body framing from the header lines and clears per-request
    /// parse state. Runs after the header block is complete, before the
    /// handler.
    ///
    /// Only lines starting with `C`/`c`/`T`/`t` are examined here;
    /// everything else waits for the lazy header index.
    pub(crate) fn prepare_request(&mut self) -> Result<(), Error> {
        self.content_length = 0;
        self.chunked = false;
        self.content_type = Span::empty();

        for i in 1..self.header_lines_len.saturating_sub(1) {
            let mut cur = self.header_lines[i];
            let line_end = self.header_lines[i + 1];

            if !matches!(self.rb.data()[cur], b'C' | b'c' | b'T' | b't') {
                continue;
            }

            let buf = self.rb.data();
            let key = types::split(buf, &mut cur, line_end, b':');
            let value = Self::line_value(buf, cur, line_end);

            if key.of(buf).eq_ignore_ascii_case(b"Content-Length") {
                self.content_length = types::slice_to_usize(value.of(buf))
                    .ok_or(Error::InvalidContentLength)?;
            } else if key.of(buf).eq_ignore_ascii_case(b"Content-Type") {
                self.content_type = value;
            } else if key.of(buf).eq_ignore_ascii_case(b"Transfer-Encoding") {
                self.chunked = value.of(buf).eq_ignore_ascii_case(b"chunked");
            }
        }

        Ok(())
    }

    /// Consumes any unread body, reclaims the request's buffer footprint
    /// and clears per-request state. After this, `rb.cursor` sits on the
    /// first byte of the next request (or the buffer is empty).
    pub(crate) async fn prepare_next_request(&mut self) -> Result<(), Error>
    where
        S: Socket,
    {
        if !self.is_body_read {
            self.read_whole_body().await?;
        }

        self.rb.free(self.header_lines[0], self.body_end);

        self.status = "200 OK";
        self.scratch_len = 0;
        self.response_written = false;

        self.method = Span::empty();
        self.url = Span::empty();
        self.version = Span::empty();
        self.query_string = Span::empty();
        self.content_type = Span::empty();

        self.header_lines_len = 0;
        self.header_map.clear();
        self.cookie_map.clear();
        self.query_map.clear();
        self.form_map.clear();

        self.is_body_read = false;
        self.body_start = Span::empty();
        self.body = Span::empty();
        self.body_end = 0;

        Ok(())
    }

    #[inline(always)]
    pub(crate) fn push_header_line(&mut self, at: usize) -> Result<(), Error> {
        if self.header_lines_len == MAX_HEADER_LINES {
            return Err(Error::TooManyHeaders);
        }

        self.header_lines[self.header_lines_len] = at;
        self.header_lines_len += 1;
        Ok(())
    }

    /// Value region of a header line: everything after `cur` up to the
    /// line's CRLF, with leading spaces stripped.
    #[inline]
    pub(crate) fn line_value(buf: &[u8], cur: usize, line_end: usize) -> Span {
        let end = line_end.saturating_sub(2).max(cur);
        types::trim_leading(buf, Span::new(cur.min(end), end), b' ')
    }
}

#[cfg(test)]
impl HttpContext<crate::tools::MockStream> {
    /// Builds a context over a scripted stream and parses the request
    /// head, ready for accessor-level tests.
    pub(crate) async fn from_request<V: AsRef<[u8]>>(value: V) -> Self {
        let stream = crate::tools::MockStream::request(value);
        let mut ctx = HttpContext::new(stream, &EngineLimits::default());

        assert!(ctx.read_request_head().await.unwrap());
        ctx.prepare_request().unwrap();
        ctx
    }
}
