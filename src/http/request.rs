//! Request side of the context: header-block scan, lazy accessors and
//! body decoding.

use crate::{
    errors::Error,
    http::{
        context::HttpContext,
        types::{self, Span},
    },
    server::connection::Socket,
};

const FORM_CONTENT_TYPE: &[u8] = b"application/x-www-form-urlencoded";

// Header-block scan
impl<S: Socket> HttpContext<S> {
    /// Reads until the current request's header block is complete,
    /// recording the start of every header line on the way.
    ///
    /// Bytes already buffered (pipelined requests) are scanned before
    /// touching the socket. Returns `Ok(false)` on a clean disconnect
    /// before the first byte of a request.
    pub(crate) async fn read_request_head(&mut self) -> Result<bool, Error> {
        self.is_body_read = false;
        self.header_lines_len = 0;

        let mut header_end = self.rb.cursor;
        self.push_header_line(header_end)?;

        let mut complete = false;
        loop {
            while !complete && header_end + 3 < self.rb.end {
                if self.rb.data()[header_end] == b'\r' && self.rb.data()[header_end + 1] == b'\n'
                {
                    self.push_header_line(header_end + 2)?;
                    header_end += 2;

                    if self.rb.data()[header_end] == b'\r'
                        && self.rb.data()[header_end + 1] == b'\n'
                    {
                        header_end += 2;
                        complete = true;
                    }
                } else {
                    header_end += 1;
                }
            }

            if complete {
                break;
            }

            if self.rb.read_more(&mut self.stream, None).await? == 0 {
                return match self.rb.is_empty() {
                    true => Ok(false),
                    false => Err(Error::Closed),
                };
            }
        }

        self.body_start = Span::new(header_end, self.rb.end);
        Ok(true)
    }
}

// First line
impl<S> HttpContext<S> {
    fn parse_first_line(&mut self) {
        debug_assert!(self.header_lines_len >= 2);

        let buf = self.rb.data();
        let mut cur = self.header_lines[0];
        let end = self.header_lines[1];

        self.method = types::split(buf, &mut cur, end, b' ');
        self.url = types::split(buf, &mut cur, end, b' ');
        self.version = types::split(buf, &mut cur, end, b'\r');

        // Separate the query string from the path.
        let url_end = self.url.end;
        let mut query = self.url.start;
        self.url = types::split(buf, &mut query, url_end, b'?');
        self.query_string = Span::new(query.min(url_end), url_end);
    }

    pub fn method(&mut self) -> &[u8] {
        if self.method.is_empty() {
            self.parse_first_line();
        }
        self.rb.slice(self.method)
    }

    pub fn url(&mut self) -> &[u8] {
        if self.method.is_empty() {
            self.parse_first_line();
        }
        self.rb.slice(self.url)
    }

    pub fn http_version(&mut self) -> &[u8] {
        if self.method.is_empty() {
            self.parse_first_line();
        }
        self.rb.slice(self.version)
    }

    /// Raw query string: everything after the first `?` of the request
    /// target, or empty.
    pub fn get_parameters_string(&mut self) -> &[u8] {
        if self.method.is_empty() {
            self.parse_first_line();
        }
        self.rb.slice(self.query_string)
    }
}

// Lazy maps
impl<S> HttpContext<S> {
    fn index_headers(&mut self) {
        for i in 1..self.header_lines_len.saturating_sub(1) {
            let buf = self.rb.data();
            let mut cur = self.header_lines[i];
            let line_end = self.header_lines[i + 1];

            let key = types::split(buf, &mut cur, line_end, b':');
            let value = Self::line_value(buf, cur, line_end);
            self.header_map.push((key, value));
        }
    }

    pub(crate) fn header_span(&mut self, name: &[u8]) -> Option<Span> {
        if self.header_map.is_empty() {
            self.index_headers();
        }

        let buf = self.rb.data();
        self.header_map
            .iter()
            .find(|(key, _)| key.of(buf).eq_ignore_ascii_case(name))
            .map(|&(_, value)| value)
    }

    /// First header with the given name (case-insensitive, linear scan).
    pub fn header(&mut self, name: &[u8]) -> Option<&[u8]> {
        let span = self.header_span(name)?;
        Some(self.rb.slice(span))
    }

    fn index_cookies(&mut self) {
        let Some(cookies) = self.header_span(b"cookie") else {
            return;
        };

        let buf = self.rb.data();
        let mut cur = cookies.start;
        while cur < cookies.end {
            let key = types::split(buf, &mut cur, cookies.end, b'=');
            let value = types::split(buf, &mut cur, cookies.end, b';');
            self.cookie_map
                .push((types::trim_leading(buf, key, b' '), value));
        }
    }

    pub fn cookie(&mut self, name: &[u8]) -> Option<&[u8]> {
        if self.cookie_map.is_empty() {
            self.index_cookies();
        }

        let buf = self.rb.data();
        self.cookie_map
            .iter()
            .find(|(key, _)| key.of(buf) == name)
            .map(|&(_, value)| value.of(buf))
    }

    pub fn get_parameter(&mut self, name: &[u8]) -> Option<&[u8]> {
        if self.method.is_empty() {
            self.parse_first_line();
        }
        if self.query_map.is_empty() {
            let query = self.query_string;
            Self::decode_pairs(self.rb.data(), query, &mut self.query_map);
        }

        let buf = self.rb.data();
        self.query_map
            .iter()
            .find(|(key, _)| key.of(buf) == name)
            .map(|&(_, value)| value.of(buf))
    }

    /// Splits `key=value` pairs separated by `sep_pairs` out of `region`.
    /// No percent-unescaping happens here.
    fn decode_pairs(buf: &[u8], region: Span, map: &mut Vec<(Span, Span)>) {
        let mut cur = region.start;
        while cur < region.end {
            let key = types::split(buf, &mut cur, region.end, b'=');
            let value = types::split(buf, &mut cur, region.end, b'&');
            map.push((key, value));
        }
    }
}

// Body
impl<S: Socket> HttpContext<S> {
    /// Streams the request body to `callback` piece by piece.
    ///
    /// The payload stays materialized at `body_start` afterwards
    /// (chunked framing is squeezed out in place), so form decoding can
    /// still run after streaming.
    pub async fn read_body<F: FnMut(&[u8])>(&mut self, mut callback: F) -> Result<(), Error> {
        self.is_body_read = true;

        if !self.chunked && self.content_length == 0 {
            self.body_end = self.body_start.start;
            return Ok(());
        }

        if self.content_length > 0 {
            // Deliver the part of the body already buffered behind the
            // headers, then stream the rest off the socket.
            let have = self.body_start.len().min(self.content_length);
            let prefix = Span::new(self.body_start.start, self.body_start.start + have);
            callback(self.rb.slice(prefix));
            self.body_end = prefix.end;

            let mut delivered = have;
            while self.content_length > delivered {
                let received = self.rb.read_more(&mut self.stream, None).await?;
                if received == 0 {
                    return Err(Error::Closed);
                }

                let take = received.min(self.content_length - delivered);
                let part = Span::new(self.rb.end - received, self.rb.end - received + take);
                callback(self.rb.slice(part));
                // Freeing the tail of the valid region would retract
                // `end` below positions still in use; only interior
                // regions (a pipelined next request follows) are freed.
                if part.end < self.rb.end {
                    self.rb.free(part.start, part.end);
                }
                self.body_end = part.end;
                delivered += take;
            }

            self.body = Span::new(self.body_start.start, self.body_end);
        } else {
            let mut out = self.body_start.start;
            let mut cur = self.body_start.start;
            let mut chunk_size = self.read_chunk_size(&mut cur).await?;

            while chunk_size > 0 {
                let chunk = self.rb.read_n(&mut self.stream, cur, chunk_size).await?;
                callback(self.rb.slice(chunk));
                cur += chunk_size + 2; // skip the chunk's CRLF

                self.rb.move_within(chunk, out);
                out += chunk_size;

                chunk_size = self.read_chunk_size(&mut cur).await?;
            }

            cur += 2; // skip the terminating chunk's CRLF
            self.body_end = cur;
            self.body = Span::new(self.body_start.start, out);
        }

        Ok(())
    }

    /// Materializes the whole body as one contiguous slice. Chunked
    /// payloads are compacted in place, squeezing out the framing.
    pub async fn read_whole_body(&mut self) -> Result<&[u8], Error> {
        if !self.chunked && self.content_length == 0 {
            self.is_body_read = true;
            self.body_end = self.body_start.start;
            return Ok(&[]);
        }

        if self.content_length > 0 {
            self.body = self
                .rb
                .read_n(&mut self.stream, self.body_start.start, self.content_length)
                .await?;
            self.body_end = self.body.end;
        } else {
            let mut out = self.body_start.start;
            let mut cur = self.body_start.start;
            let mut chunk_size = self.read_chunk_size(&mut cur).await?;

            while chunk_size > 0 {
                let chunk = self.rb.read_n(&mut self.stream, cur, chunk_size).await?;
                cur += chunk_size + 2; // skip the chunk's CRLF

                self.rb.move_within(chunk, out);
                out += chunk_size;

                chunk_size = self.read_chunk_size(&mut cur).await?;
            }

            cur += 2; // skip the terminating chunk's CRLF
            self.body_end = cur;
            self.body = Span::new(self.body_start.start, out);
        }

        self.is_body_read = true;
        Ok(self.rb.slice(self.body))
    }

    async fn read_chunk_size(&mut self, cur: &mut usize) -> Result<usize, Error> {
        let token = self.rb.read_until(&mut self.stream, cur, b'\r').await?;
        *cur += 1; // skip the \n

        types::hex_to_usize(self.rb.slice(token)).ok_or(Error::InvalidChunk)
    }

    async fn index_form(&mut self) -> Result<(), Error> {
        if self.rb.slice(self.content_type) != FORM_CONTENT_TYPE {
            return Err(Error::bad_request("Unsupported content type for form decoding."));
        }

        if !self.is_body_read {
            self.read_whole_body().await?;
        }
        if self.form_map.is_empty() {
            let body = self.body;
            Self::decode_pairs(self.rb.data(), body, &mut self.form_map);
        }

        Ok(())
    }

    /// All form parameters of an `application/x-www-form-urlencoded`
    /// body, in request order. Any other content type is a 400.
    pub async fn post_parameters(&mut self) -> Result<Vec<(&[u8], &[u8])>, Error> {
        self.index_form().await?;

        let buf = self.rb.data();
        Ok(self
            .form_map
            .iter()
            .map(|&(key, value)| (key.of(buf), value.of(buf)))
            .collect())
    }

    /// Single form parameter lookup; same preconditions as
    /// [`post_parameters`](Self::post_parameters).
    pub async fn post_parameter(&mut self, name: &[u8]) -> Result<Option<&[u8]>, Error> {
        self.index_form().await?;

        let buf = self.rb.data();
        Ok(self
            .form_map
            .iter()
            .find(|(key, _)| key.of(buf) == name)
            .map(|&(_, value)| value.of(buf)))
    }
}



#[cfg(test)]
mod body_tests {
    use super::*;
    use crate::tools::*;

    async fn collect_body(request: &str, fragment: usize) -> Vec<u8> {
        let stream = MockStream::chunked(request.as_bytes(), fragment);
        let mut ctx = HttpContext::new(stream, &crate::limits::EngineLimits::default());

        assert!(ctx.read_request_head().await.unwrap());
        ctx.prepare_request().unwrap();

        let mut collected = Vec::new();
        ctx.read_body(|part| collected.extend_from_slice(part))
            .await
            .unwrap();
        collected
    }

    #[tokio::test]
    async fn content_length_stream() {
        let request = "POST /f HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";

        for fragment in [1, 3, 7, request.len()] {
            assert_eq!(
                collect_body(request, fragment).await,
                b"hello world",
                "fragment size: {fragment}"
            );
        }
    }

    #[tokio::test]
    async fn chunked_stream() {
        let request = "POST /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                       5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";

        for fragment in [1, 4, 9, request.len()] {
            assert_eq!(
                collect_body(request, fragment).await,
                b"hello world",
                "fragment size: {fragment}"
            );
        }
    }

    #[tokio::test]
    async fn chunked_any_chunking() {
        // The reassembled body is independent of how the sender chunked it.
        let chunkings: &[&[&str]] = &[
            &["hello world"],
            &["hello", " world"],
            &["h", "e", "l", "l", "o", " ", "w", "o", "r", "l", "d"],
            &["hel", "lo wor", "ld"],
        ];

        for chunks in chunkings {
            let mut request =
                String::from("POST /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
            for chunk in *chunks {
                request.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
            }
            request.push_str("0\r\n\r\n");

            assert_eq!(
                collect_body(&request, request.len()).await,
                b"hello world",
                "chunks: {chunks:?}"
            );
        }
    }

    #[tokio::test]
    async fn pipelined_request_after_streamed_body() {
        // The body and the next request arrive in one read; streaming
        // must leave the cursor on the pipelined request, not on the
        // consumed body bytes.
        let stream = MockStream::scripted(&[
            b"POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\n" as &[u8],
            b"helloGET /b HTTP/1.1\r\n\r\n",
        ]);
        let mut ctx = HttpContext::new(stream, &crate::limits::EngineLimits::default());

        assert!(ctx.read_request_head().await.unwrap());
        ctx.prepare_request().unwrap();

        let mut collected = Vec::new();
        ctx.read_body(|part| collected.extend_from_slice(part))
            .await
            .unwrap();
        assert_eq!(collected, b"hello");

        ctx.prepare_next_request().await.unwrap();
        assert!(ctx.read_request_head().await.unwrap());
        ctx.prepare_request().unwrap();
        assert_eq!(ctx.url(), b"/b");
    }

    #[tokio::test]
    async fn whole_body_chunked() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
             5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await;

        assert_eq!(ctx.read_whole_body().await.unwrap(), b"hello world");

        // body_end covers the full framed body.
        assert!(ctx.body_end >= ctx.body_start.start);
        assert!(ctx.body_end <= ctx.rb.end);
    }

    #[tokio::test]
    async fn whole_body_content_length() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await;

        assert_eq!(ctx.read_whole_body().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn empty_body() {
        let mut ctx = HttpContext::from_request("GET / HTTP/1.1\r\n\r\n").await;

        assert_eq!(ctx.read_whole_body().await.unwrap(), b"");
        assert_eq!(ctx.body_end, ctx.body_start.start);
    }

    #[tokio::test]
    async fn invalid_chunk_size() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nxyz\r\n\r\n",
        )
        .await;

        assert_eq!(
            ctx.read_whole_body().await.unwrap_err(),
            Error::InvalidChunk
        );
    }
}

#[cfg(test)]
mod form_tests {
    use super::*;
    use crate::tools::*;

    #[tokio::test]
    async fn form_parameters() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nContent-Length: 11\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\r\nname=alice&",
        )
        .await;

        assert_eq!(
            ctx.post_parameter(b"name").await.unwrap().map(str_op),
            Some("alice")
        );

        let parameters = ctx.post_parameters().await.unwrap();
        assert_eq!(parameters.len(), 1);
        assert_eq!(str_2(parameters[0]), ("name", "alice"));
    }

    #[tokio::test]
    async fn multiple_pairs() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nContent-Length: 15\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\r\na=1&b=2&c=three",
        )
        .await;

        let parameters = ctx.post_parameters().await.unwrap();
        assert_eq!(parameters.len(), 3);
        assert_eq!(str_2(parameters[0]), ("a", "1"));
        assert_eq!(str_2(parameters[1]), ("b", "2"));
        assert_eq!(str_2(parameters[2]), ("c", "three"));
    }

    #[tokio::test]
    async fn form_after_streamed_body() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nContent-Length: 11\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\r\nname=alice&",
        )
        .await;

        let mut collected = Vec::new();
        ctx.read_body(|part| collected.extend_from_slice(part))
            .await
            .unwrap();
        assert_eq!(collected, b"name=alice&");

        // Streaming leaves the body decodable.
        assert_eq!(
            ctx.post_parameter(b"name").await.unwrap().map(str_op),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn form_after_streamed_chunked_body() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\r\n\
             6\r\nname=a\r\n5\r\nlice&\r\n0\r\n\r\n",
        )
        .await;

        let mut collected = Vec::new();
        ctx.read_body(|part| collected.extend_from_slice(part))
            .await
            .unwrap();
        assert_eq!(collected, b"name=alice&");

        assert_eq!(
            ctx.post_parameter(b"name").await.unwrap().map(str_op),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn unsupported_content_type() {
        let mut ctx = HttpContext::from_request(
            "POST /f HTTP/1.1\r\nContent-Length: 2\r\nContent-Type: application/json\r\n\r\n{}",
        )
        .await;

        let error = ctx.post_parameters().await.unwrap_err();
        assert!(matches!(error, Error::Http { status: 400, .. }));
    }
}
