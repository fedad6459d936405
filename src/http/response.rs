//! Response side of the context: header scratch, status handling and the
//! buffered / gathered write paths.

use crate::{
    errors::Error,
    http::{context::HttpContext, output::OutputBuffer, static_files, types},
    limits::{INLINE_BODY_MAX, RESPONSE_HEAD_CAPACITY},
    server::{connection::Socket, date},
};
use serde::Serialize;
use std::io::{self, IoSlice};
use tokio::io::AsyncWriteExt;

const SERVER_TOKEN: &[u8] = b"ember_web";

// Response metadata
impl<S> HttpContext<S> {
    /// Sets the response status. Unknown codes fall back to `200 OK`.
    #[inline]
    pub fn set_status(&mut self, status: u16) {
        self.status = types::status_token(status);
    }

    /// Appends `name: value` to the response headers.
    #[inline]
    pub fn set_header(&mut self, name: &[u8], value: &[u8]) {
        let mut out = OutputBuffer::from_parts(&mut self.header_scratch, self.scratch_len);
        out.push(name);
        out.push(b": ");
        out.push(value);
        out.push(b"\r\n");
        self.scratch_len = out.len();
    }

    /// Appends a `Set-Cookie: name=value` response header.
    #[inline]
    pub fn set_cookie(&mut self, name: &[u8], value: &[u8]) {
        let mut out = OutputBuffer::from_parts(&mut self.header_scratch, self.scratch_len);
        out.push(b"Set-Cookie: ");
        out.push(name);
        out.push_byte(b'=');
        out.push(value);
        out.push(b"\r\n");
        self.scratch_len = out.len();
    }

    fn format_top_headers(&self, out: &mut OutputBuffer<'_>, date: &[u8]) {
        out.push(b"HTTP/1.1 ");
        out.push(self.status.as_bytes());
        out.push(b"\r\nDate: ");
        out.push(date);
        out.push(b"\r\nConnection: keep-alive\r\nServer: ");
        out.push(SERVER_TOKEN);
        out.push(b"\r\n");
    }
}

// Writing
impl<S: Socket> HttpContext<S> {
    /// Sends the response with `body`.
    ///
    /// Bodies up to 10 000 bytes are written together with the head in
    /// one buffered write; larger bodies go out as a gathered write of
    /// `[head, body]`, so even a multi-hundred-KiB response costs two
    /// syscalls at most on a writable socket.
    pub async fn respond(&mut self, body: &[u8]) -> Result<(), Error> {
        self.response_written = true;

        let date = date::current();
        let mut slab = [0u8; RESPONSE_HEAD_CAPACITY + INLINE_BODY_MAX];
        let mut head = OutputBuffer::new(&mut slab);

        self.format_top_headers(&mut head, &date);
        head.push(&self.header_scratch[..self.scratch_len]);
        head.push(b"Content-Length: ");
        head.push_int(body.len());
        head.push(b"\r\n\r\n");

        if body.len() <= INLINE_BODY_MAX {
            head.push(body);
            self.stream
                .write_all(head.as_slice())
                .await
                .map_err(Error::Io)?;
        } else {
            write_gathered(&mut self.stream, head.as_slice(), body)
                .await
                .map_err(Error::Io)?;
        }

        Ok(())
    }

    /// Serializes `value` into the fixed JSON scratch and sends it.
    /// Values that do not fit in 10 000 bytes are a 500.
    pub async fn respond_json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let mut json_slab = [0u8; INLINE_BODY_MAX];
        let mut json = OutputBuffer::new(&mut json_slab);

        if serde_json::to_writer(&mut json, value).is_err() {
            return Err(Error::internal());
        }

        let len = json.len();
        drop(json);
        self.respond(&json_slab[..len]).await
    }

    /// Emits a zero-length response with the current status if the
    /// handler never responded.
    pub(crate) async fn respond_if_needed(&mut self) -> Result<(), Error> {
        match self.response_written {
            true => Ok(()),
            false => self.respond(b"").await,
        }
    }

    /// Serves a file through the thread-local mapped-file cache. An
    /// unknown path is opened and mapped once per worker thread; a path
    /// that cannot be opened is a 404.
    pub async fn send_static_file(&mut self, path: &str) -> Result<(), Error> {
        let content = static_files::mapped(path)?;
        self.respond(content).await
    }
}

async fn write_gathered<S: Socket>(stream: &mut S, head: &[u8], body: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < head.len() {
        let bufs = [IoSlice::new(&head[written..]), IoSlice::new(body)];
        match stream.write_vectored(&bufs).await? {
            0 => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            sent => written += sent,
        }
    }

    let mut body_written = written - head.len();
    while body_written < body.len() {
        match stream.write(&body[body_written..]).await? {
            0 => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            sent => body_written += sent,
        }
    }

    Ok(())
}


#[cfg(test)]
mod static_file_tests {
    use super::*;
    use crate::tools::*;
    use std::{fs, io::Write as _};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ember_web_{}_{name}", std::process::id()))
    }

    #[tokio::test]
    async fn serves_and_caches() {
        let path = temp_path("hello.txt");
        fs::File::create(&path)
            .and_then(|mut f| f.write_all(b"static body"))
            .unwrap();

        let mut ctx = HttpContext::from_request("GET /hello.txt HTTP/1.1\r\n\r\n").await;
        ctx.send_static_file(path.to_str().unwrap()).await.unwrap();
        assert!(ctx
            .stream
            .sent()
            .ends_with(b"Content-Length: 11\r\n\r\nstatic body"));

        // The mapping outlives the file: a cached entry still serves
        // after deletion.
        fs::remove_file(&path).unwrap();
        let mut ctx = HttpContext::from_request("GET /hello.txt HTTP/1.1\r\n\r\n").await;
        ctx.send_static_file(path.to_str().unwrap()).await.unwrap();
        assert!(ctx.stream.sent().ends_with(b"static body"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let mut ctx = HttpContext::from_request("GET /nope HTTP/1.1\r\n\r\n").await;
        let error = ctx
            .send_static_file("/definitely/not/a/real/file")
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Http { status: 404, .. }));
    }
}
