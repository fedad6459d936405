use std::{borrow::Cow, error, fmt, io, mem};

/// Everything that can go wrong while serving a connection.
///
/// The variants fall into two families:
///
/// - **Connection-fatal** conditions (`Closed`, `BufferOverflow`,
///   `TooManyHeaders`, `InvalidContentLength`, `InvalidChunk`, `Io`):
///   no response is written, the per-connection loop unwinds and the
///   socket is dropped.
/// - **HTTP errors** (`Http`): raised by a handler, framed as a response
///   with the carried status and the message as the body; the connection
///   stays open.
#[derive(Debug)]
pub enum Error {
    /// The peer closed the socket before a complete request was read.
    Closed,
    /// The read buffer reached its hard capacity.
    BufferOverflow,
    /// More header lines than the engine's fixed index can hold.
    TooManyHeaders,
    InvalidContentLength,
    /// Malformed chunk-size line in a chunked body.
    InvalidChunk,
    Io(io::Error),
    /// A handler-level error with an HTTP status and a response body.
    Http {
        status: u16,
        message: Cow<'static, str>,
    },
}

impl Error {
    #[inline]
    pub fn status(status: u16, message: impl Into<Cow<'static, str>>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::status(400, message)
    }

    #[inline]
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::status(401, message)
    }

    #[inline]
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::status(403, message)
    }

    #[inline]
    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::status(404, message)
    }

    #[inline]
    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::status(409, message)
    }

    #[inline]
    pub fn internal() -> Self {
        Self::status(500, "Internal server error.")
    }

    /// `true` for conditions that terminate the connection instead of
    /// producing a response.
    #[inline(always)]
    pub(crate) fn is_fatal(&self) -> bool {
        !matches!(self, Error::Http { .. })
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Closed => write!(f, "connection closed by peer"),
            Error::BufferOverflow => write!(f, "read buffer capacity exceeded"),
            Error::TooManyHeaders => write!(f, "too many header lines"),
            Error::InvalidContentLength => write!(f, "invalid Content-Length header"),
            Error::InvalidChunk => write!(f, "invalid chunk-size line"),
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Http { status, message } => write!(f, "http {status}: {message}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            (
                Error::Http { status, message },
                Error::Http {
                    status: other_status,
                    message: other_message,
                },
            ) => status == other_status && message == other_message,
            _ => mem::discriminant(self) == mem::discriminant(other),
        }
    }
}
