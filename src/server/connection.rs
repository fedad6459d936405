//! The per-connection driver: read, parse, dispatch, respond, reset.

use crate::{
    errors::Error, http::context::HttpContext, limits::EngineLimits,
    server::server_impl::Handler,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// The engine's I/O seam. Anything that reads and writes bytes can carry
/// a connection: a `TcpStream` in production, an in-memory duplex or a
/// scripted stream in tests.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

/// Serves one connection until the peer disconnects or a fatal error
/// occurs, invoking `handler` once per fully parsed request.
///
/// Requests are processed strictly in arrival order and responses are
/// emitted in the same order. A handler's HTTP error becomes a response
/// with its status and message; any fatal condition unwinds and drops
/// the connection. `Ok(())` is a clean disconnect.
pub async fn serve_connection<H, S>(
    handler: &H,
    stream: S,
    limits: &EngineLimits,
) -> Result<(), Error>
where
    H: Handler<S>,
    S: Socket,
{
    let mut ctx = HttpContext::new(stream, limits);

    loop {
        if !ctx.read_request_head().await? {
            return Ok(());
        }
        ctx.prepare_request()?;

        match handler.handle(&mut ctx).await {
            Ok(()) => {}
            Err(error) if error.is_fatal() => return Err(error),
            Err(Error::Http { status, message }) => {
                if status == 500 {
                    tracing::error!(%message, "handler failed");
                }
                ctx.set_status(status);
                ctx.respond(message.as_bytes()).await?;
            }
            // Every non-http error is fatal and already returned above.
            Err(error) => return Err(error),
        }

        ctx.respond_if_needed().await?;
        ctx.prepare_next_request().await?;
    }
}
