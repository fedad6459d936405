//! Server front-end: accept loop, worker pool and handler contract.

use crate::{
    errors::Error,
    http::context::HttpContext,
    limits::{EngineLimits, ServerLimits, WaitStrategy},
    server::{connection::serve_connection, connection::Socket, date},
};
use crossbeam::queue::SegQueue;
use std::{future::Future, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::yield_now,
    time::sleep,
};

/// The route dispatcher seam: invoked once per fully parsed request.
///
/// The context is both sides of the exchange: lazy request accessors
/// (url, headers, cookies, query, body, form) and the response API
/// (`set_status`, `set_header`, `set_cookie`, `respond`, `respond_json`,
/// `send_static_file`). A handler that does not respond produces an
/// empty response with the current status.
///
/// Returning an [`Error::Http`] frames the status and message as the
/// response; any fatal error drops the connection.
///
/// # Examples
/// ```no_run
/// use ember_web::{Error, Handler, HttpContext, Server, Socket};
/// use tokio::net::TcpListener;
///
/// struct Hello;
///
/// impl<S: Socket> Handler<S> for Hello {
///     async fn handle(&self, ctx: &mut HttpContext<S>) -> Result<(), Error> {
///         if ctx.url() == b"/hello" {
///             return ctx.respond(b"Hello world!").await;
///         }
///         Err(Error::not_found("no such route"))
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .handler(Hello)
///         .build()
///         .launch()
///         .await;
/// }
/// ```
pub trait Handler<S: Socket>: Sync + Send + 'static {
    fn handle(&self, ctx: &mut HttpContext<S>)
        -> impl Future<Output = Result<(), Error>> + Send;
}

/// Accepts connections and drives them through a fixed worker pool.
///
/// Accepted sockets go into a queue; each worker pops one and serves it
/// request-by-request until it closes. When the queue is full, new
/// connections get an immediate `503`.
pub struct Server<H> {
    listener: TcpListener,
    handler: Arc<H>,
    server_limits: ServerLimits,
    engine_limits: EngineLimits,
}

impl<H: Handler<TcpStream>> Server<H> {
    #[inline]
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder {
            listener: None,
            handler: None,
            server_limits: None,
            engine_limits: None,
        }
    }

    /// Runs the server forever: spawns the date refresher and the worker
    /// pool, then feeds the accept loop.
    pub async fn launch(self) {
        tokio::spawn(date::refresh_loop());

        let queue: Arc<SegQueue<TcpStream>> = Arc::new(SegQueue::new());
        for _ in 0..self.server_limits.max_connections {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&self.handler);
            let limits = self.engine_limits.clone();
            let wait = self.server_limits.wait_strategy.clone();

            tokio::spawn(async move {
                loop {
                    let stream = next_stream(&queue, &wait).await;
                    if let Err(error) = serve_connection(handler.as_ref(), stream, &limits).await
                    {
                        tracing::debug!(%error, "connection terminated");
                    }
                }
            });
        }

        tracing::info!(
            workers = self.server_limits.max_connections,
            "accepting connections"
        );

        loop {
            let Ok((stream, _)) = self.listener.accept().await else {
                continue;
            };

            match queue.len() < self.server_limits.max_pending_connections {
                true => queue.push(stream),
                false => {
                    tokio::spawn(reject_overloaded(stream));
                }
            }
        }
    }
}

async fn next_stream(queue: &SegQueue<TcpStream>, wait: &WaitStrategy) -> TcpStream {
    loop {
        if let Some(stream) = queue.pop() {
            return stream;
        }

        match wait {
            WaitStrategy::Yield => yield_now().await,
            WaitStrategy::Sleep(time) => sleep(*time).await,
        }
    }
}

async fn reject_overloaded(mut stream: TcpStream) {
    const RESPONSE: &[u8] =
        b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

    if let Err(error) = stream.write_all(RESPONSE).await {
        tracing::debug!(%error, "failed to send 503");
    }
}

/// Builder for [`Server`]. `listener` and `handler` are required;
/// limits default per [`ServerLimits`] and [`EngineLimits`].
pub struct ServerBuilder<H> {
    listener: Option<TcpListener>,
    handler: Option<H>,
    server_limits: Option<ServerLimits>,
    engine_limits: Option<EngineLimits>,
}

impl<H: Handler<TcpStream>> ServerBuilder<H> {
    #[inline]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    #[inline]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    #[inline]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    #[inline]
    pub fn engine_limits(mut self, limits: EngineLimits) -> Self {
        self.engine_limits = Some(limits);
        self
    }

    /// # Panics
    /// When `listener` or `handler` was not set.
    pub fn build(self) -> Server<H> {
        let Some(listener) = self.listener else {
            panic!("Server::builder() requires a listener");
        };
        let Some(handler) = self.handler else {
            panic!("Server::builder() requires a handler");
        };

        Server {
            listener,
            handler: Arc::new(handler),
            server_limits: self.server_limits.unwrap_or_default(),
            engine_limits: self.engine_limits.unwrap_or_default(),
        }
    }
}
