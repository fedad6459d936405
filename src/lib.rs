//! ember_web - Incremental HTTP/1.1 engine for keep-alive services
//!
//! A per-connection state machine that ingests bytes from a stream
//! socket, parses request lines and headers with zero-copy spans into a
//! reusable read buffer, exposes lazy accessors for url, query
//! parameters, headers, cookies and body (including chunked transfer),
//! and emits well-formed responses while holding the connection open for
//! keep-alive reuse.
//!
//! # Design
//!
//! - **One buffer per connection** - every slice a handler observes
//!   points into the connection's read buffer; the buffer is reclaimed
//!   between requests, not between accessors, so lazy parsing stays
//!   allocation-free.
//! - **Tolerant of fragmentation** - the parser accepts arbitrary TCP
//!   fragmentation; feeding a request one byte at a time parses the same
//!   as feeding it whole.
//! - **Two body protocols** - `Content-Length` and chunked transfer,
//!   streamed through a callback or materialized contiguously.
//! - **Buffered and gathered writes** - small responses cost one write
//!   syscall, large ones at most two (head + body via a vectored write).
//! - **Bounded memory** - the read buffer doubles on demand up to a hard
//!   cap; a request that cannot fit drops the connection.
//!
//! # Quick Start
//!
//! ```no_run
//! use ember_web::{Error, Handler, HttpContext, Server, Socket};
//! use tokio::net::TcpListener;
//!
//! struct MyHandler;
//!
//! impl<S: Socket> Handler<S> for MyHandler {
//!     async fn handle(&self, ctx: &mut HttpContext<S>) -> Result<(), Error> {
//!         if ctx.url() == b"/hi" {
//!             return ctx.respond(b"ok").await;
//!         }
//!         Err(Error::not_found("no such route"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .handler(MyHandler)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! The engine can also be embedded without the bundled server: drive
//! [`serve_connection`] from your own accept loop with anything that
//! implements [`Socket`].

pub(crate) mod http {
    pub(crate) mod buffer;
    pub(crate) mod context;
    pub(crate) mod output;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod static_files;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod date;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::Error,
    http::context::HttpContext,
    server::{
        connection::{serve_connection, Socket},
        server_impl::{Handler, Server, ServerBuilder},
    },
};
