//! Engine and server configuration limits
//!
//! Defaults mirror the engine's fixed wire-format bounds: a 4 KiB read
//! buffer that doubles on demand up to a 10 MiB hard cap, 100 header
//! lines per request, a 1000-byte scratch for handler-set response
//! headers, and a 10 000-byte bound for inline response bodies. The cap
//! on the read buffer is also the per-connection memory bound: a request
//! that cannot fit drops the connection.

use std::time::Duration;

/// Header-line index capacity per request. Requests with more lines are
/// rejected as unparseable.
pub(crate) const MAX_HEADER_LINES: usize = 100;

/// Capacity of the response-header scratch the handler appends
/// `Set-Cookie` and custom headers into.
pub(crate) const HEADER_SCRATCH_CAPACITY: usize = 1000;

/// Capacity of the slab the response head (status line, fixed headers,
/// scratch, `Content-Length`) is formatted into.
pub(crate) const RESPONSE_HEAD_CAPACITY: usize = 10_200;

/// Largest body written inline with the head in a single buffered write.
/// Larger bodies go out as a gathered write of `[head, body]`.
pub(crate) const INLINE_BODY_MAX: usize = 10_000;

/// Per-connection buffer sizing.
///
/// Each connection owns one read buffer that is reused across every
/// request on that connection. It starts at `read_buffer_capacity` and
/// doubles whenever a read fills it, up to `read_buffer_max`; reaching
/// the cap terminates the connection.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Initial read buffer capacity (default: `4 KiB`).
    pub read_buffer_capacity: usize,

    /// Hard cap on the read buffer (default: `10 MiB`).
    ///
    /// Bounds per-connection memory; a single request larger than this
    /// cannot be parsed and drops the connection.
    pub read_buffer_max: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for EngineLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            read_buffer_capacity: 4 * 1024,
            read_buffer_max: 10 * 1024 * 1024,
            _priv: (),
        }
    }
}

/// Server-level concurrency and queueing behavior.
///
/// Accepted connections are queued; a fixed pool of worker tasks pops
/// the queue and drives one connection at a time each. When the queue is
/// full, new connections receive an immediate `503` and are dropped.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks, i.e. concurrently served connections
    /// (default: `100`).
    pub max_connections: usize,

    /// Maximum number of accepted connections waiting for a worker
    /// (default: `250`).
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue to fill (default:
    /// `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            _priv: (),
        }
    }
}

/// Strategy for worker tasks waiting on an empty connection queue.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Spin through [`tokio::task::yield_now`]. Lowest latency, busy CPU.
    Yield,

    /// Sleep between polls via [`tokio::time::sleep`].
    Sleep(Duration),
}
