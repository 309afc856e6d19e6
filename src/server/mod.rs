//! Connection lifecycle, routing and response writing
//!
//! The event loop owns every client connection and drives it through a
//! read phase (accumulate until the request is complete), a routing
//! step, and a write phase (serialize the response, then close). All
//! of it runs on one thread; the only blocking points are the poll(2)
//! call and the proxy relay's bounded waits.

pub mod assembler;
pub mod conn;
pub mod event_loop;
pub mod response;
pub mod router;

pub use conn::{Connection, ConnState};
pub use event_loop::{EventLoop, StopToken};
pub use router::{route, RequestError, RoutedRequest};

/// Result type for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal server errors
///
/// Per-connection failures never surface here; they are logged and the
/// offending connection is closed. Only conditions that invalidate the
/// loop itself are returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
