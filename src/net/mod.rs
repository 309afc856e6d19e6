//! Socket plumbing
//!
//! Listener creation, upstream address resolution and the poll(2)
//! readiness helper. Everything here runs at startup or from the
//! single-threaded event loop; failures during startup abort the
//! process, failures at runtime are scoped to one connection.

pub mod listener;
pub mod poll;
pub mod resolver;

pub use listener::ListenerSet;
pub use poll::{wait, PollInterest};
pub use resolver::{resolve_proxy_targets, ProxyAddressMap};

/// Result type for socket operations
pub type Result<T> = std::result::Result<T, Error>;

/// Socket setup errors; all of them are startup-fatal
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("cannot resolve upstream {0}")]
    Resolve(String),
}
