//! pollserv: an event-driven HTTP/1.1 server with virtual hosts and
//! reverse proxying.
//!
//! One poll(2)-driven loop multiplexes every client connection. Each
//! request is accumulated until complete, routed to a virtual server by
//! its Host header and to a location by longest URI-prefix, then served
//! from the filesystem or relayed to an upstream over a fresh
//! connection.
//!
//! Module map:
//! - [`config`]: the immutable virtual-server model, loaded from TOML
//! - [`http`]: wire-format types and the request parser
//! - [`net`]: listeners, upstream resolution, poll(2) helpers
//! - [`server`]: connection lifecycle, routing, response writing
//! - [`proxy`]: upstream forwarding

pub mod config;
pub mod http;
pub mod net;
pub mod proxy;
pub mod server;
