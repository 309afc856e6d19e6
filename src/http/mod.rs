//! HTTP/1.1 message types and parsing.
//!
//! This layer deals with the wire format only: header collections,
//! request/response records and the one-shot request parser that runs
//! once the server has accumulated a complete message. Routing and
//! policy live in [`crate::server`].

pub mod headers;
pub mod message;
pub mod parser;

pub use headers::Headers;
pub use message::{Method, Request, Response, Status};
pub use parser::parse_request;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP wire-format errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
