//! HTTP message types
//!
//! Requests are what the parser produces from client bytes; responses
//! are what the response writer serializes back. The request keeps its
//! protocol version as the literal string received so the validator can
//! reject anything that is not exactly `HTTP/1.1` with a 505 rather
//! than a parse failure.

use super::{Error, Headers, Result, CRLF};
use std::fmt;

/// HTTP request methods
///
/// Parsing never fails: unrecognized tokens become [`Method::Extension`]
/// and are rejected later by the per-location method check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Extension(String),
}

impl Method {
    /// Parse a method token
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            other => Method::Extension(other.to_string()),
        }
    }

    /// Method token as sent on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Extension(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(code))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }

    pub const OK: Status = Status { code: 200 };
    pub const NO_CONTENT: Status = Status { code: 204 };
    pub const BAD_REQUEST: Status = Status { code: 400 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const METHOD_NOT_ALLOWED: Status = Status { code: 405 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
    pub const NOT_IMPLEMENTED: Status = Status { code: 501 };
    pub const BAD_GATEWAY: Status = Status { code: 502 };
    pub const VERSION_NOT_SUPPORTED: Status = Status { code: 505 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// A parsed HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    /// Protocol version exactly as received, e.g. `HTTP/1.1`
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    /// The Host header value, trimmed, if present
    pub fn host(&self) -> Option<&str> {
        self.headers.get("Host").map(str::trim)
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    status: Status,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Create a builder for constructing responses
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    /// Get the status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize the response to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.body.len());

        // Status line
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.status.code().to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.reason_phrase().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        // Headers
        for (name, value) in self.headers.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }

        // Empty line
        buf.extend_from_slice(CRLF.as_bytes());

        // Body
        buf.extend_from_slice(&self.body);

        buf
    }
}

/// Builder for HTTP responses
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    status: Option<Status>,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Set the status code
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Build the response
    pub fn build(self) -> Response {
        Response {
            status: self.status.unwrap_or(Status::OK),
            headers: self.headers,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("GET"), Method::Get);
        assert_eq!(Method::parse("DELETE"), Method::Delete);
        assert_eq!(
            Method::parse("BREW"),
            Method::Extension("BREW".to_string())
        );
        assert_eq!(Method::parse("BREW").as_str(), "BREW");
    }

    #[test]
    fn test_status() {
        let status = Status::new(200).unwrap();
        assert_eq!(status.code(), 200);
        assert_eq!(status.reason_phrase(), "OK");
        assert_eq!(Status::VERSION_NOT_SUPPORTED.code(), 505);
        assert!(Status::new(99).is_err());
        assert!(Status::new(600).is_err());
    }

    #[test]
    fn test_response_to_wire() {
        let resp = Response::builder()
            .status(Status::NOT_FOUND)
            .header("Content-Length", "9")
            .header("Connection", "close")
            .body(b"Not Found".to_vec())
            .build();

        let wire = String::from_utf8(resp.to_wire()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(wire.contains("Content-Length: 9\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\nNot Found"));
    }
}
