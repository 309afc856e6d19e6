//! Upstream forwarding for proxy locations
//!
//! Each proxied request opens a fresh connection to the resolved
//! upstream address: rewrite, send, relay, done. The relay loop reads
//! until the upstream closes or stays quiet for one bounded window,
//! which is taken as the end of the response. The wait stalls the
//! event loop for its duration; that latency is the accepted cost of
//! the single-threaded design.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

use tracing::debug;

use crate::http::parser::find_headers_end;
use crate::net::poll::{self, PollInterest};

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Proxy failures; surfaced to the client as a gateway error response
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no resolved address for upstream {0}")]
    NoAddress(String),

    #[error("cannot connect to upstream: {0}")]
    Connect(std::io::Error),

    #[error("cannot send to upstream: {0}")]
    Send(std::io::Error),

    #[error("cannot read from upstream: {0}")]
    Relay(std::io::Error),
}

/// Per-attempt readiness window while relaying the upstream response
const RELAY_WINDOW: Duration = Duration::from_millis(50);

const RELAY_CHUNK: usize = 8192;

/// Forward a raw request to an upstream and relay its response
///
/// `upstream` is the `host:port` the Host header is rewritten to;
/// `addr` is its resolved address (absent only if resolution was
/// skipped, which is a proxy error).
pub fn forward(
    raw: &[u8],
    location_uri: &str,
    upstream: &str,
    addr: Option<SocketAddr>,
) -> Result<Vec<u8>> {
    let addr = addr.ok_or_else(|| Error::NoAddress(upstream.to_string()))?;
    let rewritten = rewrite_for_upstream(raw, location_uri, upstream);

    let mut stream = TcpStream::connect(addr).map_err(Error::Connect)?;
    stream.write_all(&rewritten).map_err(Error::Send)?;
    stream.set_nonblocking(true).map_err(Error::Relay)?;

    let mut response = Vec::new();
    loop {
        match poll::wait(stream.as_raw_fd(), PollInterest::Read, Some(RELAY_WINDOW)) {
            Ok(true) => {}
            // Upstream went quiet: take the response as complete
            Ok(false) => break,
            Err(e) => return Err(Error::Relay(e)),
        }

        let mut chunk = [0u8; RELAY_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
            Err(e) => return Err(Error::Relay(e)),
        }
    }

    debug!(upstream, bytes = response.len(), "upstream response relayed");
    Ok(response)
}

/// Rewrite a raw request for its upstream
///
/// Replaces the Host header value with the upstream `host:port` and
/// strips the matched location prefix from the request-line URI (a `/`
/// prefix is left alone), keeping the remainder rooted at `/`. The
/// body is carried through untouched.
pub fn rewrite_for_upstream(raw: &[u8], location_uri: &str, upstream: &str) -> Vec<u8> {
    let head_end = find_headers_end(raw).unwrap_or(raw.len());
    let head = String::from_utf8_lossy(&raw[..head_end]);

    let mut lines: Vec<String> = Vec::new();
    for (i, line) in head.split("\r\n").enumerate() {
        if i == 0 {
            lines.push(rewrite_request_line(line, location_uri));
        } else if line.len() >= 5 && line[..5].eq_ignore_ascii_case("host:") {
            lines.push(format!("Host: {}", upstream));
        } else {
            lines.push(line.to_string());
        }
    }

    let mut out = lines.join("\r\n").into_bytes();
    // Header terminator and body, verbatim
    out.extend_from_slice(&raw[head_end..]);
    out
}

fn rewrite_request_line(line: &str, location_uri: &str) -> String {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() != 3 {
        return line.to_string();
    }
    let (method, uri, version) = (parts[0], parts[1], parts[2]);

    if location_uri == "/" || !uri.starts_with(location_uri) {
        return line.to_string();
    }

    let mut stripped = uri[location_uri.len()..].to_string();
    if !stripped.starts_with('/') {
        stripped.insert(0, '/');
    }
    format!("{} {} {}", method, stripped, version)
}
