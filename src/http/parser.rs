//! One-shot HTTP request parsing
//!
//! The connection layer accumulates bytes until a message is complete,
//! so parsing here runs once over a full buffer rather than as an
//! incremental state machine.

use super::{Error, Headers, Method, Request, Result};

/// Find the start of the `\r\n\r\n` header terminator
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Find the first occurrence of `needle` in `haystack`
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse the request line
///
/// Format: METHOD URI VERSION, e.g. `GET /index.html HTTP/1.1`.
/// The version is kept verbatim; only the overall shape is enforced.
pub fn parse_request_line(line: &str) -> Result<(Method, String, String)> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() != 3 {
        return Err(Error::Parse(format!(
            "invalid request line: expected 3 parts, got {}",
            parts.len()
        )));
    }

    Ok((
        Method::parse(parts[0]),
        parts[1].to_string(),
        parts[2].to_string(),
    ))
}

/// Parse a complete request buffer
///
/// The buffer must contain the full header block; everything after the
/// header terminator is taken as the body verbatim.
pub fn parse_request(raw: &[u8]) -> Result<Request> {
    let head_end =
        find_headers_end(raw).ok_or_else(|| Error::Parse("missing header terminator".to_string()))?;
    let head = String::from_utf8_lossy(&raw[..head_end]);

    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| Error::Parse("empty request".to_string()))?;
    let (method, uri, version) = parse_request_line(request_line)?;

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = Headers::parse_header_line(line)?;
        headers.insert(name, value);
    }

    Ok(Request {
        method,
        uri,
        version,
        headers,
        body: raw[head_end + 4..].to_vec(),
    })
}
