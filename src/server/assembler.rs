//! Request completeness detection
//!
//! Decides how many bytes make up the in-flight request. Until the
//! header block has arrived the answer is unknown. With headers in
//! hand the total is the header block plus `Content-Length`, except for
//! multipart bodies: there the closing boundary terminator is
//! authoritative, so a declared length that undercounts the actual
//! body does not truncate it.

use crate::http::parser::{find_headers_end, find_subsequence};

/// Expected total length of the request currently in `buf`
///
/// `None` means not yet determinable: either the header block is
/// incomplete, or the body is multipart and its closing boundary has
/// not arrived.
pub fn expected_length(buf: &[u8]) -> Option<usize> {
    let head_end = find_headers_end(buf)?;
    let head_len = head_end + 4;
    let head = String::from_utf8_lossy(&buf[..head_end]);

    if let Some(boundary) = multipart_boundary(&head) {
        // The terminator position wins over the declared Content-Length
        let terminator = format!("--{}--", boundary);
        let pos = find_subsequence(buf, terminator.as_bytes())?;
        return Some(pos + terminator.len());
    }

    match content_length(&head) {
        Some(n) => Some(head_len + n),
        None => Some(head_len),
    }
}

/// True once `buf` holds at least the expected number of bytes
pub fn is_complete(buf: &[u8], expected: Option<usize>) -> bool {
    expected.is_some_and(|n| buf.len() >= n)
}

fn content_length(head: &str) -> Option<usize> {
    header_value(head, "content-length")?.trim().parse().ok()
}

fn multipart_boundary(head: &str) -> Option<String> {
    let content_type = header_value(head, "content-type")?;
    let idx = content_type.to_ascii_lowercase().find("boundary=")?;
    let value = &content_type[idx + "boundary=".len()..];
    let value = value.split(';').next().unwrap_or(value).trim();
    let value = value.trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n").skip(1).find_map(|line| {
        let (n, v) = line.split_once(':')?;
        if n.trim().eq_ignore_ascii_case(name) {
            Some(v.trim())
        } else {
            None
        }
    })
}
