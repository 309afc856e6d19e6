//! Per-connection state
//!
//! A `Connection` owns its socket; dropping the table entry closes the
//! descriptor, so deregistration (removal from the table) and close are
//! inseparable by construction. The read and write drivers run until
//! the socket would block, leaving progress in the connection state for
//! the next readiness event.

use bytes::{Bytes, BytesMut};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

use tracing::warn;

use super::assembler;
use super::router::RoutedRequest;

const READ_CHUNK: usize = 4096;

/// Upper bound on an accumulated request; a peer still incomplete past
/// this is dropped instead of growing the buffer without limit
const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Which readiness the connection currently waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Reading,
    Writing,
}

/// Outcome of driving the read side once
#[derive(Debug)]
pub enum ReadOutcome {
    /// Would block before the request completed; stay read-interested
    Incomplete,
    /// Peer closed with nothing buffered, or the read failed; drop the
    /// connection without a response
    Closed,
    /// A complete request buffer is ready for routing
    Complete(Bytes),
}

/// Outcome of driving the write side once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Would block mid-response; stay write-interested
    Pending,
    /// Response fully written (or nothing to write); close normally
    Done,
    /// Write failed; close
    Failed,
}

/// State for one client connection, owned by the event loop's table
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    buf: BytesMut,
    expected: Option<usize>,
    state: ConnState,
    pub(crate) routed: Option<RoutedRequest>,
    pub(crate) response: Option<Vec<u8>>,
    written: usize,
}

impl Connection {
    /// Wrap an accepted (already non-blocking) client socket
    pub fn new(stream: TcpStream) -> Self {
        Connection {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            expected: None,
            state: ConnState::Reading,
            routed: None,
            response: None,
            written: 0,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Flip to write interest once routing has produced a result
    pub fn begin_write(&mut self, routed: RoutedRequest) {
        self.routed = Some(routed);
        self.state = ConnState::Writing;
    }

    /// Read until the request completes, the socket would block, the
    /// peer closes, or the read fails.
    pub fn drive_read(&mut self) -> ReadOutcome {
        let mut peer_closed = false;

        loop {
            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    // Recomputed on every read: a multipart terminator can
                    // turn up long after the header block did
                    self.expected = assembler::expected_length(&self.buf);
                    if assembler::is_complete(&self.buf, self.expected) {
                        break;
                    }
                    if self.buf.len() > MAX_REQUEST_BYTES {
                        warn!(fd = self.fd(), len = self.buf.len(), "request too large");
                        return ReadOutcome::Closed;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(fd = self.fd(), "read error: {e}");
                    return ReadOutcome::Closed;
                }
            }
        }

        if assembler::is_complete(&self.buf, self.expected)
            || (peer_closed && !self.buf.is_empty())
        {
            return ReadOutcome::Complete(self.buf.split().freeze());
        }

        if peer_closed {
            // Empty buffer on close: nothing to respond to
            ReadOutcome::Closed
        } else {
            ReadOutcome::Incomplete
        }
    }

    /// Write as much of the response as the socket accepts
    pub fn drive_write(&mut self) -> WriteOutcome {
        let Some(response) = &self.response else {
            return WriteOutcome::Done;
        };

        while self.written < response.len() {
            match self.stream.write(&response[self.written..]) {
                Ok(0) => return WriteOutcome::Failed,
                Ok(n) => self.written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return WriteOutcome::Pending,
                Err(e) => {
                    warn!(fd = self.fd(), "write error: {e}");
                    return WriteOutcome::Failed;
                }
            }
        }

        WriteOutcome::Done
    }
}
