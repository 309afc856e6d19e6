//! poll(2) readiness helper for a single descriptor
//!
//! The event loop builds its own descriptor set; this helper covers the
//! one-off waits (the proxy relay's bounded window).

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Readiness to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterest {
    Read,
    Write,
}

/// Wait until `fd` is ready or the timeout elapses
///
/// Returns `Ok(true)` if the descriptor became ready, `Ok(false)` on
/// timeout. `None` waits indefinitely.
pub fn wait(fd: RawFd, interest: PollInterest, timeout: Option<Duration>) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: match interest {
            PollInterest::Read => libc::POLLIN,
            PollInterest::Write => libc::POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout.map(|d| d.as_millis() as i32).unwrap_or(-1);

    let result = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(result > 0)
}
