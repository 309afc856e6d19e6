//! The event loop
//!
//! One poll(2) call per iteration over every listener and client
//! socket. Handlers run to completion on the loop thread, so no two
//! connections are ever serviced concurrently and none of the state
//! needs locking. The poll set is rebuilt from the connection table
//! each iteration, which makes deregistration and close a single
//! operation: removing the table entry drops the socket.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::conn::{ConnState, Connection, ReadOutcome, WriteOutcome};
use super::{response, router, Result};
use crate::config::Config;
use crate::net::{ListenerSet, ProxyAddressMap};

/// How long one poll call may block; bounds stop-token latency
const POLL_INTERVAL_MS: i32 = 250;

/// Cooperative shutdown flag for [`EventLoop::run`]
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop after its current iteration
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The connection multiplexer
///
/// Owns the listeners, the immutable configuration and every live
/// client connection, keyed by raw descriptor.
pub struct EventLoop {
    config: Config,
    proxies: ProxyAddressMap,
    listeners: ListenerSet,
    connections: HashMap<RawFd, Connection>,
}

impl EventLoop {
    pub fn new(config: Config, proxies: ProxyAddressMap, listeners: ListenerSet) -> Self {
        EventLoop {
            config,
            proxies,
            listeners,
            connections: HashMap::new(),
        }
    }

    /// Serve until the stop token is set
    ///
    /// Per-connection failures are logged and close only that
    /// connection; the loop returns an error only if polling itself
    /// fails. In-flight connections are not drained at shutdown.
    pub fn run(&mut self, stop: &StopToken) -> Result<()> {
        info!(ports = ?self.listeners.ports(), "serving");

        while !stop.is_stopped() {
            let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(
                self.listeners.len() + self.connections.len(),
            );

            for listener in self.listeners.iter() {
                pollfds.push(libc::pollfd {
                    fd: listener.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
            }
            for conn in self.connections.values() {
                pollfds.push(libc::pollfd {
                    fd: conn.fd(),
                    events: match conn.state() {
                        ConnState::Reading => libc::POLLIN,
                        ConnState::Writing => libc::POLLOUT,
                    },
                    revents: 0,
                });
            }

            let ready = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    POLL_INTERVAL_MS,
                )
            };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            if ready == 0 {
                continue;
            }

            for pollfd in pollfds {
                if pollfd.revents == 0 {
                    continue;
                }
                if self.listeners.contains(pollfd.fd) {
                    self.accept_client(pollfd.fd);
                } else if pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
                    && self.state_of(pollfd.fd) == Some(ConnState::Reading)
                {
                    self.handle_readable(pollfd.fd);
                } else if pollfd.revents & (libc::POLLOUT | libc::POLLHUP | libc::POLLERR) != 0
                    && self.state_of(pollfd.fd) == Some(ConnState::Writing)
                {
                    self.handle_writable(pollfd.fd);
                }
            }
        }

        info!("stopped");
        Ok(())
    }

    fn state_of(&self, fd: RawFd) -> Option<ConnState> {
        self.connections.get(&fd).map(Connection::state)
    }

    /// Accept one pending client on a readable listener
    fn accept_client(&mut self, listener_fd: RawFd) {
        let Some(listener) = self.listeners.get(listener_fd) else {
            return;
        };

        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!(%peer, "cannot make client socket non-blocking: {e}");
                    return;
                }
                let fd = stream.as_raw_fd();
                debug!(fd, %peer, "client accepted");
                self.connections.insert(fd, Connection::new(stream));
            }
            // No pending connection is not an error
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }
    }

    fn handle_readable(&mut self, fd: RawFd) {
        let outcome = match self.connections.get_mut(&fd) {
            Some(conn) => conn.drive_read(),
            None => return,
        };

        match outcome {
            ReadOutcome::Incomplete => {}
            ReadOutcome::Closed => self.close_connection(fd),
            ReadOutcome::Complete(raw) => {
                let routed = router::route(&raw, &self.config, &self.proxies);
                if let Some(conn) = self.connections.get_mut(&fd) {
                    conn.begin_write(routed);
                }
            }
        }
    }

    fn handle_writable(&mut self, fd: RawFd) {
        // Build the response on the first writable event. This is where
        // the proxy forwarder runs, stalling the loop for at most its
        // bounded relay window.
        let built = match self.connections.get(&fd) {
            Some(conn) if conn.response.is_none() => conn
                .routed
                .as_ref()
                .map(|routed| response::respond(routed, &self.config)),
            _ => None,
        };
        if let Some(bytes) = built {
            if let Some(conn) = self.connections.get_mut(&fd) {
                conn.response = Some(bytes);
            }
        }

        let outcome = match self.connections.get_mut(&fd) {
            Some(conn) => conn.drive_write(),
            None => return,
        };

        match outcome {
            WriteOutcome::Pending => {}
            WriteOutcome::Done | WriteOutcome::Failed => self.close_connection(fd),
        }
    }

    /// Remove the table entry; dropping it closes the descriptor, and
    /// the next poll set is rebuilt without it.
    fn close_connection(&mut self, fd: RawFd) {
        if self.connections.remove(&fd).is_some() {
            debug!(fd, "connection closed");
        }
    }
}
