//! Listening sockets
//!
//! One bound, non-blocking listener per distinct configured port. The
//! sockets are created through socket2 so SO_REUSEADDR and the backlog
//! can be set before listening, then converted into `std` listeners
//! owned by the set for the life of the process.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};

use super::{Error, Result};
use crate::config::Config;

const BACKLOG: i32 = 1024;

/// The set of listening sockets, one per configured port
#[derive(Debug)]
pub struct ListenerSet {
    listeners: Vec<(u16, TcpListener)>,
}

impl ListenerSet {
    /// Bind a non-blocking listener for every distinct port in the
    /// configuration. Any bind or listen failure aborts startup.
    pub fn bind(config: &Config) -> Result<Self> {
        let mut listeners: Vec<(u16, TcpListener)> = Vec::new();

        for server in &config.servers {
            if listeners.iter().any(|(port, _)| *port == server.port) {
                continue;
            }
            let listener = bind_port(server.port)?;
            listeners.push((server.port, listener));
        }

        Ok(ListenerSet { listeners })
    }

    /// All bound ports
    pub fn ports(&self) -> Vec<u16> {
        self.listeners.iter().map(|(port, _)| *port).collect()
    }

    /// True if `fd` belongs to one of the listeners
    pub fn contains(&self, fd: RawFd) -> bool {
        self.listeners.iter().any(|(_, l)| l.as_raw_fd() == fd)
    }

    /// The listener with the given descriptor, if any
    pub fn get(&self, fd: RawFd) -> Option<&TcpListener> {
        self.listeners
            .iter()
            .find(|(_, l)| l.as_raw_fd() == fd)
            .map(|(_, l)| l)
    }

    /// Iterate over the listeners
    pub fn iter(&self) -> impl Iterator<Item = &TcpListener> {
        self.listeners.iter().map(|(_, l)| l)
    }

    /// Number of listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True if no listener is bound
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

fn bind_port(port: u16) -> Result<TcpListener> {
    let wrap = |source: std::io::Error| Error::Bind { port, source };

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(wrap)?;
    socket.set_reuse_address(true).map_err(wrap)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&SockAddr::from(addr)).map_err(wrap)?;
    socket.listen(BACKLOG).map_err(wrap)?;
    socket.set_nonblocking(true).map_err(wrap)?;

    Ok(socket.into())
}
