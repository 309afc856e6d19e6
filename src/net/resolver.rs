//! Upstream address resolution
//!
//! Every proxy location's target is resolved exactly once, at startup.
//! The resulting map is read-only for the rest of the run; a target
//! that does not resolve aborts startup so the server never runs with a
//! proxy route it cannot honor.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};

use tracing::debug;

use super::{Error, Result};
use crate::config::{Config, LocationKind};

/// Resolved upstream addresses keyed by `host:port`
pub type ProxyAddressMap = HashMap<String, SocketAddr>;

/// Resolve every proxy target in the configuration
pub fn resolve_proxy_targets(config: &Config) -> Result<ProxyAddressMap> {
    let mut map = ProxyAddressMap::new();

    for server in &config.servers {
        for location in &server.locations {
            if location.kind != LocationKind::Proxy {
                continue;
            }

            let key = location.upstream_key();
            if map.contains_key(&key) {
                continue;
            }

            let addr = key
                .to_socket_addrs()
                .map_err(|_| Error::Resolve(key.clone()))?
                .next()
                .ok_or_else(|| Error::Resolve(key.clone()))?;

            debug!(upstream = %key, %addr, "resolved proxy target");
            map.insert(key, addr);
        }
    }

    Ok(map)
}
