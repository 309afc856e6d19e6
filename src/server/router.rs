//! Request routing and validation
//!
//! Matches a parsed request to a virtual server (exact `name:port`
//! match against the Host header) and to the location with the longest
//! matching URI prefix, then validates method, path, protocol and
//! headers. The routed request refers to its server and location by
//! index into the immutable configuration, never by reference.
//!
//! Validation runs every check and each failure overwrites the error
//! field, so when several checks fail the last one executed is the one
//! reported. This last-wins ordering is deliberate and pinned by tests.

use bytes::Bytes;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::debug;

use crate::config::{Config, Location, LocationKind, ServerConfig};
use crate::http::{parse_request, Request, Status};
use crate::net::ProxyAddressMap;

/// Per-request validation failures, recorded rather than raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    BadRequest,
    InvalidMethod,
    NotFound,
    VersionNotSupported,
}

impl RequestError {
    /// The HTTP status this failure is rendered as
    pub fn status(self) -> Status {
        match self {
            RequestError::BadRequest => Status::BAD_REQUEST,
            RequestError::InvalidMethod => Status::METHOD_NOT_ALLOWED,
            RequestError::NotFound => Status::NOT_FOUND,
            RequestError::VersionNotSupported => Status::VERSION_NOT_SUPPORTED,
        }
    }
}

/// A request with its routing result attached
///
/// `server_idx` and `location_idx` are set together or not at all.
#[derive(Debug)]
pub struct RoutedRequest {
    /// Raw request bytes, kept for proxy forwarding
    pub raw: Bytes,
    /// Parsed request; `None` only when the buffer was structurally
    /// malformed (error is `BadRequest` in that case)
    pub request: Option<Request>,
    pub server_idx: Option<usize>,
    pub location_idx: Option<usize>,
    /// Resolved upstream address for proxy locations
    pub proxy_addr: Option<SocketAddr>,
    /// Resolved local filesystem target after index probing
    pub target_path: Option<PathBuf>,
    pub error: Option<RequestError>,
}

impl RoutedRequest {
    fn unrouted(raw: Bytes, request: Option<Request>, error: RequestError) -> Self {
        RoutedRequest {
            raw,
            request,
            server_idx: None,
            location_idx: None,
            proxy_addr: None,
            target_path: None,
            error: Some(error),
        }
    }

    /// The matched server, if routing succeeded
    pub fn server<'a>(&self, config: &'a Config) -> Option<&'a ServerConfig> {
        config.servers.get(self.server_idx?)
    }

    /// The matched location, if routing succeeded
    pub fn location<'a>(&self, config: &'a Config) -> Option<&'a Location> {
        self.server(config)?.locations.get(self.location_idx?)
    }
}

/// Route a complete request buffer against the configuration
///
/// Pure with respect to its inputs: the same buffer, configuration and
/// proxy map always produce the same routing result.
pub fn route(raw: &Bytes, config: &Config, proxies: &ProxyAddressMap) -> RoutedRequest {
    let request = match parse_request(raw) {
        Ok(request) => request,
        Err(e) => {
            debug!("unparseable request: {e}");
            return RoutedRequest::unrouted(raw.clone(), None, RequestError::BadRequest);
        }
    };

    let Some(server_idx) = match_server(&request, config) else {
        debug!(host = ?request.host(), "no virtual server matches");
        return RoutedRequest::unrouted(raw.clone(), Some(request), RequestError::NotFound);
    };
    let server = &config.servers[server_idx];

    let Some(location_idx) = match_location(&request.uri, server) else {
        debug!(uri = %request.uri, "no location matches");
        return RoutedRequest::unrouted(raw.clone(), Some(request), RequestError::NotFound);
    };
    let location = &server.locations[location_idx];

    let mut routed = RoutedRequest {
        raw: raw.clone(),
        request: None,
        server_idx: Some(server_idx),
        location_idx: Some(location_idx),
        proxy_addr: None,
        target_path: None,
        error: None,
    };

    if location.kind == LocationKind::Proxy {
        // Proxy correctness is the forwarder's concern; no local checks
        routed.proxy_addr = proxies.get(&location.upstream_key()).copied();
    } else {
        let (target_path, error) = validate(&request, location);
        routed.target_path = target_path;
        routed.error = error;
    }

    debug!(
        uri = %request.uri,
        location = %location.uri,
        error = ?routed.error,
        "request routed"
    );
    routed.request = Some(request);
    routed
}

/// First configured server whose `name:port` equals the Host header
fn match_server(request: &Request, config: &Config) -> Option<usize> {
    let host = request.host()?;
    if host.is_empty() {
        return None;
    }
    config
        .servers
        .iter()
        .position(|server| server.matches_host(host))
}

/// Location with the longest prefix of `uri`; earliest wins a tie
fn match_location(uri: &str, server: &ServerConfig) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, location) in server.locations.iter().enumerate() {
        if !uri.starts_with(&location.uri) {
            continue;
        }
        match best {
            Some(b) if server.locations[b].uri.len() >= location.uri.len() => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Run every validation check; each failure overwrites the error
fn validate(request: &Request, location: &Location) -> (Option<PathBuf>, Option<RequestError>) {
    let mut error = None;
    let mut target_path = None;

    if !location.methods.allows(&request.method) {
        error = Some(RequestError::InvalidMethod);
    }

    if location.kind != LocationKind::Cgi {
        match resolve_path(location, &request.uri) {
            Some(path) => target_path = Some(path),
            None => error = Some(RequestError::NotFound),
        }
    }

    if request.version != "HTTP/1.1" {
        error = Some(RequestError::VersionNotSupported);
    }

    if !request.headers.contains("Host") {
        error = Some(RequestError::BadRequest);
    }

    (target_path, error)
}

/// Resolve the request URI to an existing filesystem path
///
/// Strips the matched prefix, joins per the location kind (alias keeps
/// only the remainder under its target; root re-appends the location
/// prefix under its root), then handles directories: autoindex accepts
/// the directory itself, otherwise the configured index files are
/// probed in order.
fn resolve_path(location: &Location, uri: &str) -> Option<PathBuf> {
    let mut remainder = uri
        .strip_prefix(location.uri.as_str())
        .unwrap_or(uri)
        .to_string();
    if !remainder.starts_with('/') {
        remainder.insert(0, '/');
    }

    let joined = match location.kind {
        LocationKind::Alias => format!("{}{}", location.target, remainder),
        _ => format!("{}{}{}", location.root.display(), location.uri, remainder),
    };
    let mut full = std::path::absolute(&joined).ok()?;

    if full.is_dir() && !location.autoindex {
        full = location
            .index
            .iter()
            .map(|index| full.join(index))
            .find(|candidate| candidate.exists())?;
    }

    if full.exists() {
        Some(full)
    } else {
        None
    }
}
