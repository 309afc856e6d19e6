//! Configuration model
//!
//! One `ServerConfig` per virtual server; each carries an ordered list
//! of locations used for longest-prefix matching. The model is plain
//! data; loading and validation live in the parent module.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::http::Method;

/// Complete server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Virtual servers in configuration order
    #[serde(rename = "server", default)]
    pub servers: Vec<ServerConfig>,
}

/// One virtual server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub server_names: Vec<String>,
    #[serde(rename = "location", default)]
    pub locations: Vec<Location>,
    /// Status code (string key, TOML keys are strings) to error page file
    #[serde(default)]
    pub error_pages: BTreeMap<String, PathBuf>,
}

impl ServerConfig {
    /// True if the trimmed Host header value names this server.
    ///
    /// The match is exact against `name:port` for each configured name;
    /// there is no wildcard matching.
    pub fn matches_host(&self, host: &str) -> bool {
        self.server_names
            .iter()
            .any(|name| host == format!("{}:{}", name, self.port))
    }

    /// Configured error page for a status code, if any
    pub fn error_page(&self, code: u16) -> Option<&Path> {
        self.error_pages.get(&code.to_string()).map(PathBuf::as_path)
    }
}

/// How requests under a URI prefix are served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Root,
    Alias,
    Proxy,
    Cgi,
}

/// One location rule within a virtual server
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    /// URI prefix, always starting with `/`
    pub uri: String,
    pub kind: LocationKind,
    /// Filesystem root for `root` locations
    #[serde(default)]
    pub root: PathBuf,
    /// Alias directory, or upstream `host[:port]` for proxy locations
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub methods: Methods,
    #[serde(default)]
    pub autoindex: bool,
    /// Index filenames probed in order for directory requests
    #[serde(default)]
    pub index: Vec<String>,
}

impl Location {
    /// Upstream lookup key of the form `host:port`, defaulting to port 80
    pub fn upstream_key(&self) -> String {
        if self.target.contains(':') {
            self.target.clone()
        } else {
            format!("{}:80", self.target)
        }
    }
}

/// Per-method allow flags for a location
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Methods {
    pub get: bool,
    pub post: bool,
    pub delete: bool,
}

impl Default for Methods {
    fn default() -> Self {
        Methods {
            get: true,
            post: false,
            delete: false,
        }
    }
}

impl Methods {
    /// Whether a request method is allowed; HEAD rides on the GET flag
    pub fn allows(&self, method: &Method) -> bool {
        match method {
            Method::Get | Method::Head => self.get,
            Method::Post => self.post,
            Method::Delete => self.delete,
            _ => false,
        }
    }
}
