//! Server configuration
//!
//! The configuration is loaded once at startup from a TOML file and is
//! immutable for the lifetime of the process. Everything downstream
//! (router, response writer) refers to it by index, never by owning a
//! copy.
//!
//! ```toml
//! [[server]]
//! port = 8080
//! server_names = ["example.com"]
//!
//! [[server.location]]
//! uri = "/"
//! kind = "root"
//! root = "/var/www"
//! index = ["index.html"]
//!
//! [[server.location]]
//! uri = "/api"
//! kind = "proxy"
//! target = "backend:9000"
//! ```

pub mod model;

pub use model::{Config, Location, LocationKind, Methods, ServerConfig};

use std::path::Path;

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors; all of them are startup-fatal
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Invalid("no servers configured".to_string()));
        }

        for server in &self.servers {
            if server.server_names.is_empty() {
                return Err(Error::Invalid(format!(
                    "server on port {} has no server_names",
                    server.port
                )));
            }

            for location in &server.locations {
                if !location.uri.starts_with('/') {
                    return Err(Error::Invalid(format!(
                        "location prefix {:?} must start with '/'",
                        location.uri
                    )));
                }

                match location.kind {
                    LocationKind::Root => {
                        if location.root.as_os_str().is_empty() {
                            return Err(Error::Invalid(format!(
                                "root location {:?} has no root path",
                                location.uri
                            )));
                        }
                    }
                    LocationKind::Alias | LocationKind::Proxy => {
                        if location.target.is_empty() {
                            return Err(Error::Invalid(format!(
                                "{:?} location {:?} has no target",
                                location.kind, location.uri
                            )));
                        }
                    }
                    LocationKind::Cgi => {}
                }

                if location.kind == LocationKind::Proxy {
                    if let Some((_, port)) = location.target.split_once(':') {
                        port.parse::<u16>().map_err(|_| {
                            Error::Invalid(format!(
                                "proxy target {:?} has an invalid port",
                                location.target
                            ))
                        })?;
                    }
                }
            }
        }

        Ok(())
    }
}
