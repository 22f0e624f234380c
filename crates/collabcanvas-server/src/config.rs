//! Server configuration read from the environment.

use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";
/// Default number of frames queued per connection before new ones are
/// dropped.
pub const DEFAULT_OUTBOX_CAP: usize = 1024;

/// Invalid environment values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid COLLABCANVAS_ADDR {value:?}: {source}")]
    Addr {
        value: String,
        source: AddrParseError,
    },
    #[error("Invalid PORT {0:?}")]
    Port(String),
    #[error("Invalid COLLABCANVAS_OUTBOX_CAP {0:?}")]
    OutboxCap(String),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Frames queued per connection; a slow reader loses frames past this
    pub outbox_cap: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            outbox_cap: DEFAULT_OUTBOX_CAP,
        }
    }
}

impl ServerConfig {
    /// Read `COLLABCANVAS_ADDR`, `PORT` and `COLLABCANVAS_OUTBOX_CAP`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    ///
    /// `PORT` replaces only the port of the bind address.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("COLLABCANVAS_ADDR") {
            config.addr = value
                .trim()
                .parse()
                .map_err(|source| ConfigError::Addr { value, source })?;
        }

        if let Some(value) = lookup("PORT") {
            let port = value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Port(value))?;
            config.addr.set_port(port);
        }

        if let Some(value) = lookup("COLLABCANVAS_OUTBOX_CAP") {
            config.outbox_cap = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::OutboxCap(value)),
            };
        }

        Ok(config)
    }
}
