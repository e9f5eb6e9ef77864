//! # Server Configuration
//!
//! [`ServerConfig`] holds everything the acceptor, workers and protocol
//! service need. Values come from, in increasing priority:
//!
//! 1. built-in defaults,
//! 2. a YAML file ([`ServerConfig::from_yaml_file`]),
//! 3. environment variables ([`ServerConfig::apply_env`]),
//! 4. explicit [`ServerBuilder`](crate::ServerBuilder) setters.
//!
//! ## YAML
//!
//! Either flat or nested under `http:`:
//!
//! ```yaml
//! http:
//!   port: 9090
//!   bind_address: 127.0.0.1
//!   timeout_secs: 5
//!   keep_alive: true
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PORTICO_PORT` | `port` |
//! | `PORTICO_BIND` | `bind_address` |
//! | `PORTICO_TIMEOUT_SECS` | `timeout_secs` |
//! | `PORTICO_BACKLOG` | `backlog` |
//! | `PORTICO_KEEP_ALIVE` | `keep_alive` |
//! | `PORTICO_MAX_BODY_BYTES` | `max_body_bytes` |
//!
//! Malformed values are ignored with a warning.

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use tracing::warn;

/// Listening socket, connection and protocol limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_address: IpAddr,
    /// Socket read/write timeout; 0 disables it
    pub timeout_secs: u64,
    pub backlog: i32,
    /// Bytes read from the socket per call
    pub buffer_size: usize,
    pub keep_alive: bool,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    /// How long `stop()` waits for the acceptor to close its socket
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            timeout_secs: 10,
            backlog: 1024,
            buffer_size: 8192,
            keep_alive: true,
            max_header_bytes: 64 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            shutdown_grace_ms: 3000,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Nested { http: ServerConfig },
    Flat(ServerConfig),
}

impl ServerConfig {
    /// Load from YAML, flat or nested under `http:`
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(text)?;
        Ok(match file {
            ConfigFile::Nested { http } => http,
            ConfigFile::Flat(config) => config,
        })
    }

    /// Overlay `PORTICO_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup (same keys as [`apply_env`](Self::apply_env))
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        overlay(&lookup, "PORTICO_PORT", &mut self.port);
        overlay(&lookup, "PORTICO_BIND", &mut self.bind_address);
        overlay(&lookup, "PORTICO_TIMEOUT_SECS", &mut self.timeout_secs);
        overlay(&lookup, "PORTICO_BACKLOG", &mut self.backlog);
        overlay(&lookup, "PORTICO_KEEP_ALIVE", &mut self.keep_alive);
        overlay(&lookup, "PORTICO_MAX_BODY_BYTES", &mut self.max_body_bytes);
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn overlay<T, F>(lookup: &F, key: &str, field: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *field = value,
        Err(_) => warn!(key, value = %raw, "Ignoring malformed configuration value"),
    }
}
