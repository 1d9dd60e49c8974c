//! Configuration for mapview-sync
//!
//! Loads settings from a TOML file. Every field has a default, so an empty
//! file (or no file at all) yields a working localhost setup.
//!
//! ```toml
//! enabled = true
//!
//! [server]
//! address = "127.0.0.1"
//! port = 8473
//!
//! [client]
//! address = "127.0.0.1"
//! port = 8474
//!
//! [save]
//! path = "saves/mapview/persistent.sfs"
//!
//! [timing]
//! reconnect_backoff_ms = 500
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Master switch. When false the server refuses to start.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub server: EndpointConfig,
    #[serde(default = "default_client_endpoint")]
    pub client: EndpointConfig,
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A host name (or IP) and port
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// Where received saves go
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SaveConfig {
    /// Destination of received save blobs (client side)
    #[serde(default = "default_save_path")]
    pub path: PathBuf,
    /// Largest save frame accepted from the network
    #[serde(default = "default_max_save_bytes")]
    pub max_bytes: usize,
}

/// Intervals and timeouts, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Sleep between reconnect attempts of the save worker
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
    /// Sleep after a socket-level UDP fault
    #[serde(default = "default_udp_fault_backoff")]
    pub udp_fault_backoff_ms: u64,
    /// Idle interval between ConnectionTest bytes on the save channel
    #[serde(default = "default_keepalive")]
    pub keepalive_ms: u64,
    /// Read timeout on the save channel (client side)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Connect timeout on the save channel (client side)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Delay between a save sync request and the snapshot
    #[serde(default = "default_save_sync_delay")]
    pub save_sync_delay_ms: u64,
    /// Host ticks per second for the bundled simulator
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error). RUST_LOG wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl EndpointConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Resolve to the first matching socket address.
    pub fn resolve(&self) -> Result<SocketAddr> {
        let unresolved = || Error::Resolve {
            host: self.address.clone(),
            port: self.port,
        };
        (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| unresolved())?
            .next()
            .ok_or_else(unresolved)
    }
}

impl TimingConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn udp_fault_backoff(&self) -> Duration {
        Duration::from_millis(self.udp_fault_backoff_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn save_sync_delay(&self) -> Duration {
        Duration::from_millis(self.save_sync_delay_ms)
    }

    /// Host tick period derived from `tick_hz` (never shorter than 1 ms)
    pub fn tick_period(&self) -> Duration {
        let hz = if self.tick_hz.is_finite() && self.tick_hz > 0.0 {
            self.tick_hz
        } else {
            default_tick_hz()
        };
        Duration::from_micros((1_000_000.0 / hz) as u64).max(Duration::from_millis(1))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            server: EndpointConfig::default(),
            client: default_client_endpoint(),
            save: SaveConfig::default(),
            timing: TimingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_server_port(),
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            path: default_save_path(),
            max_bytes: default_max_save_bytes(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: default_reconnect_backoff(),
            udp_fault_backoff_ms: default_udp_fault_backoff(),
            keepalive_ms: default_keepalive(),
            read_timeout_ms: default_read_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            save_sync_delay_ms: default_save_sync_delay(),
            tick_hz: default_tick_hz(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_enabled() -> bool {
    true
}
fn default_address() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    8473
}
fn default_client_endpoint() -> EndpointConfig {
    EndpointConfig {
        address: default_address(),
        port: 8474,
    }
}
fn default_save_path() -> PathBuf {
    PathBuf::from("saves/mapview/persistent.sfs")
}
fn default_max_save_bytes() -> usize {
    256 * 1024 * 1024
}
fn default_reconnect_backoff() -> u64 {
    500
}
fn default_udp_fault_backoff() -> u64 {
    100
}
fn default_keepalive() -> u64 {
    1000
}
fn default_read_timeout() -> u64 {
    5000
}
fn default_connect_timeout() -> u64 {
    2000
}
fn default_save_sync_delay() -> u64 {
    2000
}
fn default_tick_hz() -> f32 {
    20.0
}
fn default_log_level() -> String {
    "info".to_string()
}
