//! Configuration for ringbid components
//!
//! Values are layered: a TOML file (path from `RINGBID_CONFIG`, default
//! `ringbid.toml`, optional), then `RINGBID__*` environment variables.
//! Binaries apply their CLI flags on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "RINGBID_CONFIG";

/// Config file used when `RINGBID_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "ringbid.toml";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node ID (unique identifier)
    pub node_id: String,

    /// Replica-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica: Option<ReplicaConfig>,

    /// Client-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    /// Logging level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "replica-1".to_string(),
            replica: None,
            client: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from the file named by `RINGBID_CONFIG` plus the environment
    pub fn load() -> crate::Result<Self> {
        let path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(path)
    }

    /// Load from an explicit file (missing file is not an error)
    pub fn load_from(path: impl AsRef<Path>) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("RINGBID").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Replica configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Bind address for the RPC surface
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Ring successor (base URL, e.g. `http://127.0.0.1:5401`)
    #[serde(default)]
    pub successor: String,

    /// Ring predecessor (base URL)
    #[serde(default)]
    pub predecessor: String,

    /// Absolute auction deadline
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,

    /// Timeout applied to every outbound peer call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// How long a replica holds the token before forwarding it
    #[serde(default = "default_hold_interval")]
    pub hold_interval_ms: u64,

    /// Token silence before the watchdog originates a new generation.
    ///
    /// A full lap takes about `ring_size * hold_interval_ms`; anything
    /// shorter regenerates the token on every lap.
    #[serde(default = "default_token_timeout")]
    pub token_timeout_ms: u64,

    /// Number of replicas on the ring, when known; enables the lap check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_size: Option<usize>,

    /// Originate the first token generation at startup
    #[serde(default)]
    pub initial_token: bool,

    /// Request body limit for the RPC surface
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5400))
}
fn default_call_timeout() -> u64 {
    2_000
}
fn default_hold_interval() -> u64 {
    500
}
fn default_token_timeout() -> u64 {
    5_000
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            successor: String::new(),
            predecessor: String::new(),
            deadline: None,
            call_timeout_ms: default_call_timeout(),
            hold_interval_ms: default_hold_interval(),
            token_timeout_ms: default_token_timeout(),
            ring_size: None,
            initial_token: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ReplicaConfig {
    /// Reject configurations the replica cannot start with
    pub fn validate(&self) -> crate::Result<()> {
        if self.successor.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "missing ring successor address".into(),
            ));
        }
        if self.predecessor.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "missing ring predecessor address".into(),
            ));
        }
        if self.deadline.is_none() {
            return Err(crate::Error::InvalidConfig("missing auction deadline".into()));
        }
        if self.call_timeout_ms == 0 || self.hold_interval_ms == 0 || self.token_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "timeouts and intervals must be non-zero".into(),
            ));
        }
        if self.token_timeout_ms <= self.hold_interval_ms {
            return Err(crate::Error::InvalidConfig(format!(
                "token timeout ({}ms) must exceed the hold interval ({}ms)",
                self.token_timeout_ms, self.hold_interval_ms
            )));
        }
        if let Some(ring_size) = self.ring_size {
            if ring_size == 0 {
                return Err(crate::Error::InvalidConfig("ring size must be non-zero".into()));
            }
            let lap_ms = (ring_size as u64).saturating_mul(self.hold_interval_ms);
            if self.token_timeout_ms <= lap_ms {
                return Err(crate::Error::InvalidConfig(format!(
                    "token timeout ({}ms) must exceed one lap of the ring ({} replicas x {}ms hold)",
                    self.token_timeout_ms, ring_size, self.hold_interval_ms
                )));
            }
        }
        Ok(())
    }

    pub fn deadline(&self) -> crate::Result<DateTime<Utc>> {
        self.deadline
            .ok_or_else(|| crate::Error::InvalidConfig("missing auction deadline".into()))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn hold_interval(&self) -> Duration {
        Duration::from_millis(self.hold_interval_ms)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_millis(self.token_timeout_ms)
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Replica base URLs in priority order (first = highest)
    #[serde(default)]
    pub replicas: Vec<String>,

    /// Timeout applied to every call to a replica
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Display name used when bidding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            replicas: Vec::new(),
            call_timeout_ms: default_call_timeout(),
            client_name: None,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.replicas.is_empty() {
            return Err(crate::Error::InvalidConfig("no replicas configured".into()));
        }
        if self.replicas.iter().any(|r| r.trim().is_empty()) {
            return Err(crate::Error::InvalidConfig("empty replica address".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig("call timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
