//! Relay configuration with TOML file support.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Configuration for a relay node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the HTTP/SSE/WebSocket ingress listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// HTML page served on `GET /`.
    #[serde(default = "default_asset_path")]
    pub asset_path: PathBuf,

    /// JSON-RPC endpoint of the full node.
    #[serde(default = "default_full_node_url")]
    pub full_node_url: String,

    /// Milliseconds between full-node polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout for full-node polls, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// WebSocket URL of the flashblocks feed.
    #[serde(default = "default_flashblocks_url")]
    pub flashblocks_url: String,

    /// Fixed delay before reconnecting to the flashblocks feed.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Outbound frames buffered per client before it is considered stalled.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,

    /// How long one WebSocket write to a client may take before the client
    /// is dropped, in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Whether to serve Prometheus metrics on `/metrics`.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Headers sent with every upstream WebSocket handshake. Kept last so
    /// the TOML table follows the plain keys.
    #[serde(default = "fastblocks_websocket::default_upstream_headers")]
    pub upstream_headers: BTreeMap<String, String>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_asset_path() -> PathBuf {
    PathBuf::from("static/fastblocks.html")
}

fn default_full_node_url() -> String {
    "https://sepolia.base.org".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_flashblocks_url() -> String {
    "wss://sepolia.flashblocks.base.org/ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_client_buffer() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.poll_interval_ms == 0 {
            return Err(NodeError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(NodeError::Config("request_timeout_ms must be > 0".into()));
        }
        if self.client_buffer == 0 {
            return Err(NodeError::Config("client_buffer must be > 0".into()));
        }
        if self.send_timeout_ms == 0 {
            return Err(NodeError::Config("send_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            asset_path: default_asset_path(),
            full_node_url: default_full_node_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            flashblocks_url: default_flashblocks_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            client_buffer: default_client_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
            enable_metrics: false,
            log_format: default_log_format(),
            log_level: default_log_level(),
            upstream_headers: fastblocks_websocket::default_upstream_headers(),
        }
    }
}
