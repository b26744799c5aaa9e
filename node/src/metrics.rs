//! Prometheus metrics for the relay node.
//!
//! Covers both ingestion paths and the downstream fan-out. The
//! [`NodeMetrics`] struct owns a dedicated [`Registry`] that the ingress
//! `/metrics` route encodes into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

use fastblocks_types::Transport;

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Full-node blocks broadcast to event-stream clients.
    pub blocks_broadcast: IntCounter,
    /// Flashblock envelopes broadcast to socket clients.
    pub flashblocks_forwarded: IntCounter,
    /// Polls that ended in a transport, status, or decode error.
    pub poll_failures: IntCounter,
    /// Upstream reconnect attempts scheduled.
    pub upstream_reconnects: IntCounter,
    /// Clients pruned after a failed delivery.
    pub delivery_failures: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Currently registered event-stream clients.
    pub sse_clients: IntGauge,
    /// Currently registered socket clients.
    pub socket_clients: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let blocks_broadcast = register_int_counter_with_registry!(
            Opts::new(
                "fastblocks_blocks_broadcast_total",
                "Full-node blocks broadcast to event-stream clients"
            ),
            registry
        )?;

        let flashblocks_forwarded = register_int_counter_with_registry!(
            Opts::new(
                "fastblocks_flashblocks_forwarded_total",
                "Flashblocks forwarded to socket clients"
            ),
            registry
        )?;

        let poll_failures = register_int_counter_with_registry!(
            Opts::new("fastblocks_poll_failures_total", "Failed full-node polls"),
            registry
        )?;

        let upstream_reconnects = register_int_counter_with_registry!(
            Opts::new(
                "fastblocks_upstream_reconnects_total",
                "Reconnect attempts to the flashblocks upstream"
            ),
            registry
        )?;

        let delivery_failures = register_int_counter_with_registry!(
            Opts::new(
                "fastblocks_delivery_failures_total",
                "Clients removed after a failed delivery"
            ),
            registry
        )?;

        let sse_clients = register_int_gauge_with_registry!(
            Opts::new("fastblocks_sse_clients", "Connected event-stream clients"),
            registry
        )?;

        let socket_clients = register_int_gauge_with_registry!(
            Opts::new("fastblocks_socket_clients", "Connected WebSocket clients"),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_broadcast,
            flashblocks_forwarded,
            poll_failures,
            upstream_reconnects,
            delivery_failures,
            sse_clients,
            socket_clients,
        })
    }

    /// The connected-clients gauge for `transport`.
    pub fn clients(&self, transport: Transport) -> &IntGauge {
        match transport {
            Transport::EventStream => &self.sse_clients,
            Transport::Socket => &self.socket_clients,
        }
    }

    /// Encode every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
