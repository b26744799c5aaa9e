//! Fan-out of encoded frames to every client of one transport.

use std::sync::Arc;

use tracing::{debug, error, warn};

use fastblocks_types::{BlockRecord, FlashEnvelope, Transport};

use crate::client_registry::ClientRegistry;
use crate::metrics::NodeMetrics;

/// Result of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients that accepted the frame.
    pub delivered: usize,
    /// Clients removed because the frame could not be queued.
    pub pruned: usize,
}

/// Server-sent event frame for a block: `data: <json>\n\n`.
pub fn encode_event_frame(block: &BlockRecord) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(block)?;
    Ok(format!("data: {json}\n\n"))
}

/// WebSocket text frame for a flashblock envelope.
pub fn encode_socket_frame(envelope: &FlashEnvelope) -> Result<String, serde_json::Error> {
    envelope.to_json()
}

/// Best-effort delivery to every registered client.
///
/// Delivery never waits on a client: a frame that cannot be queued
/// immediately (closed or full channel) gets that client unregistered.
#[derive(Clone)]
pub struct BroadcastRelay {
    registry: Arc<ClientRegistry>,
    metrics: Option<Arc<NodeMetrics>>,
}

impl BroadcastRelay {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Send `frame` once to every client of `transport` registered at call
    /// time.
    pub fn broadcast(&self, transport: Transport, frame: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        self.registry.for_each(transport, |handle| {
            match handle.try_deliver(frame.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(client = handle.id(), transport = %transport, error = %e, "dropping client");
                    self.registry.unregister(transport, handle.id());
                    report.pruned += 1;
                }
            }
        });
        if let Some(metrics) = &self.metrics {
            metrics.delivery_failures.inc_by(report.pruned as u64);
        }
        debug!(
            transport = %transport,
            delivered = report.delivered,
            pruned = report.pruned,
            "broadcast complete"
        );
        report
    }

    /// Deliver a full-node block to event-stream clients.
    pub fn broadcast_block(&self, block: &BlockRecord) -> BroadcastReport {
        match encode_event_frame(block) {
            Ok(frame) => {
                let report = self.broadcast(Transport::EventStream, &frame);
                if let Some(metrics) = &self.metrics {
                    metrics.blocks_broadcast.inc();
                }
                report
            }
            Err(e) => {
                error!(block_number = block.number(), error = %e, "failed to encode block");
                BroadcastReport::default()
            }
        }
    }

    /// Deliver a flashblock envelope to socket clients.
    pub fn broadcast_flash(&self, envelope: &FlashEnvelope) -> BroadcastReport {
        match encode_socket_frame(envelope) {
            Ok(frame) => {
                let report = self.broadcast(Transport::Socket, &frame);
                if let Some(metrics) = &self.metrics {
                    metrics.flashblocks_forwarded.inc();
                }
                report
            }
            Err(e) => {
                error!(block_number = %envelope.block_number(), error = %e, "failed to encode flashblock");
                BroadcastReport::default()
            }
        }
    }
}
