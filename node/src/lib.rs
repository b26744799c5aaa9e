//! fastblocks relay node: fuses two block sources and fans them out.
//!
//! The node:
//! - Polls a full node for the latest block and streams new ones over SSE
//! - Subscribes to a flashblocks WebSocket feed and forwards every message
//!   to WebSocket clients
//! - Serves the viewer page, `/events`, the socket upgrade and `/metrics`
//!   from one listener

pub mod client_registry;
pub mod config;
pub mod error;
pub mod ingress;
pub mod metrics;
pub mod node;
pub mod poller;
pub mod relay;
pub mod shutdown;

pub use client_registry::{ClientHandle, ClientId, ClientRegistry, DeliveryError, Registration};
pub use config::NodeConfig;
pub use error::NodeError;
pub use ingress::{IngressServer, SocketWriteError, DEFAULT_SEND_TIMEOUT};
pub use metrics::NodeMetrics;
pub use node::RelayNode;
pub use poller::{FullNodePoller, PollOutcome};
pub use relay::{encode_event_frame, encode_socket_frame, BroadcastReport, BroadcastRelay};
pub use shutdown::ShutdownController;
