//! Upstream flashblocks feed.
//!
//! Holds one persistent WebSocket connection to the flashblocks endpoint,
//! wraps every inbound message in a [`FlashEnvelope`](fastblocks_types::FlashEnvelope)
//! and hands it to a caller-supplied handler. Disconnects are followed by a
//! reconnect after a fixed delay, forever.

pub mod connector;
pub mod error;
pub mod reconnect;
pub mod subscriber;

pub use connector::{default_upstream_headers, TungsteniteConnector, UpstreamConnector, UpstreamStream};
pub use error::UpstreamError;
pub use reconnect::{ReconnectHook, ReconnectPolicy};
pub use subscriber::{FlashblocksSubscriber, SubscriberStats};
pub use tokio_tungstenite::tungstenite::Message;
