//! Fundamental types for the fastblocks relay.
//!
//! This crate defines the records that flow from the two upstream sources
//! to downstream clients: decoded full-node blocks, pass-through flashblock
//! envelopes, and the transport tag used to route them.

pub mod block;
pub mod error;
pub mod flash;
pub mod quantity;
pub mod transport;

pub use block::{BlockRecord, RawBlock};
pub use error::DecodeError;
pub use flash::{EnvelopeKind, FlashEnvelope};
pub use quantity::parse_quantity;
pub use transport::Transport;
