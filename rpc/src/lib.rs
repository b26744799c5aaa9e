//! Full-node JSON-RPC client.
//!
//! Provides:
//! - JSON-RPC 2.0 wire types
//! - The [`BlockFetcher`] seam the poller is written against
//! - A reqwest-backed [`HttpFullNodeClient`] with an explicit request timeout
//! - Classification of every non-happy response into [`RpcError`]

pub mod client;
pub mod error;
pub mod request;

pub use client::{parse_block_response, BlockFetcher, HttpFullNodeClient};
pub use error::RpcError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
