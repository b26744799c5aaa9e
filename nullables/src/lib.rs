//! Nullable infrastructure for deterministic testing.
//!
//! Both upstreams of the relay sit behind traits (`BlockFetcher`,
//! `UpstreamConnector`). This crate provides scripted implementations that:
//! - Return pre-programmed responses in order
//! - Record how and when they were called
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod full_node;
pub mod upstream;

pub use full_node::NullFullNode;
pub use upstream::{NullUpstream, ScriptedSession};
