//! Full-node block records.
//!
//! [`RawBlock`] mirrors the `result` object of `eth_getBlockByNumber` with
//! its hex-string quantities untouched. [`BlockRecord`] is the decoded form
//! sent to event-stream clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quantity::parse_quantity;
use crate::DecodeError;

/// Milliseconds per second, for the `timestamp` -> `timestampMs` conversion.
const MS_PER_SEC: u64 = 1_000;

/// Undecoded block header as returned by the full node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub gas_used: String,
    pub gas_limit: String,
    /// Transaction hashes (or objects when full bodies are requested).
    /// Only the count is used.
    #[serde(default)]
    pub transactions: Vec<Value>,
}

impl RawBlock {
    /// Decode every hex field into a [`BlockRecord`].
    pub fn decode(&self) -> Result<BlockRecord, DecodeError> {
        let timestamp_secs = parse_quantity("timestamp", &self.timestamp)?;
        let timestamp_ms = timestamp_secs
            .checked_mul(MS_PER_SEC)
            .ok_or(DecodeError::Overflow { field: "timestamp" })?;
        let transaction_count = u32::try_from(self.transactions.len())
            .map_err(|_| DecodeError::Overflow { field: "transactions" })?;

        Ok(BlockRecord {
            number: parse_quantity("number", &self.number)?,
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
            timestamp_ms,
            gas_used: parse_quantity("gasUsed", &self.gas_used)?,
            gas_limit: parse_quantity("gasLimit", &self.gas_limit)?,
            transaction_count,
        })
    }
}

/// A decoded full-node block, immutable once built.
///
/// Serializes as
/// `{"number":..,"hash":..,"parentHash":..,"timestampMs":..,"gasUsed":..,"gasLimit":..,"transactionCount":..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    number: u64,
    hash: String,
    parent_hash: String,
    timestamp_ms: u64,
    gas_used: u64,
    gas_limit: u64,
    transaction_count: u32,
}

impl BlockRecord {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn parent_hash(&self) -> &str {
        &self.parent_hash
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn transaction_count(&self) -> u32 {
        self.transaction_count
    }
}

impl TryFrom<&RawBlock> for BlockRecord {
    type Error = DecodeError;

    fn try_from(raw: &RawBlock) -> Result<Self, Self::Error> {
        raw.decode()
    }
}
