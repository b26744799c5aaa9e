//! Flashblock envelopes.
//!
//! Upstream flashblock messages are forwarded to socket clients untouched,
//! wrapped as `{"type":"flash","data":<payload>}`. The payload is kept as
//! raw JSON text so key order and formatting survive the round trip.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::DecodeError;

/// Tag written into the `type` field of every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Flash,
}

/// A flashblock payload wrapped for downstream delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlashEnvelope {
    #[serde(rename = "type")]
    kind: EnvelopeKind,
    data: Box<RawValue>,
    #[serde(skip)]
    block_number: Value,
}

impl FlashEnvelope {
    /// Decode one upstream message.
    ///
    /// The bytes must be a UTF-8 JSON object whose `metadata` object carries
    /// a non-null `block_number`; nothing else about the payload is
    /// inspected.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes)?;
        let data: Box<RawValue> = serde_json::from_str(text)?;
        let fields: Map<String, Value> = serde_json::from_str(data.get())?;
        let block_number = fields
            .get("metadata")
            .and_then(Value::as_object)
            .and_then(|metadata| metadata.get("block_number"))
            .filter(|n| !n.is_null())
            .cloned()
            .ok_or(DecodeError::MissingBlockNumber)?;

        Ok(Self {
            kind: EnvelopeKind::Flash,
            data,
            block_number,
        })
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// The payload exactly as received.
    pub fn payload(&self) -> &str {
        self.data.get()
    }

    /// `metadata.block_number` from the payload, for logging.
    pub fn block_number(&self) -> &Value {
        &self.block_number
    }

    /// JSON text sent to socket clients.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
