//! Decoding errors for upstream payloads.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid hex quantity for {field}: {value:?}")]
    InvalidQuantity { field: &'static str, value: String },

    #[error("{field} overflows its target width")]
    Overflow { field: &'static str },

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has no metadata.block_number")]
    MissingBlockNumber,
}
