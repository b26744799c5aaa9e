//! RPC error types.

use thiserror::Error;

/// Why a poll of the full node produced no block.
///
/// Every variant is recoverable: the poller logs it and tries again on the
/// next tick.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("response carries no result")]
    MissingResult,

    #[error("malformed block: {0}")]
    Block(#[from] fastblocks_types::DecodeError),
}

impl RpcError {
    /// Short label used as a log field and metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Timeout { .. } => "timeout",
            RpcError::Http(_) => "http",
            RpcError::Status(_) => "status",
            RpcError::EmptyBody => "empty_body",
            RpcError::Decode(_) => "decode",
            RpcError::Rpc { .. } => "rpc",
            RpcError::MissingResult => "missing_result",
            RpcError::Block(_) => "block",
        }
    }
}
