//! Upstream connection errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid upstream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}
