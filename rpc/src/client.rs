//! HTTP JSON-RPC client backed by `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastblocks_types::RawBlock;

use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Upper bound on TCP/TLS connect time; the overall request timeout still
/// applies on top.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of the latest full-node block.
///
/// The poller only talks to this trait, so tests can script responses
/// without a network (see `fastblocks-nullables`).
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Fetch the current chain head without transaction bodies.
    async fn latest_block(&self) -> Result<RawBlock, RpcError>;

    /// Endpoint description for log lines.
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: BlockFetcher + ?Sized> BlockFetcher for Arc<T> {
    async fn latest_block(&self) -> Result<RawBlock, RpcError> {
        (**self).latest_block().await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Full-node client issuing one `eth_getBlockByNumber` POST per call.
pub struct HttpFullNodeClient {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpFullNodeClient {
    /// Build a client for `url`. Each request is abandoned after
    /// `request_timeout`, independent of how often the caller polls.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout,
        })
    }

    fn classify(&self, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            RpcError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl BlockFetcher for HttpFullNodeClient {
    async fn latest_block(&self) -> Result<RawBlock, RpcError> {
        let request = JsonRpcRequest::latest_block();
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        tracing::trace!(status, bytes = body.len(), "full node responded");

        parse_block_response(status, &body)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Turn an HTTP status and body into a block or a classified error.
///
/// Checked in order: status, empty body, JSON shape, RPC `error` member,
/// missing `result`, and finally the block fields themselves.
pub fn parse_block_response(status: u16, body: &[u8]) -> Result<RawBlock, RpcError> {
    if status != 200 {
        return Err(RpcError::Status(status));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RpcError::EmptyBody);
    }

    let response: JsonRpcResponse = serde_json::from_slice(body)?;
    if let Some(err) = response.error {
        return Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    let result = response.result.ok_or(RpcError::MissingResult)?;
    Ok(serde_json::from_value(result)?)
}
