//! Nullable full node: scripted `eth_getBlockByNumber` answers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fastblocks_rpc::{parse_block_response, BlockFetcher, RpcError};
use fastblocks_types::RawBlock;

/// A full node that replays queued responses, one per call.
///
/// Once the queue is empty every call fails with [`RpcError::EmptyBody`].
pub struct NullFullNode {
    responses: Mutex<VecDeque<Result<RawBlock, RpcError>>>,
    calls: AtomicU64,
    latency: Duration,
    /// Per-call latencies, consumed in call order before `latency` applies.
    call_latencies: Mutex<VecDeque<Duration>>,
}

impl NullFullNode {
    pub fn new(responses: impl IntoIterator<Item = Result<RawBlock, RpcError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: AtomicU64::new(0),
            latency: Duration::ZERO,
            call_latencies: Mutex::new(VecDeque::new()),
        }
    }

    /// Script raw HTTP answers; each is classified exactly like a real
    /// response would be.
    pub fn from_http<'a>(answers: impl IntoIterator<Item = (u16, &'a str)>) -> Self {
        Self::new(
            answers
                .into_iter()
                .map(|(status, body)| parse_block_response(status, body.as_bytes())),
        )
    }

    /// Delay every answer by `latency` (simulates a slow node).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay the n-th call by the n-th latency. Calls past the end fall
    /// back to [`with_latency`](Self::with_latency). Lets tests make an
    /// earlier request answer after a later one.
    pub fn with_call_latencies(self, latencies: impl IntoIterator<Item = Duration>) -> Self {
        *self.call_latencies.lock().unwrap() = latencies.into_iter().collect();
        self
    }

    /// Queue one more response.
    pub fn push(&self, response: Result<RawBlock, RpcError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Number of `latest_block` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// A well-formed block with the given raw `number`; other fields are
    /// fixed so tests only vary what they care about.
    pub fn block(number: &str) -> RawBlock {
        RawBlock {
            number: number.to_string(),
            hash: format!("0xhash{}", number.trim_start_matches("0x")),
            parent_hash: "0x00".to_string(),
            timestamp: "0x5".to_string(),
            gas_used: "0x10".to_string(),
            gas_limit: "0x20".to_string(),
            transactions: vec![serde_json::json!(1), serde_json::json!(2)],
        }
    }
}

#[async_trait]
impl BlockFetcher for NullFullNode {
    async fn latest_block(&self) -> Result<RawBlock, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // The answer is fixed when the request is made, like a real node's.
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RpcError::EmptyBody));
        let latency = self
            .call_latencies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        response
    }

    fn endpoint(&self) -> &str {
        "null://full-node"
    }
}
