//! Periodic polling of the full node for its latest block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::select;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fastblocks_rpc::{BlockFetcher, RpcError};
use fastblocks_types::BlockRecord;

use crate::metrics::NodeMetrics;
use crate::relay::BroadcastRelay;

/// What a single poll did.
#[derive(Debug)]
pub enum PollOutcome {
    /// A block with a new number was broadcast.
    Emitted(BlockRecord),
    /// The node reported the same block number as last time.
    Unchanged,
    /// A poll issued later already answered; this response is stale.
    Superseded,
    /// No usable block; the next tick retries.
    Failed(RpcError),
}

/// Polls the full node and broadcasts each new block to event-stream
/// clients.
pub struct FullNodePoller<F> {
    fetcher: F,
    relay: BroadcastRelay,
    interval: Duration,
    /// Issue order of polls; a response is only applied if no later poll
    /// has been applied before it.
    next_seq: AtomicU64,
    last_seen: Mutex<LastSeen>,
    metrics: Option<Arc<NodeMetrics>>,
}

#[derive(Default)]
struct LastSeen {
    /// Sequence number of the newest poll whose block was applied.
    applied: u64,
    /// Raw `number` string of the last block emitted.
    number: Option<String>,
}

impl<F: BlockFetcher + 'static> FullNodePoller<F> {
    pub fn new(fetcher: F, relay: BroadcastRelay, interval: Duration) -> Self {
        Self {
            fetcher,
            relay,
            interval,
            next_seq: AtomicU64::new(0),
            last_seen: Mutex::new(LastSeen::default()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn last_seen(&self) -> Option<String> {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .number
            .clone()
    }

    /// Fetch the latest block once and broadcast it if its number changed.
    pub async fn poll_once(&self) -> PollOutcome {
        let seq = self.issue();
        self.poll(seq).await
    }

    fn issue(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn poll(&self, seq: u64) -> PollOutcome {
        let raw = match self.fetcher.latest_block().await {
            Ok(raw) => raw,
            Err(e) => return self.failed(e),
        };
        let block = match raw.decode() {
            Ok(block) => block,
            Err(e) => return self.failed(e.into()),
        };

        let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seq < last_seen.applied {
            debug!(seq, applied = last_seen.applied, number = %raw.number, "discarding stale poll response");
            return PollOutcome::Superseded;
        }
        last_seen.applied = seq;
        if last_seen.number.as_deref() == Some(raw.number.as_str()) {
            debug!(number = %raw.number, "latest block unchanged");
            return PollOutcome::Unchanged;
        }
        last_seen.number = Some(raw.number.clone());

        let report = self.relay.broadcast_block(&block);
        info!(
            block_number = block.number(),
            transactions = block.transaction_count(),
            clients = report.delivered,
            "new block"
        );
        PollOutcome::Emitted(block)
    }

    fn failed(&self, e: RpcError) -> PollOutcome {
        warn!(endpoint = self.fetcher.endpoint(), kind = e.kind(), error = %e, "full-node poll failed");
        if let Some(metrics) = &self.metrics {
            metrics.poll_failures.inc();
        }
        PollOutcome::Failed(e)
    }

    /// Poll immediately and then every interval until `shutdown` fires.
    ///
    /// Each tick runs in its own task, so a slow response never delays the
    /// next tick. Sequence numbers are taken at tick time, so a response
    /// that arrives after a newer tick's is discarded. In-flight polls are
    /// aborted on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            endpoint = self.fetcher.endpoint(),
            interval_ms = self.interval.as_millis() as u64,
            "starting full-node poller"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        loop {
            select! {
                biased;
                _ = shutdown.recv() => {
                    info!(in_flight = in_flight.len(), "full-node poller shutting down");
                    in_flight.shutdown().await;
                    return;
                }
                _ = ticker.tick() => {
                    let poller = Arc::clone(&self);
                    let seq = poller.issue();
                    in_flight.spawn(async move {
                        poller.poll(seq).await;
                    });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_registry::ClientRegistry;
    use fastblocks_nullables::NullFullNode;
    use fastblocks_types::Transport;

    fn poller(node: NullFullNode) -> (Arc<FullNodePoller<NullFullNode>>, Arc<ClientRegistry>) {
        let registry = Arc::new(ClientRegistry::new());
        let relay = BroadcastRelay::new(Arc::clone(&registry));
        let poller = FullNodePoller::new(node, relay, Duration::from_secs(3));
        (Arc::new(poller), registry)
    }

    const BLOCK_ONE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x1","hash":"0xaa",
        "parentHash":"0x00","timestamp":"0x5","gasUsed":"0x10","gasLimit":"0x20",
        "transactions":[1,2]}}"#;

    #[tokio::test]
    async fn emits_once_per_distinct_number() {
        let (poller, registry) = poller(NullFullNode::from_http([
            (200, BLOCK_ONE),
            (200, BLOCK_ONE),
        ]));
        let (handle, mut rx) = registry.open_channel(8);
        registry.register(Transport::EventStream, handle);

        let PollOutcome::Emitted(block) = poller.poll_once().await else {
            panic!("first poll should emit");
        };
        assert_eq!(block.number(), 1);
        assert_eq!(block.timestamp_ms(), 5000);
        assert!(matches!(poller.poll_once().await, PollOutcome::Unchanged));

        assert_eq!(
            rx.try_recv().unwrap(),
            "data: {\"number\":1,\"hash\":\"0xaa\",\"parentHash\":\"0x00\",\"timestampMs\":5000,\
             \"gasUsed\":16,\"gasLimit\":32,\"transactionCount\":2}\n\n"
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.last_seen().as_deref(), Some("0x1"));
    }

    #[tokio::test]
    async fn dedup_compares_raw_strings() {
        let (poller, _registry) = poller(NullFullNode::new([
            Ok(NullFullNode::block("0x1")),
            Ok(NullFullNode::block("0x01")),
            Ok(NullFullNode::block("0x01")),
        ]));
        assert!(matches!(poller.poll_once().await, PollOutcome::Emitted(_)));
        assert!(matches!(poller.poll_once().await, PollOutcome::Emitted(_)));
        assert!(matches!(poller.poll_once().await, PollOutcome::Unchanged));
    }

    #[tokio::test]
    async fn malformed_responses_emit_nothing() {
        let (poller, registry) = poller(NullFullNode::from_http([
            (200, ""),
            (200, "{not json"),
            (503, BLOCK_ONE),
            (200, r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"busy"}}"#),
            (200, r#"{"jsonrpc":"2.0","id":1,"result":null}"#),
        ]));
        let (handle, mut rx) = registry.open_channel(8);
        registry.register(Transport::EventStream, handle);

        let kinds: Vec<&str> = {
            let mut kinds = Vec::new();
            for _ in 0..5 {
                match poller.poll_once().await {
                    PollOutcome::Failed(e) => kinds.push(e.kind()),
                    other => panic!("unexpected outcome {other:?}"),
                }
            }
            kinds
        };
        assert_eq!(kinds, ["empty_body", "decode", "status", "rpc", "missing_result"]);
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.last_seen(), None);
    }

    #[tokio::test]
    async fn undecodable_block_leaves_last_seen_untouched() {
        let mut bad = NullFullNode::block("0x2");
        bad.gas_used = "0xzz".into();
        let (poller, _registry) = poller(NullFullNode::new([
            Ok(NullFullNode::block("0x1")),
            Ok(bad),
            Ok(NullFullNode::block("0x1")),
        ]));
        assert!(matches!(poller.poll_once().await, PollOutcome::Emitted(_)));
        assert!(matches!(
            poller.poll_once().await,
            PollOutcome::Failed(RpcError::Block(_))
        ));
        assert!(matches!(poller.poll_once().await, PollOutcome::Unchanged));
    }

    #[tokio::test]
    async fn later_poll_wins_over_earlier_response() {
        let (poller, registry) = poller(NullFullNode::new([
            Ok(NullFullNode::block("0x6")),
            Ok(NullFullNode::block("0x5")),
        ]));
        let (handle, mut rx) = registry.open_channel(8);
        registry.register(Transport::EventStream, handle);

        let early = poller.issue();
        let late = poller.issue();
        assert!(matches!(poller.poll(late).await, PollOutcome::Emitted(_)));
        assert!(matches!(poller.poll(early).await, PollOutcome::Superseded));

        assert_eq!(poller.last_seen().as_deref(), Some("0x6"));
        assert!(rx.try_recv().unwrap().contains("\"number\":6"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_poll_does_not_supersede_earlier_one() {
        let (poller, _registry) = poller(NullFullNode::new([
            Err(RpcError::EmptyBody),
            Ok(NullFullNode::block("0x7")),
        ]));
        let early = poller.issue();
        let late = poller.issue();
        assert!(matches!(poller.poll(late).await, PollOutcome::Failed(_)));
        assert!(matches!(poller.poll(early).await, PollOutcome::Emitted(_)));
        assert_eq!(poller.last_seen().as_deref(), Some("0x7"));
    }

    #[tokio::test]
    async fn failures_are_counted() {
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let registry = Arc::new(ClientRegistry::new());
        let poller = FullNodePoller::new(
            NullFullNode::from_http([(500, "")]),
            BroadcastRelay::new(registry),
            Duration::from_secs(3),
        )
        .with_metrics(Arc::clone(&metrics));
        poller.poll_once().await;
        assert_eq!(metrics.poll_failures.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_immediately_then_every_interval() {
        let node = Arc::new(NullFullNode::new([
            Ok(NullFullNode::block("0x1")),
            Ok(NullFullNode::block("0x2")),
            Ok(NullFullNode::block("0x3")),
        ]));
        let registry = Arc::new(ClientRegistry::new());
        let poller = Arc::new(FullNodePoller::new(
            Arc::clone(&node),
            BroadcastRelay::new(registry),
            Duration::from_secs(3),
        ));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(Arc::clone(&poller).run(rx));

        tokio::time::sleep(Duration::from_millis(7_000)).await;
        assert_eq!(node.calls(), 3);
        assert_eq!(poller.last_seen().as_deref(), Some("0x3"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_poll_does_not_delay_next_tick() {
        let node = Arc::new(
            NullFullNode::new([
                Ok(NullFullNode::block("0x1")),
                Ok(NullFullNode::block("0x2")),
            ])
            .with_latency(Duration::from_secs(10)),
        );
        let poller = Arc::new(FullNodePoller::new(
            Arc::clone(&node),
            BroadcastRelay::new(Arc::new(ClientRegistry::new())),
            Duration::from_secs(3),
        ));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(Arc::clone(&poller).run(rx));

        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(node.calls(), 2);
        assert_eq!(poller.last_seen(), None);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stale_response_is_not_rebroadcast() {
        // Tick at 0s answers 0x5 at once, tick at 3s answers 0x5 at 8s,
        // tick at 6s answers 0x6 at once.
        let node = Arc::new(
            NullFullNode::new([
                Ok(NullFullNode::block("0x5")),
                Ok(NullFullNode::block("0x5")),
                Ok(NullFullNode::block("0x6")),
            ])
            .with_call_latencies([Duration::ZERO, Duration::from_secs(5), Duration::ZERO]),
        );
        let registry = Arc::new(ClientRegistry::new());
        let (handle, mut rx) = registry.open_channel(8);
        registry.register(Transport::EventStream, handle);
        let poller = Arc::new(FullNodePoller::new(
            Arc::clone(&node),
            BroadcastRelay::new(Arc::clone(&registry)),
            Duration::from_secs(3),
        ));
        let (tx, shutdown) = broadcast::channel(1);
        let task = tokio::spawn(Arc::clone(&poller).run(shutdown));

        tokio::time::sleep(Duration::from_millis(8_500)).await;
        assert_eq!(node.calls(), 3);

        let mut numbers = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let json = frame
                .strip_prefix("data: ")
                .and_then(|f| f.strip_suffix("\n\n"))
                .unwrap();
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            numbers.push(value["number"].as_u64().unwrap());
        }
        assert_eq!(numbers, [5, 6]);
        assert_eq!(poller.last_seen().as_deref(), Some("0x6"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
