//! The relay node: wires both upstream sources to the ingress server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use fastblocks_rpc::{BlockFetcher, HttpFullNodeClient};
use fastblocks_websocket::{
    FlashblocksSubscriber, ReconnectPolicy, TungsteniteConnector, UpstreamConnector,
};

use crate::client_registry::ClientRegistry;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::ingress::IngressServer;
use crate::metrics::NodeMetrics;
use crate::poller::FullNodePoller;
use crate::relay::BroadcastRelay;
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running relay.
///
/// Lifecycle: [`bind`](Self::bind), then [`spawn_all`](Self::spawn_all)
/// (or [`spawn_with`](Self::spawn_with) to inject upstreams), then
/// [`stop`](Self::stop). [`start`](Self::start) does the first two and
/// blocks until SIGINT/SIGTERM.
pub struct RelayNode {
    pub config: NodeConfig,
    pub registry: Arc<ClientRegistry>,
    pub relay: BroadcastRelay,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl RelayNode {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let metrics = Arc::new(NodeMetrics::new()?);
        let registry = Arc::new(ClientRegistry::with_metrics(Arc::clone(&metrics)));
        let relay = BroadcastRelay::new(Arc::clone(&registry)).with_metrics(Arc::clone(&metrics));

        Ok(Self {
            config,
            registry,
            relay,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            listener: None,
            local_addr: None,
            task_handles: Vec::new(),
        })
    }

    /// Bind the ingress listener. Returns the actual address, which differs
    /// from the configured one when port 0 was requested.
    pub async fn bind(&mut self) -> Result<SocketAddr, NodeError> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Spawn ingress, poller and subscriber against the configured
    /// upstreams.
    pub fn spawn_all(&mut self) -> Result<(), NodeError> {
        let fetcher =
            HttpFullNodeClient::new(self.config.full_node_url.clone(), self.config.request_timeout())?;
        let connector = TungsteniteConnector::new(
            self.config.flashblocks_url.clone(),
            &self.config.upstream_headers,
        )?;
        self.spawn_with(fetcher, connector)
    }

    /// Spawn ingress, poller and subscriber against the given upstreams.
    pub fn spawn_with<F, C>(&mut self, fetcher: F, connector: C) -> Result<(), NodeError>
    where
        F: BlockFetcher + 'static,
        C: UpstreamConnector + 'static,
    {
        let listener = self.listener.take().ok_or(NodeError::NotBound)?;

        // ── Ingress ─────────────────────────────────────────────────────
        let mut ingress = IngressServer::new(
            Arc::clone(&self.registry),
            self.config.asset_path.clone(),
            self.config.client_buffer,
        )
        .with_send_timeout(self.config.send_timeout());
        if self.config.enable_metrics {
            ingress = ingress.with_metrics(Arc::clone(&self.metrics));
        }
        let shutdown_rx = self.shutdown.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            if let Err(e) = ingress.serve(listener, shutdown_rx).await {
                tracing::error!(error = %e, "ingress server failed");
            }
        }));

        // ── Full-node poller ────────────────────────────────────────────
        let poller = Arc::new(
            FullNodePoller::new(fetcher, self.relay.clone(), self.config.poll_interval())
                .with_metrics(Arc::clone(&self.metrics)),
        );
        self.task_handles
            .push(tokio::spawn(poller.run(self.shutdown.subscribe())));

        // ── Flashblocks subscriber ──────────────────────────────────────
        let relay = self.relay.clone();
        let metrics = Arc::clone(&self.metrics);
        let policy = ReconnectPolicy::fixed(self.config.reconnect_delay())
            .with_on_failure(move |_| metrics.upstream_reconnects.inc());
        let subscriber = FlashblocksSubscriber::new(
            connector,
            move |envelope| {
                relay.broadcast_flash(&envelope);
            },
            policy,
        );
        let shutdown_rx = self.shutdown.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            subscriber.run(shutdown_rx).await;
        }));

        tracing::info!(
            address = ?self.local_addr,
            full_node = %self.config.full_node_url,
            flashblocks = %self.config.flashblocks_url,
            "relay started"
        );
        Ok(())
    }

    /// Bind, spawn everything, then wait for SIGINT/SIGTERM.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        self.bind().await?;
        self.spawn_all()?;
        self.shutdown.wait_for_signal().await;
        Ok(())
    }

    /// Stop the relay gracefully.
    ///
    /// 1. Sends the shutdown signal to all background tasks.
    /// 2. Drops every client handle, ending their streams.
    /// 3. Waits for background tasks to complete (with timeout).
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("relay stopping");
        self.shutdown.shutdown();
        self.registry.clear();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        tracing::info!("relay stopped");
        Ok(())
    }
}
