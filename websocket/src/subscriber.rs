//! The flashblocks subscriber loop.

use std::sync::atomic::{AtomicU64, Ordering};

use fastblocks_types::FlashEnvelope;
use futures_util::StreamExt;
use tokio::select;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::connector::UpstreamConnector;
use crate::error::UpstreamError;
use crate::reconnect::ReconnectPolicy;
use tokio_tungstenite::tungstenite::Message;

/// Counters for the lifetime of one subscriber.
#[derive(Debug, Default)]
pub struct SubscriberStats {
    connects: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl SubscriberStats {
    /// Successful connections, including the first one.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Messages decoded and handed to the handler.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Messages that failed to decode.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// How a connection attempt ended.
enum Session {
    /// The connect itself failed.
    Refused(UpstreamError),
    /// A live session ended, cleanly or with a transport error.
    Ended(Option<UpstreamError>),
}

/// Keeps the upstream feed alive and forwards each message to `handler`.
pub struct FlashblocksSubscriber<C, F> {
    connector: C,
    handler: F,
    policy: ReconnectPolicy,
    stats: SubscriberStats,
}

impl<C, F> FlashblocksSubscriber<C, F>
where
    C: UpstreamConnector,
    F: Fn(FlashEnvelope) + Send + Sync,
{
    pub fn new(connector: C, handler: F, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            handler,
            policy,
            stats: SubscriberStats::default(),
        }
    }

    pub fn stats(&self) -> &SubscriberStats {
        &self.stats
    }

    /// Run until `shutdown` fires. Every lost or refused connection is
    /// retried after the policy delay, without limit.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let url = self.connector.url();
        info!(url, "starting flashblocks subscription");

        let mut attempt: u64 = 0;
        loop {
            let session = select! {
                biased;
                _ = shutdown.recv() => {
                    info!(url, "flashblocks subscriber shutting down");
                    return;
                }
                session = self.session(attempt) => session,
            };

            attempt = match session {
                Session::Refused(e) => {
                    error!(url, attempt, error = %e, "failed to connect to flashblocks upstream");
                    attempt + 1
                }
                Session::Ended(None) => {
                    error!(url, "flashblocks upstream connection closed");
                    1
                }
                Session::Ended(Some(e)) => {
                    error!(url, error = %e, "flashblocks upstream connection lost");
                    1
                }
            };

            let delay = self.policy.record_failure(attempt);
            warn!(url, attempt, delay_ms = delay.as_millis() as u64, "reconnecting to flashblocks upstream");

            select! {
                biased;
                _ = shutdown.recv() => {
                    info!(url, "flashblocks subscriber cancelled during backoff");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn session(&self, attempt: u64) -> Session {
        let mut stream = match self.connector.connect().await {
            Ok(stream) => stream,
            Err(e) => return Session::Refused(e),
        };

        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        self.policy.record_success(attempt);
        info!(url = self.connector.url(), attempt, "connected to flashblocks upstream");

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => self.dispatch(text.as_bytes()),
                Ok(Message::Binary(bytes)) => self.dispatch(&bytes),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "upstream sent close frame");
                    return Session::Ended(None);
                }
                Ok(_) => {}
                Err(e) => return Session::Ended(Some(e)),
            }
        }
        Session::Ended(None)
    }

    fn dispatch(&self, bytes: &[u8]) {
        match FlashEnvelope::decode(bytes) {
            Ok(envelope) => {
                debug!(block_number = %envelope.block_number(), "received flashblock");
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                (self.handler)(envelope);
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, bytes = bytes.len(), "dropping undecodable flashblock message");
            }
        }
    }
}
