//! Registry of connected downstream clients, one table per transport.
//!
//! Each client is represented by a [`ClientHandle`]: its id plus the sending
//! half of a bounded frame channel. The task serving the client (SSE body
//! stream or WebSocket writer) owns the receiving half, so dropping a handle
//! from the registry ends that client's stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use fastblocks_types::Transport;

use crate::metrics::NodeMetrics;

/// Process-unique client identifier.
pub type ClientId = u64;

/// Why a frame could not be handed to a client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("client {0} disconnected")]
    Closed(ClientId),
    #[error("client {0} is not keeping up")]
    Full(ClientId),
}

/// A registered client's outbound side.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<String>,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queue `frame` without waiting.
    pub fn try_deliver(&self, frame: String) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(self.id),
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full(self.id),
        })
    }
}

/// All currently connected clients.
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    event_stream: RwLock<HashMap<ClientId, ClientHandle>>,
    socket: RwLock<HashMap<ClientId, ClientHandle>>,
    metrics: Option<Arc<NodeMetrics>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that mirrors its sizes into the client gauges.
    pub fn with_metrics(metrics: Arc<NodeMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::default()
        }
    }

    /// Allocate a fresh client id and a frame channel of `capacity` slots.
    pub fn open_channel(&self, capacity: usize) -> (ClientHandle, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ClientHandle { id, tx }, rx)
    }

    /// Add `handle` under `transport`. Returns `false` if a client with the
    /// same id is already registered there.
    pub fn register(&self, transport: Transport, handle: ClientHandle) -> bool {
        let id = handle.id;
        let added = {
            let mut table = self.table(transport).write().unwrap_or_else(PoisonError::into_inner);
            if table.contains_key(&id) {
                false
            } else {
                table.insert(id, handle);
                self.set_gauge(transport, table.len());
                true
            }
        };
        if added {
            debug!(client = id, transport = %transport, "client registered");
        }
        added
    }

    /// Register and tie the registration to the returned guard's lifetime.
    pub fn register_guarded(
        self: &Arc<Self>,
        transport: Transport,
        handle: ClientHandle,
    ) -> Registration {
        let id = handle.id;
        self.register(transport, handle);
        Registration {
            registry: Arc::clone(self),
            transport,
            id,
        }
    }

    /// Remove a client. Returns `false` if it was not registered.
    pub fn unregister(&self, transport: Transport, id: ClientId) -> bool {
        let removed = {
            let mut table = self.table(transport).write().unwrap_or_else(PoisonError::into_inner);
            let removed = table.remove(&id).is_some();
            if removed {
                self.set_gauge(transport, table.len());
            }
            removed
        };
        if removed {
            debug!(client = id, transport = %transport, "client unregistered");
        }
        removed
    }

    /// Call `f` for every client registered when the call starts.
    ///
    /// Iterates a snapshot, so `f` may register or unregister clients
    /// (including the one it was called with) without deadlocking.
    pub fn for_each(&self, transport: Transport, mut f: impl FnMut(&ClientHandle)) {
        let snapshot: Vec<ClientHandle> = self
            .table(transport)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for handle in &snapshot {
            f(handle);
        }
    }

    pub fn len(&self, transport: Transport) -> usize {
        self.table(transport)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        Transport::ALL.iter().all(|t| self.len(*t) == 0)
    }

    pub fn contains(&self, transport: Transport, id: ClientId) -> bool {
        self.table(transport)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Drop every handle, which closes every client's frame channel.
    pub fn clear(&self) {
        for transport in Transport::ALL {
            let mut table = self.table(transport).write().unwrap_or_else(PoisonError::into_inner);
            table.clear();
            self.set_gauge(transport, 0);
        }
    }

    fn table(&self, transport: Transport) -> &RwLock<HashMap<ClientId, ClientHandle>> {
        match transport {
            Transport::EventStream => &self.event_stream,
            Transport::Socket => &self.socket,
        }
    }

    /// Callers hold the table's write guard, so gauge updates are ordered
    /// the same way as the table changes they mirror.
    fn set_gauge(&self, transport: Transport, len: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.clients(transport).set(len as i64);
        }
    }
}

/// Unregisters its client when dropped.
pub struct Registration {
    registry: Arc<ClientRegistry>,
    transport: Transport,
    id: ClientId,
}

impl Registration {
    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.transport, self.id);
    }
}
