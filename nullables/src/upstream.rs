//! Nullable flashblocks upstream: scripted connection sessions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use fastblocks_websocket::{Message, UpstreamConnector, UpstreamError, UpstreamStream};
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What one `connect` call does.
pub enum ScriptedSession {
    /// The connect fails.
    Refuse(String),
    /// Connects, yields these messages, then the stream ends.
    Close(Vec<Message>),
    /// Connects, yields these messages, then fails with a transport error.
    Fail(Vec<Message>, String),
    /// Connects, yields these messages, then stays open.
    Open(Vec<Message>),
    /// Connects and yields whatever the test sends; ends when the sender is
    /// dropped.
    Live(mpsc::UnboundedReceiver<Message>),
}

impl ScriptedSession {
    /// Text frame helper.
    pub fn text(payload: &str) -> Message {
        Message::Text(payload.to_string())
    }

    /// A [`ScriptedSession::Live`] session and the sender that feeds it.
    pub fn live() -> (mpsc::UnboundedSender<Message>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ScriptedSession::Live(rx))
    }
}

/// An upstream that plays back [`ScriptedSession`]s, one per connect.
///
/// When the script runs out, `connect` never completes, which parks the
/// subscriber so tests can inspect it.
pub struct NullUpstream {
    script: Mutex<VecDeque<ScriptedSession>>,
    connect_times: Mutex<Vec<Instant>>,
}

impl NullUpstream {
    pub fn new(script: impl IntoIterator<Item = ScriptedSession>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            connect_times: Mutex::new(Vec::new()),
        }
    }

    /// Number of connect attempts so far.
    pub fn connects(&self) -> usize {
        self.connect_times.lock().unwrap().len()
    }

    /// When each connect attempt happened (tokio clock, so paused-time tests
    /// see exact backoff gaps).
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamConnector for NullUpstream {
    async fn connect(&self) -> Result<UpstreamStream, UpstreamError> {
        self.connect_times.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();

        match next {
            None => std::future::pending().await,
            Some(ScriptedSession::Refuse(reason)) => Err(UpstreamError::Unavailable(reason)),
            Some(ScriptedSession::Close(messages)) => {
                Ok(stream::iter(messages.into_iter().map(Ok)).boxed())
            }
            Some(ScriptedSession::Fail(messages, reason)) => Ok(stream::iter(
                messages
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(UpstreamError::Unavailable(reason)))),
            )
            .boxed()),
            Some(ScriptedSession::Open(messages)) => Ok(stream::iter(messages.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(ScriptedSession::Live(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|message| (Ok(message), rx))
            })
            .boxed()),
        }
    }

    fn url(&self) -> &str {
        "null://flashblocks"
    }
}
