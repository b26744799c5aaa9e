//! Downstream transport tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two ways a browser can receive relayed data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Server-Sent Events over a long-lived `GET /events` response.
    /// Carries decoded full-node blocks.
    EventStream,
    /// WebSocket upgraded from an HTTP request. Carries flashblock envelopes.
    Socket,
}

impl Transport {
    pub const ALL: [Transport; 2] = [Transport::EventStream, Transport::Socket];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::EventStream => "event_stream",
            Transport::Socket => "socket",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
