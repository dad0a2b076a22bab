//! Protocol events
//!
//! Events emitted by the protocol client, and the broadcaster clients use to
//! fan them out to subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Asynchronous event emitted by the protocol client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// The session is authenticated and online
    Connected,

    /// The connection dropped or was closed
    Disconnected,

    /// The server invalidated the stored credentials
    LoggedOut { reason: String },

    /// A message arrived. `text` is `None` when the payload carried no
    /// decodable text body (media, reactions, protocol messages).
    InboundMessage { sender: String, text: Option<String> },

    /// Delivery or read receipt for an outbound message
    Receipt { message_id: String, from: String },
}

impl ProtocolEvent {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::Connected => "connected",
            ProtocolEvent::Disconnected => "disconnected",
            ProtocolEvent::LoggedOut { .. } => "logged_out",
            ProtocolEvent::InboundMessage { .. } => "inbound_message",
            ProtocolEvent::Receipt { .. } => "receipt",
        }
    }
}

/// Event on the pairing stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingEvent {
    /// A fresh pairing code to show to the companion device
    Code(String),
    /// The companion device confirmed the pairing
    Success,
    /// Every issued code expired without being scanned
    Timeout,
    Error(String),
}

impl PairingEvent {
    pub fn name(&self) -> &str {
        match self {
            PairingEvent::Code(_) => "code",
            PairingEvent::Success => "success",
            PairingEvent::Timeout => "timeout",
            PairingEvent::Error(_) => "error",
        }
    }
}

/// Fan-out of protocol events to any number of subscribers
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<ProtocolEvent>,
}

impl EventBroadcaster {
    /// # Arguments
    /// * `capacity` - events buffered per subscriber before it lags
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event, returning how many subscribers received it
    pub fn emit(&self, event: ProtocolEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
