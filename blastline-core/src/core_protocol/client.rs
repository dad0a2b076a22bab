//! ProtocolClient Trait - Abstraction over the messaging protocol client
//!
//! The engine drives a third-party client that owns the handshake, the
//! encryption, the transport and the device store. This trait is everything
//! the engine needs from it.
//!
//! ```text
//! SessionManager / Dispatcher
//!       |
//!       v
//! ProtocolClient (trait)
//!       |
//!       +---> LoopbackClient (in-process, tests and local runs)
//!       |
//!       +---> any real protocol binding
//! ```

use super::events::{PairingEvent, ProtocolEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors reported by the protocol client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("client is not connected")]
    NotConnected,

    #[error("client is not logged in")]
    NotLoggedIn,

    /// Connect was attempted without a device identity or a pairing stream
    #[error("device is not paired")]
    NotPaired,

    #[error("pairing stream already open")]
    PairingInProgress,

    #[error("device already paired")]
    AlreadyPaired,

    /// The server refused a single message
    #[error("message to {recipient} rejected: {reason}")]
    Rejected { recipient: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("device store error: {0}")]
    Store(String),
}

/// Protocol address: `user@server`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self { user: user.into(), server: server.into() }
    }

    /// Address a bare recipient number on the given domain
    pub fn for_recipient(recipient: &str, domain: &str) -> Self {
        Self::new(recipient, domain)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

/// Opaque token for one accepted outbound message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities consumed from the protocol client
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Whether the device store already holds a paired identity
    fn has_stored_identity(&self) -> bool;

    /// Open the pairing event stream
    ///
    /// Must be called before `connect` on an unpaired device. The stream
    /// closes once pairing succeeds or is abandoned.
    async fn pairing_events(&self) -> ProtocolResult<mpsc::Receiver<PairingEvent>>;

    /// Open the underlying connection
    async fn connect(&self) -> ProtocolResult<()>;

    /// Close the connection. Safe to call when already disconnected.
    async fn disconnect(&self);

    /// Invalidate the stored credentials on the server and locally
    async fn logout(&self) -> ProtocolResult<()>;

    /// Send one text message
    async fn send_text(&self, to: &Jid, body: &str) -> ProtocolResult<DeliveryId>;

    /// Subscribe to asynchronous lifecycle and inbound events
    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jid_display() {
        let jid = Jid::for_recipient("15551234567", "s.whatsapp.net");
        assert_eq!(jid.to_string(), "15551234567@s.whatsapp.net");
        assert_eq!(jid.user, "15551234567");
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::Rejected {
            recipient: "1@s.whatsapp.net".to_string(),
            reason: "not on network".to_string(),
        };
        assert_eq!(err.to_string(), "message to 1@s.whatsapp.net rejected: not on network");
        assert_eq!(ProtocolError::NotConnected.to_string(), "client is not connected");
    }
}
