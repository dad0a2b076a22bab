//! Protocol collaborator seam
//!
//! The engine never speaks the wire protocol itself. It talks to a
//! [`ProtocolClient`] and listens to the [`ProtocolEvent`]s it emits.

pub mod adapters;
pub mod client;
pub mod events;

pub use adapters::{LoopbackClient, LoopbackConfig};
pub use client::{DeliveryId, Jid, ProtocolClient, ProtocolError, ProtocolResult};
pub use events::{EventBroadcaster, PairingEvent, ProtocolEvent};
