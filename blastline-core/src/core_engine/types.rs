//! Engine data types

use crate::core_engine::errors::SendError;
use crate::core_protocol::DeliveryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Authentication state of the single protocol session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No stored device identity
    Unpaired,
    /// Waiting for a companion device to confirm a pairing code
    Pairing,
    Connected,
    /// Paired but offline
    Disconnected,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Unpaired => "unpaired",
            SessionPhase::Pairing => "pairing",
            SessionPhase::Connected => "connected",
            SessionPhase::Disconnected => "disconnected",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        *self == SessionPhase::Connected
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-lifetime dispatch and inbound counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_sent: u64,
    pub total_failed: u64,
    /// Reserved; nothing produces replies yet
    pub total_replied: u64,
    /// Reserved; nothing produces reactions yet
    pub total_reacted: u64,
    /// `From {sender}: {text}` lines in arrival order
    pub incoming: Vec<String>,
}

/// Stored message template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub title: String,
    pub content: String,
}

/// Latest pairing code issued by the protocol client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    /// Raw code as issued by the protocol client
    pub payload: String,
    pub issued_at: DateTime<Utc>,
    /// QR image of `payload`; `None` when encoding failed
    #[serde(skip)]
    pub png: Option<Arc<[u8]>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientOutcome {
    Delivered(DeliveryId),
    Failed(SendError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientResult {
    pub recipient: String,
    pub outcome: RecipientOutcome,
}

/// Per-recipient results of one bulk dispatch, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub results: Vec<RecipientResult>,
}

impl DispatchOutcome {
    pub fn sent(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, RecipientOutcome::Delivered(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.sent()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
