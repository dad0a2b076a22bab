//! Shared engine context
//!
//! One instance per process. The session phase and the analytics counters
//! live behind a single lock so the event router and the dispatcher never
//! interleave partial updates. The lock is never held across an await.

use crate::core_engine::pairing::PairingSlot;
use crate::core_engine::types::{AnalyticsSnapshot, SessionPhase};
use crate::core_protocol::ProtocolClient;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct SharedState {
    pub phase: SessionPhase,
    pub analytics: AnalyticsSnapshot,
}

pub struct EngineContext {
    client: Arc<dyn ProtocolClient>,
    state: Mutex<SharedState>,
    pairing: PairingSlot,
}

impl EngineContext {
    pub fn new(client: Arc<dyn ProtocolClient>) -> Arc<Self> {
        let phase = if client.has_stored_identity() {
            SessionPhase::Disconnected
        } else {
            SessionPhase::Unpaired
        };

        Arc::new(Self {
            client,
            state: Mutex::new(SharedState { phase, analytics: AnalyticsSnapshot::default() }),
            pairing: PairingSlot::new(),
        })
    }

    pub fn client(&self) -> &Arc<dyn ProtocolClient> {
        &self.client
    }

    pub fn pairing(&self) -> &PairingSlot {
        &self.pairing
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase().is_authenticated()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        f(&mut self.state.lock())
    }
}
