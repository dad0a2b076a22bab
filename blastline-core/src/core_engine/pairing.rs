//! Observable slot for the current pairing code

use crate::core_engine::qr;
use crate::core_engine::types::PairingCode;
use chrono::Utc;
use tokio::sync::watch;
use tracing::warn;

/// Holds the most recent pairing code. Readers poll with `current` or
/// subscribe for changes; neither blocks the session path.
pub struct PairingSlot {
    tx: watch::Sender<Option<PairingCode>>,
}

impl PairingSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current code, rendering its QR image
    pub fn publish(&self, payload: impl Into<String>) -> PairingCode {
        let payload = payload.into();
        let png = match qr::render_png(&payload) {
            Ok(png) => Some(png.into()),
            Err(e) => {
                warn!(error = %e, "Pairing code has no image");
                None
            }
        };
        let code = PairingCode { payload, issued_at: Utc::now(), png };
        self.tx.send_replace(Some(code.clone()));
        code
    }

    /// Drop the current code once it can no longer be used
    pub fn clear(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<PairingCode> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PairingCode>> {
        self.tx.subscribe()
    }
}

impl Default for PairingSlot {
    fn default() -> Self {
        Self::new()
    }
}
