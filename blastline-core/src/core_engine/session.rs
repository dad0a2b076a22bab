//! Session Lifecycle Manager
//!
//! Drives pairing and connect/disconnect against the protocol client. The
//! phase only moves to `Connected` through the event router; this manager
//! handles the transitions the client does not announce.

use crate::core_engine::context::EngineContext;
use crate::core_engine::errors::{ConnectError, ConnectResult};
use crate::core_engine::types::SessionPhase;
use crate::core_protocol::PairingEvent;
use crate::metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct SessionManager {
    ctx: Arc<EngineContext>,
    establishing: AtomicBool,
    /// Bumped by `terminate`; an in-flight pairing loop stops when it changes
    abandon: watch::Sender<u64>,
}

/// Clears the in-flight flag however `establish` returns
struct EstablishGuard<'a>(&'a AtomicBool);

impl Drop for EstablishGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionManager {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx, establishing: AtomicBool::new(false), abandon: watch::channel(0).0 }
    }

    /// Connect the session, pairing first when no identity is stored.
    ///
    /// On an unpaired device this resolves only once the pairing stream
    /// closes, so callers serving requests should use [`spawn_establish`].
    /// Failures are returned as-is and never retried here.
    ///
    /// [`spawn_establish`]: SessionManager::spawn_establish
    pub async fn establish(&self) -> ConnectResult<()> {
        self.begin()?;
        let _guard = EstablishGuard(&self.establishing);
        self.run_establish().await
    }

    /// Run `establish` on its own task. The attempt is claimed before this
    /// returns, so a concurrent caller sees `AlreadyEstablishing` at once.
    /// Errors from the task are logged.
    pub fn spawn_establish(self: &Arc<Self>) -> ConnectResult<JoinHandle<ConnectResult<()>>> {
        self.begin()?;
        let manager = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = EstablishGuard(&manager.establishing);
            let result = manager.run_establish().await;
            if let Err(e) = &result {
                error!(error = %e, "Session establishment failed");
            }
            result
        }))
    }

    fn begin(&self) -> ConnectResult<()> {
        self.establishing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ConnectError::AlreadyEstablishing)
    }

    async fn run_establish(&self) -> ConnectResult<()> {
        let mut abandoned = self.abandon.subscribe();
        let client = self.ctx.client();
        if client.has_stored_identity() {
            if self.ctx.is_ready() {
                debug!("Session already connected");
                return Ok(());
            }
            info!("Connecting stored session");
            return client.connect().await.map_err(|e| {
                error!(error = %e, "Connect failed");
                ConnectError::Connect(e)
            });
        }

        self.set_phase(SessionPhase::Pairing);
        info!("No stored identity, starting pairing");

        let mut events = match client.pairing_events().await {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "Could not open pairing stream");
                self.set_phase(SessionPhase::Unpaired);
                return Err(ConnectError::PairingStream(e));
            }
        };

        if let Err(e) = client.connect().await {
            error!(error = %e, "Connect failed during pairing");
            self.set_phase(SessionPhase::Unpaired);
            return Err(ConnectError::Connect(e));
        }

        let mut paired = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = abandoned.changed() => None,
                event = events.recv() => Some(event),
            };
            let Some(next) = next else {
                drop(events);
                client.disconnect().await;
                self.ctx.pairing().clear();
                info!("Pairing abandoned");
                return Ok(());
            };
            let Some(event) = next else { break };

            match event {
                PairingEvent::Code(payload) => {
                    self.ctx.pairing().publish(payload);
                    info!("New pairing code available");
                }
                PairingEvent::Success => {
                    paired = true;
                    info!("Pairing succeeded");
                }
                PairingEvent::Timeout => warn!("Pairing timed out"),
                PairingEvent::Error(reason) => warn!(reason = %reason, "Pairing error"),
            }
        }

        if !paired {
            self.ctx.pairing().clear();
            self.ctx.with_state(|s| {
                if s.phase == SessionPhase::Pairing {
                    s.phase = SessionPhase::Unpaired;
                }
            });
            info!("Pairing stream closed without success");
        }
        Ok(())
    }

    pub fn is_establishing(&self) -> bool {
        self.establishing.load(Ordering::Acquire)
    }

    /// Abandon any pairing in flight, disconnect, then log out. Safe to call
    /// repeatedly.
    pub async fn terminate(&self) {
        self.abandon.send_modify(|generation| *generation += 1);

        let client = self.ctx.client();
        client.disconnect().await;
        // Checked after disconnect: a pairing that completed meanwhile is
        // logged out too.
        if client.has_stored_identity() {
            if let Err(e) = client.logout().await {
                warn!(error = %e, "Logout failed, session left disconnected");
            }
        }
        self.force_disconnected();
        info!("Session terminated");
    }

    /// Drop the connection but keep stored credentials
    pub async fn disconnect(&self) {
        self.ctx.client().disconnect().await;
        self.force_disconnected();
        info!("Session disconnected");
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_ready()
    }

    pub fn phase(&self) -> SessionPhase {
        self.ctx.phase()
    }

    fn force_disconnected(&self) {
        self.set_phase(SessionPhase::Disconnected);
        self.ctx.pairing().clear();
        metrics::record_ready(false);
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.ctx.with_state(|s| s.phase = phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_protocol::{LoopbackClient, ProtocolClient, ProtocolError};

    fn manager(client: LoopbackClient) -> (Arc<LoopbackClient>, Arc<SessionManager>) {
        let client = Arc::new(client);
        let ctx = EngineContext::new(client.clone());
        (client, Arc::new(SessionManager::new(ctx)))
    }

    #[tokio::test]
    async fn test_stored_identity_connects_without_pairing() {
        let (client, session) = manager(LoopbackClient::paired());
        assert_eq!(session.phase(), SessionPhase::Disconnected);

        session.establish().await.unwrap();
        assert!(client.is_connected());
        assert!(session.ctx.pairing().current().is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_is_surfaced() {
        let (client, session) = manager(LoopbackClient::paired());
        client.fail_next_connect(ProtocolError::Transport("refused".into()));

        let err = session.establish().await.unwrap_err();
        assert_eq!(err, ConnectError::Connect(ProtocolError::Transport("refused".into())));
        assert!(!session.is_establishing());
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn test_connect_failure_during_pairing_reverts_phase() {
        let (client, session) = manager(LoopbackClient::unpaired());
        client.fail_next_connect(ProtocolError::Transport("refused".into()));

        assert!(matches!(session.establish().await, Err(ConnectError::Connect(_))));
        assert_eq!(session.phase(), SessionPhase::Unpaired);
    }

    #[tokio::test]
    async fn test_terminate_twice_is_idempotent() {
        let (client, session) = manager(LoopbackClient::paired());
        session.establish().await.unwrap();

        session.terminate().await;
        session.terminate().await;

        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(!client.is_connected());
        assert!(!client.has_stored_identity());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_identity() {
        let (client, session) = manager(LoopbackClient::paired());
        session.establish().await.unwrap();

        session.disconnect().await;
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(client.has_stored_identity());
    }
}
