//! Event Router
//!
//! Consumes asynchronous events from the protocol client and turns them into
//! session phase changes and inbound log entries. This is the only place the
//! phase moves to `Connected`.

use crate::core_engine::analytics::AnalyticsAggregator;
use crate::core_engine::context::EngineContext;
use crate::core_engine::types::SessionPhase;
use crate::core_protocol::ProtocolEvent;
use crate::metrics;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct EventRouter {
    ctx: Arc<EngineContext>,
    analytics: AnalyticsAggregator,
}

impl EventRouter {
    pub fn new(ctx: Arc<EngineContext>, analytics: AnalyticsAggregator) -> Self {
        Self { ctx, analytics }
    }

    /// Apply one event to the shared state
    pub fn handle_event(&self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::Connected => {
                let previous = self.ctx.with_state(|s| {
                    std::mem::replace(&mut s.phase, SessionPhase::Connected)
                });
                self.ctx.pairing().clear();
                metrics::record_ready(true);
                info!(previous = %previous, "Session connected");
            }
            ProtocolEvent::Disconnected => {
                let changed = self.ctx.with_state(|s| {
                    if s.phase == SessionPhase::Connected {
                        s.phase = SessionPhase::Disconnected;
                        true
                    } else {
                        false
                    }
                });
                metrics::record_ready(false);
                if changed {
                    info!("Session disconnected");
                } else {
                    debug!(phase = %self.ctx.phase(), "Disconnect while not connected");
                }
            }
            ProtocolEvent::InboundMessage { sender, text: Some(text) } => {
                self.analytics.record_inbound(sender, text);
                debug!(sender = %sender, "Inbound message logged");
            }
            ProtocolEvent::InboundMessage { sender, text: None } => {
                debug!(sender = %sender, "Dropping inbound message without text body");
            }
            other => {
                debug!(kind = other.kind(), "Ignoring event");
            }
        }
    }

    /// Route every event from `rx` until the client drops its sender
    pub fn spawn(self: Arc<Self>, mut rx: broadcast::Receiver<ProtocolEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event router fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event stream closed, router stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_protocol::{EventBroadcaster, LoopbackClient};
    use std::time::Duration;

    fn router() -> (Arc<EngineContext>, EventRouter) {
        let ctx = EngineContext::new(Arc::new(LoopbackClient::paired()));
        let analytics = AnalyticsAggregator::new(ctx.clone());
        (ctx.clone(), EventRouter::new(ctx, analytics))
    }

    fn inbound(sender: &str, text: Option<&str>) -> ProtocolEvent {
        ProtocolEvent::InboundMessage { sender: sender.into(), text: text.map(String::from) }
    }

    #[test]
    fn test_connected_then_disconnected() {
        let (ctx, router) = router();

        router.handle_event(&ProtocolEvent::Connected);
        assert!(ctx.is_ready());

        router.handle_event(&ProtocolEvent::Disconnected);
        assert!(!ctx.is_ready());
        assert_eq!(ctx.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn test_disconnect_before_connect_is_harmless() {
        let (ctx, router) = router();
        router.handle_event(&ProtocolEvent::Disconnected);
        assert!(!ctx.is_ready());
        assert_eq!(ctx.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn test_connected_clears_pairing_code() {
        let (ctx, router) = router();
        ctx.pairing().publish("2@abc");

        router.handle_event(&ProtocolEvent::Connected);
        assert!(ctx.pairing().current().is_none());
    }

    #[test]
    fn test_inbound_without_text_is_dropped() {
        let (ctx, router) = router();
        router.handle_event(&inbound("1", Some("m1")));
        router.handle_event(&inbound("2", None));
        router.handle_event(&inbound("3", Some("m3")));

        let incoming = ctx.with_state(|s| s.analytics.incoming.clone());
        assert_eq!(incoming, vec!["From 1: m1", "From 3: m3"]);
    }

    #[test]
    fn test_unrouted_events_leave_state_alone() {
        let (ctx, router) = router();
        router.handle_event(&ProtocolEvent::Connected);
        router.handle_event(&ProtocolEvent::Receipt {
            message_id: "3EB0".into(),
            from: "1".into(),
        });
        router.handle_event(&ProtocolEvent::LoggedOut { reason: "remote".into() });

        assert!(ctx.is_ready());
        assert_eq!(ctx.with_state(|s| s.analytics.clone()).incoming.len(), 0);
    }

    #[tokio::test]
    async fn test_spawned_router_stops_when_stream_closes() {
        let (ctx, router) = router();
        let events = EventBroadcaster::new(16);
        let handle = Arc::new(router).spawn(events.subscribe());

        events.emit(ProtocolEvent::Connected);
        events.emit(inbound("9", Some("hello")));
        drop(events);

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(ctx.is_ready());
        assert_eq!(ctx.with_state(|s| s.analytics.incoming.clone()), vec!["From 9: hello"]);
    }

    #[tokio::test]
    async fn test_spawned_router_survives_lag() {
        let (ctx, router) = router();
        let events = EventBroadcaster::new(2);
        let rx = events.subscribe();

        for i in 0..5 {
            events.emit(inbound(&i.to_string(), Some("x")));
        }
        let handle = Arc::new(router).spawn(rx);
        events.emit(ProtocolEvent::Connected);
        drop(events);

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(ctx.is_ready());
    }
}
