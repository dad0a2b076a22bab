//! Engine facade
//!
//! Owns the context and every component built on it, and keeps the event
//! router running for as long as the engine lives.

use crate::config::Config;
use crate::core_engine::analytics::AnalyticsAggregator;
use crate::core_engine::context::EngineContext;
use crate::core_engine::dispatch::Dispatcher;
use crate::core_engine::errors::TemplateResult;
use crate::core_engine::event_router::EventRouter;
use crate::core_engine::session::SessionManager;
use crate::core_engine::templates::TemplateStore;
use crate::core_engine::types::{AnalyticsSnapshot, DispatchOutcome, PairingCode, SessionPhase};
use crate::core_protocol::ProtocolClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Engine {
    ctx: Arc<EngineContext>,
    session: Arc<SessionManager>,
    dispatcher: Dispatcher,
    templates: TemplateStore,
    analytics: AnalyticsAggregator,
    router_task: JoinHandle<()>,
}

impl Engine {
    /// Wire the components around `client` and start routing its events.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(client: Arc<dyn ProtocolClient>, config: &Config) -> Arc<Self> {
        let events = client.subscribe();
        let ctx = EngineContext::new(client);
        let analytics = AnalyticsAggregator::new(ctx.clone());

        let router = Arc::new(EventRouter::new(ctx.clone(), analytics.clone()));
        let router_task = router.spawn(events);

        let engine = Arc::new(Self {
            session: Arc::new(SessionManager::new(ctx.clone())),
            dispatcher: Dispatcher::new(ctx.clone(), analytics.clone(), &config.dispatch),
            templates: TemplateStore::new(),
            analytics,
            router_task,
            ctx,
        });
        info!(phase = %engine.phase(), "Engine started");
        engine
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_ready()
    }

    pub fn phase(&self) -> SessionPhase {
        self.ctx.phase()
    }

    pub fn analytics(&self) -> AnalyticsSnapshot {
        self.analytics.snapshot()
    }

    pub fn incoming_messages(&self) -> Vec<String> {
        self.analytics.incoming()
    }

    pub fn pairing_code(&self) -> Option<PairingCode> {
        self.ctx.pairing().current()
    }

    pub fn watch_pairing(&self) -> watch::Receiver<Option<PairingCode>> {
        self.ctx.pairing().subscribe()
    }

    pub async fn send_bulk<S: AsRef<str>>(&self, recipients: &[S], body: &str) -> DispatchOutcome {
        self.dispatcher.send_bulk(recipients, body).await
    }

    /// Render a stored template and send the result.
    ///
    /// Render failures are returned before any recipient is attempted.
    pub async fn send_template<S: AsRef<str>>(
        &self,
        recipients: &[S],
        template_id: i64,
        variables: &HashMap<String, String>,
    ) -> TemplateResult<DispatchOutcome> {
        let body = self.templates.render_template(template_id, variables)?;
        Ok(self.dispatcher.send_bulk(recipients, &body).await)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.router_task.abort();
    }
}
