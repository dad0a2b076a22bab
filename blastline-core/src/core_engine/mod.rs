//! Session Lifecycle & Bulk Dispatch Engine
//!
//! Everything with real state lives here: the session phase machine, the
//! event router feeding it, the paced dispatch loop and the template store.
//! Components share one [`EngineContext`]; [`Engine`] wires them together.

pub mod analytics;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod event_router;
pub mod pairing;
pub mod qr;
pub mod recipients;
pub mod render;
pub mod session;
pub mod templates;
pub mod types;

#[cfg(test)]
mod tests;

// Re-exports
pub use analytics::AnalyticsAggregator;
pub use context::EngineContext;
pub use dispatch::Dispatcher;
pub use engine::Engine;
pub use errors::{
    ConnectError, ConnectResult, QrError, QrResult, RenderError, RenderResult, SendError,
    TemplateError, TemplateResult,
};
pub use event_router::EventRouter;
pub use pairing::PairingSlot;
pub use recipients::parse_recipients;
pub use render::{placeholders, render};
pub use session::SessionManager;
pub use templates::{parse_template_id, TemplateStore};
pub use types::{
    AnalyticsSnapshot, DispatchOutcome, PairingCode, RecipientOutcome, RecipientResult,
    SessionPhase, Template,
};
