//! HTTP surface
//!
//! Thin axum handlers over the [`Engine`](crate::core_engine::Engine). All
//! state lives in the engine; handlers only translate requests and errors.

pub mod api;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

pub use api::build_router;
pub use error::{ApiError, ApiResult};
pub use server::HttpServer;
pub use state::AppState;
