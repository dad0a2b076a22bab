//! API routes definition

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Build the API router with all endpoints
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        // Session routes
        .route("/login-status", get(handlers::login_status))
        .route("/login", post(handlers::login))
        .route("/qr-code", get(handlers::pairing_code))
        .route("/logout", get(handlers::logout))
        // Dispatch routes
        .route("/send-msg", post(handlers::send_messages))
        .route("/upload", post(handlers::upload_csv))
        .route("/analytics", get(handlers::analytics))
        .route("/view-messages", get(handlers::view_messages))
        // Template routes
        .route("/templates", get(handlers::list_templates).post(handlers::create_template))
        .route(
            "/templates/:id",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route("/templates/:id/render", post(handlers::render_template))
        // State
        .with_state(state);

    if let Some(dir) = &config.assets_dir {
        router = router.nest_service("/assets", ServeDir::new(dir));
    }

    router.layer(cors_layer(&config.cors_origins)).layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ]);

    // A list may not contain the wildcard.
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}
