//! HTTP API handlers

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::types::*;
use crate::core_engine::{parse_recipients, parse_template_id, AnalyticsSnapshot, Template};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Unwrap a JSON body, reporting malformed input as a 400
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid request data: {}", rejection.body_text()))
    })
}

// ============================================================================
// Session Handlers
// ============================================================================

/// GET /login-status
pub async fn login_status(State(state): State<Arc<AppState>>) -> Json<LoginStatusResponse> {
    Json(LoginStatusResponse {
        logged_in: state.engine.is_ready(),
        phase: state.engine.phase(),
    })
}

/// POST /login - Start establishing the session in the background
pub async fn login(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    if state.engine.is_ready() {
        return Ok((StatusCode::OK, Json(StatusResponse::new("already logged in"))));
    }

    // Detached; the task logs its own failure and `/login-status` reports progress.
    let _task = state.engine.session().spawn_establish()?;
    Ok((StatusCode::ACCEPTED, Json(StatusResponse::new("establishing"))))
}

/// GET /qr-code - PNG of the current pairing code
pub async fn pairing_code(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let code = state
        .engine
        .pairing_code()
        .ok_or_else(|| ApiError::NotFound("No pairing code available".into()))?;
    let png = code
        .png
        .ok_or_else(|| anyhow::anyhow!("pairing code issued at {} has no image", code.issued_at))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
    ];
    Ok((headers, Body::from(Bytes::copy_from_slice(&png))).into_response())
}

/// GET /logout
pub async fn logout(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.engine.session().terminate().await;
    Json(StatusResponse::new("logged out"))
}

// ============================================================================
// Dispatch Handlers
// ============================================================================

/// POST /send-msg - Send one message to every number
pub async fn send_messages(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<Json<SendResponse>> {
    let req = json_body(body)?;
    if req.numbers.is_empty() {
        return Err(ApiError::BadRequest("Both numbers and message are required".into()));
    }

    let message = req.message.as_deref().filter(|m| !m.trim().is_empty());
    let outcome = match (message, req.template_id) {
        (Some(message), _) => state.engine.send_bulk(&req.numbers, message).await,
        (None, Some(template_id)) => {
            state.engine.send_template(&req.numbers, template_id, &req.variables).await?
        }
        (None, None) => {
            return Err(ApiError::BadRequest("Both numbers and message are required".into()))
        }
    };

    Ok(Json(SendResponse {
        status: "Messages sent successfully".into(),
        sent: outcome.sent(),
        failed: outcome.failed(),
    }))
}

/// POST /upload - CSV of recipients plus a message, then on to analytics
pub async fn upload_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let mut csv = None;
    let mut message = String::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = field.bytes().await?;
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| ApiError::BadRequest("read csv err: file is not UTF-8".into()))?;
                csv = Some(text);
            }
            Some("message") => message = field.text().await?,
            other => debug!(field = ?other, "Ignoring upload field"),
        }
    }

    let csv = csv.ok_or_else(|| ApiError::BadRequest("get form err: missing file".into()))?;
    let recipients = parse_recipients(&csv);
    info!(recipients = recipients.len(), "Recipient list uploaded");

    state.engine.send_bulk(&recipients, &message).await;
    Ok(Redirect::to("/analytics"))
}

/// GET /analytics
pub async fn analytics(State(state): State<Arc<AppState>>) -> Json<AnalyticsSnapshot> {
    Json(state.engine.analytics())
}

/// GET /view-messages
pub async fn view_messages(State(state): State<Arc<AppState>>) -> Json<IncomingMessagesResponse> {
    Json(IncomingMessagesResponse { incoming_messages: state.engine.incoming_messages() })
}

// ============================================================================
// Template Handlers
// ============================================================================

/// GET /templates
pub async fn list_templates(State(state): State<Arc<AppState>>) -> Json<Vec<Template>> {
    Json(state.engine.templates().list())
}

/// POST /templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TemplateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    let req = json_body(body)?;
    let template = state.engine.templates().create(req.title, req.content);
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /templates/:id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Template>> {
    let id = parse_template_id(&id)?;
    Ok(Json(state.engine.templates().get(id)?))
}

/// PUT /templates/:id
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<TemplateRequest>, JsonRejection>,
) -> ApiResult<Json<Template>> {
    let id = parse_template_id(&id)?;
    let req = json_body(body)?;
    Ok(Json(state.engine.templates().update(id, req.title, req.content)?))
}

/// DELETE /templates/:id
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_template_id(&id)?;
    state.engine.templates().delete(id)?;
    Ok(Json(StatusResponse::new("Template deleted")))
}

/// POST /templates/:id/render
pub async fn render_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<RenderRequest>, JsonRejection>,
) -> ApiResult<Json<RenderResponse>> {
    let id = parse_template_id(&id)?;
    let req = json_body(body)?;
    let rendered = state.engine.templates().render_template(id, &req.variables)?;
    Ok(Json(RenderResponse { rendered }))
}
