//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static UI from `./static` with index fallback
/// - CORS (any origin); the listener only binds loopback
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/session", get(http::http_get_session))
        .route("/api/v1/student", post(http::http_post_student))
        .route("/api/v1/assignment", post(http::http_post_assignment))
        .route("/api/v1/assignment/file", post(http::http_post_assignment_file))
        .route("/api/v1/answer/text", post(http::http_post_text_answer))
        .route("/api/v1/answer/ai", post(http::http_post_ai_answer))
        .route("/api/v1/answer/images", post(http::http_post_images))
        .route("/api/v1/answer/images/remove", post(http::http_post_remove_image))
        .route("/api/v1/backup/export", post(http::http_post_backup_export))
        .route("/api/v1/backup/import", post(http::http_post_backup_import))
        .route("/api/v1/backup/import/file", post(http::http_post_backup_import_file))
        .route("/api/v1/preview", get(http::http_get_preview))
        .route("/api/v1/document/export", post(http::http_post_document_export))
        .route("/api/v1/view/toggle", post(http::http_post_toggle_view))
        .route("/api/v1/privacy/ack", post(http::http_post_privacy_ack))
        .route("/api/v1/clear", post(http::http_post_clear))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
