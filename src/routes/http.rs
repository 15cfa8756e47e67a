//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Failures map to a JSON `{code, message}` body with a status matching the error class.

use std::sync::Arc;
use axum::{
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::CoreError;
use crate::logic::*;
use crate::protocol::*;
use crate::session::Action;
use crate::state::AppState;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self { ApiError(e) }
}

pub fn status_for(e: &CoreError) -> StatusCode {
  match e {
    CoreError::RenderUnavailable(_) | CoreError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    CoreError::CourseMismatch { .. } | CoreError::NoAssignmentLoaded | CoreError::IdentityIncomplete => StatusCode::CONFLICT,
    _ => StatusCode::BAD_REQUEST,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = status_for(&self.0);
    warn!(target: "gradebridge", code = self.0.code(), %status, "Request failed");
    (status, Json(ErrorOut { code: self.0.code().into(), message: self.0.to_string() })).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn session_out(state: &AppState) -> Json<SessionOut> {
  Json(to_out(&*state.session.read().await))
}

async fn apply(state: &AppState, action: Action) -> ApiResult<SessionOut> {
  state.dispatch(action).await?;
  Ok(session_out(state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, version: env!("CARGO_PKG_VERSION"), renderer: state.renderer.is_some() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  session_out(&state).await
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_student(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StudentIn>,
) -> ApiResult<SessionOut> {
  set_student(&state, body.name, body.id).await?;
  Ok(session_out(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(raw_len = body.raw.len()))]
pub async fn http_post_assignment(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RawIn>,
) -> ApiResult<SessionOut> {
  load_assignment(&state, &body.raw).await?;
  Ok(session_out(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(path = %body.path))]
pub async fn http_post_assignment_file(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PathIn>,
) -> ApiResult<SessionOut> {
  load_assignment_file(&state, &body.path).await?;
  Ok(session_out(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(key = %body.key, text_len = body.text.len()))]
pub async fn http_post_text_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TextAnswerIn>,
) -> ApiResult<SessionOut> {
  apply(&state, Action::SetTextAnswer { key: body.key, text: body.text }).await
}

#[instrument(level = "info", skip(state, body), fields(key = %body.key, text_len = body.text.len()))]
pub async fn http_post_ai_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TextAnswerIn>,
) -> ApiResult<SessionOut> {
  apply(&state, Action::SetAiReflective { key: body.key, text: body.text }).await
}

#[instrument(level = "info", skip(state, body), fields(key = %body.key, count = body.images.len()))]
pub async fn http_post_images(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ImagesIn>,
) -> ApiResult<SessionOut> {
  apply(&state, Action::AddImages { key: body.key, images: body.images }).await
}

#[instrument(level = "info", skip(state, body), fields(key = %body.key, index = body.index))]
pub async fn http_post_remove_image(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RemoveImageIn>,
) -> ApiResult<SessionOut> {
  apply(&state, Action::RemoveImage { key: body.key, index: body.index }).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_backup_export(State(state): State<Arc<AppState>>) -> ApiResult<BackupOut> {
  Ok(Json(export_backup(&state).await?))
}

/// Always 200: the verdict (accept / warn / reject) is in the body.
#[instrument(level = "info", skip(state, body), fields(raw_len = body.raw.len(), confirmed = body.confirmed))]
pub async fn http_post_backup_import(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ImportIn>,
) -> impl IntoResponse {
  let out = import_backup(&state, &body.raw, body.confirmed).await;
  info!(target: "backup", action = ?out.action, applied = out.applied, "HTTP backup import assessed");
  Json(out)
}

#[instrument(level = "info", skip(state, body), fields(path = %body.path, confirmed = body.confirmed))]
pub async fn http_post_backup_import_file(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ImportFileIn>,
) -> impl IntoResponse {
  Json(import_backup_file(&state, &body.path, body.confirmed).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_preview(State(state): State<Arc<AppState>>) -> ApiResult<PreviewOut> {
  Ok(Json(PreviewOut { pages: preview(&state).await? }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_document_export(State(state): State<Arc<AppState>>) -> ApiResult<DocumentOut> {
  Ok(Json(export_document(&state).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_toggle_view(State(state): State<Arc<AppState>>) -> ApiResult<SessionOut> {
  apply(&state, Action::ToggleView).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_privacy_ack(State(state): State<Arc<AppState>>) -> ApiResult<SessionOut> {
  apply(&state, Action::AcknowledgePrivacy).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_clear(State(state): State<Arc<AppState>>) -> ApiResult<SessionOut> {
  info!(target: "gradebridge", "Clearing all work");
  apply(&state, Action::Clear).await
}
