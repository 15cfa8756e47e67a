//! Core behaviours shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - loading assignments (text or local file) through the validator
//!   - importing backups with their confirmation gates
//!   - exporting backups and documents
//!   - building the page preview

use std::path::PathBuf;

use base64::Engine;
use tracing::{info, instrument, warn};

use crate::backup::{self, ExportClock, ImportAction, ImportVerdict};
use crate::domain::{Assignment, BackupDocument};
use crate::error::CoreError;
use crate::paginate::{paginate, Identity, Page};
use crate::protocol::{BackupOut, DocumentOut, ImportOut};
use crate::render::RenderJob;
use crate::schema::validate_assignment;
use crate::session::{Action, Session};
use crate::state::AppState;
use crate::util::{backup_filename, document_filename};

pub const EXPORT_NOTICE: &str = "Your submission was exported with one answer part per page. \
A JSON backup was saved just before it; keep that file to restore your work later.";

#[instrument(level = "info", skip(state, raw), fields(raw_len = raw.len()))]
pub async fn load_assignment(state: &AppState, raw: &str) -> Result<Assignment, CoreError> {
  let assignment = validate_assignment(raw)?;
  state.dispatch(Action::LoadAssignment(assignment.clone())).await?;
  info!(target: "gradebridge", id = %assignment.id, course = %assignment.course_code, problems = assignment.problems.len(), "Assignment loaded");
  Ok(assignment)
}

/// Reads run concurrently; whichever finishes last is the assignment that stays loaded.
#[instrument(level = "info", skip(state))]
pub async fn load_assignment_file(state: &AppState, path: &str) -> Result<Assignment, CoreError> {
  let raw = read_local(path).await?;
  load_assignment(state, &raw).await
}

async fn read_local(path: &str) -> Result<String, CoreError> {
  tokio::fs::read_to_string(path)
    .await
    .map_err(|e| CoreError::MalformedInput(format!("cannot read {}: {}", path, e)))
}

/// Either field may be left out; both are applied under one lock.
pub async fn set_student(state: &AppState, name: Option<String>, id: Option<String>) -> Result<(), CoreError> {
  let mut session = state.session.write().await;
  if let Some(name) = name {
    state.commit(&mut session, Action::SetStudentName(name))?;
  }
  if let Some(id) = id {
    state.commit(&mut session, Action::SetStudentId(id))?;
  }
  Ok(())
}

/// Check a backup against the loaded assignment and apply it when allowed.
/// Assessment and replacement happen under one write lock.
#[instrument(level = "info", skip(state, raw), fields(raw_len = raw.len(), %confirmed))]
pub async fn import_backup(state: &AppState, raw: &str, confirmed: bool) -> ImportOut {
  let mut session = state.session.write().await;
  let verdict = backup::import(raw, session.assignment.as_ref());
  let action = verdict.action();
  let reason = verdict.reason().cloned();

  let applied = match verdict {
    ImportVerdict::Reject(_) => false,
    v => match v.into_accepted(confirmed) {
      Ok(doc) => state.commit(&mut session, backup::restore_action(doc)).is_ok(),
      Err(_) => false,
    },
  };
  if applied {
    info!(target: "backup", ?action, "Backup restored");
  } else if reason.as_ref().is_some_and(CoreError::is_confirmable) {
    warn!(target: "backup", code = reason.as_ref().map(|r| r.code()), "Backup needs confirmation; session unchanged");
  }

  ImportOut {
    action,
    applied,
    code: reason.as_ref().map(|r| r.code().to_string()),
    message: reason.as_ref().map(|r| r.to_string()),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn import_backup_file(state: &AppState, path: &str, confirmed: bool) -> ImportOut {
  match read_local(path).await {
    Ok(raw) => import_backup(state, &raw, confirmed).await,
    Err(e) => ImportOut {
      action: ImportAction::Reject,
      applied: false,
      code: Some(e.code().to_string()),
      message: Some(e.to_string()),
    },
  }
}

#[instrument(level = "info", skip(state))]
pub async fn export_backup(state: &AppState) -> Result<BackupOut, CoreError> {
  let document = {
    let session = state.session.read().await;
    backup::export(&session, &state.clock)?
  };
  Ok(publish_backup(state, document).await)
}

/// Name the backup and copy it into the export dir when one is configured.
async fn publish_backup(state: &AppState, document: BackupDocument) -> BackupOut {
  let filename = backup_filename(&document.course_code, &document.assignment_title);
  if state.config.export.out_dir().is_some() {
    match serde_json::to_vec_pretty(&document) {
      Ok(bytes) => write_export(state, &filename, &bytes).await,
      Err(e) => warn!(target: "backup", error = %e, "Cannot serialize backup for export dir"),
    }
  }
  BackupOut { filename, document }
}

/// Pages for the on-screen preview. Identity may still be blank here.
#[instrument(level = "info", skip(state))]
pub async fn preview(state: &AppState) -> Result<Vec<Page>, CoreError> {
  let session = state.session.read().await;
  let assignment = session.assignment.as_ref().ok_or(CoreError::NoAssignmentLoaded)?;
  Ok(paginate(
    assignment,
    &session.submission_data,
    Identity { student_name: &session.student_name, student_id: &session.student_id },
  ))
}

/// Backup and pages of one document export, both taken from the same session state.
pub struct ExportBundle {
  pub backup: BackupDocument,
  pub pages: Vec<Page>,
  pub filename: String,
}

pub fn bundle_export(session: &Session, clock: &ExportClock) -> Result<ExportBundle, CoreError> {
  let assignment = session.ready_for_export()?;
  let backup = backup::export(session, clock)?;
  let pages = paginate(
    assignment,
    &session.submission_data,
    Identity { student_name: &session.student_name, student_id: &session.student_id },
  );
  let filename = document_filename(&session.student_id, &session.student_name, &assignment.course_code);
  Ok(ExportBundle { backup, pages, filename })
}

/// Backup first, then paginate and render. Works on a copy of the session so edits
/// keep flowing while the renderer runs; a failure leaves the session untouched.
#[instrument(level = "info", skip(state))]
pub async fn export_document(state: &AppState) -> Result<DocumentOut, CoreError> {
  let session = state.session_copy().await;
  let ExportBundle { backup, pages, filename } = bundle_export(&session, &state.clock)?;
  let backup = publish_backup(state, backup).await;
  let page_count = pages.len();

  let renderer = state
    .renderer
    .as_ref()
    .ok_or_else(|| CoreError::RenderUnavailable("no renderer configured (set RENDERER_URL)".into()))?;
  let job = RenderJob::new(filename.clone(), state.config.page.clone(), pages);
  let bytes = renderer.render(&job).await?;

  write_export(state, &filename, &bytes).await;
  let notice = state.persistence.take_export_notice().then(|| EXPORT_NOTICE.to_string());
  info!(target: "gradebridge", %filename, pages = page_count, bytes = bytes.len(), "Document exported");

  Ok(DocumentOut {
    filename,
    pages: page_count,
    data_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
    backup,
    notice,
  })
}

/// Best effort: the client already receives the bytes.
async fn write_export(state: &AppState, filename: &str, bytes: &[u8]) {
  let Some(dir) = state.config.export.out_dir() else { return };
  let path: PathBuf = dir.join(filename);
  let result = match tokio::fs::create_dir_all(&dir).await {
    Ok(()) => tokio::fs::write(&path, bytes).await,
    Err(e) => Err(e),
  };
  match result {
    Ok(()) => info!(target: "gradebridge", path = %path.display(), bytes = bytes.len(), "Export written"),
    Err(e) => warn!(target: "gradebridge", path = %path.display(), error = %e, "Cannot write export file"),
  }
}
