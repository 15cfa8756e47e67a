//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::CoreError;
use crate::logic::*;
use crate::protocol::{to_out, ClientWsMessage, ServerWsMessage};
use crate::session::Action;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "gradebridge", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "gradebridge", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "gradebridge", kind = incoming.kind(), "WS received");
            handle_client_ws(incoming, &state).await
          }
          Err(e) => CoreError::MalformedInput(format!("Invalid JSON: {}", e)).into(),
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "malformed_input", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "gradebridge", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "gradebridge", "WebSocket disconnected");
}

async fn session_reply(state: &AppState) -> ServerWsMessage {
  ServerWsMessage::Session { session: to_out(&*state.session.read().await) }
}

async fn after(state: &AppState, result: Result<(), CoreError>) -> ServerWsMessage {
  match result {
    Ok(()) => session_reply(state).await,
    Err(e) => e.into(),
  }
}

pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,
    ClientWsMessage::GetSession => session_reply(state).await,

    ClientWsMessage::SetStudent { name, id } => after(state, set_student(state, name, id).await).await,

    ClientWsMessage::LoadAssignment { raw } => after(state, load_assignment(state, &raw).await.map(|_| ())).await,
    ClientWsMessage::LoadAssignmentFile { path } => {
      after(state, load_assignment_file(state, &path).await.map(|_| ())).await
    }

    ClientWsMessage::SetTextAnswer { key, text } => dispatch(state, Action::SetTextAnswer { key, text }).await,
    ClientWsMessage::SetAiReflective { key, text } => dispatch(state, Action::SetAiReflective { key, text }).await,
    ClientWsMessage::AddImages { key, images } => dispatch(state, Action::AddImages { key, images }).await,
    ClientWsMessage::RemoveImage { key, index } => dispatch(state, Action::RemoveImage { key, index }).await,

    ClientWsMessage::ImportBackup { raw, confirmed } => {
      ServerWsMessage::ImportResult { result: import_backup(state, &raw, confirmed).await }
    }
    ClientWsMessage::ImportBackupFile { path, confirmed } => {
      ServerWsMessage::ImportResult { result: import_backup_file(state, &path, confirmed).await }
    }

    ClientWsMessage::ExportBackup => match export_backup(state).await {
      Ok(backup) => ServerWsMessage::BackupExported { backup },
      Err(e) => e.into(),
    },
    ClientWsMessage::Preview => match preview(state).await {
      Ok(pages) => ServerWsMessage::Preview { pages },
      Err(e) => e.into(),
    },
    ClientWsMessage::ExportDocument => match export_document(state).await {
      Ok(document) => ServerWsMessage::DocumentExported { document },
      Err(e) => e.into(),
    },

    ClientWsMessage::ToggleView => dispatch(state, Action::ToggleView).await,
    ClientWsMessage::AcknowledgePrivacy => dispatch(state, Action::AcknowledgePrivacy).await,
    ClientWsMessage::Clear => dispatch(state, Action::Clear).await,
  }
}

async fn dispatch(state: &AppState, action: Action) -> ServerWsMessage {
  after(state, state.dispatch(action).await.map(|_| ())).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ServiceConfig;
  use crate::store::MemoryStore;

  fn state() -> AppState {
    AppState::with_parts(ServiceConfig::default(), Arc::new(MemoryStore::new()), None)
  }

  fn parse(raw: &str) -> ClientWsMessage {
    serde_json::from_str(raw).unwrap()
  }

  #[tokio::test]
  async fn answer_before_assignment_is_an_error_reply() {
    let st = state();
    let reply = handle_client_ws(parse(r#"{"type":"set_text_answer","key":"p0_s0","text":"x"}"#), &st).await;
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["code"], "no_assignment_loaded");
  }

  #[tokio::test]
  async fn load_then_answer_returns_session() {
    let st = state();
    let raw = r#"{"courseCode":"CS 1","title":"Lab","problems":[{"subsections":[{"points":3,"submissionType":"Text"}]}]}"#;
    let msg = serde_json::json!({ "type": "load_assignment", "raw": raw }).to_string();
    let reply = serde_json::to_value(handle_client_ws(parse(&msg), &st).await).unwrap();
    assert_eq!(reply["type"], "session");
    assert_eq!(reply["session"]["totalPoints"], 3.0);

    let reply = handle_client_ws(parse(r#"{"type":"set_text_answer","key":"p0_s0","text":"hello"}"#), &st).await;
    let reply = serde_json::to_value(reply).unwrap();
    assert_eq!(reply["session"]["submissionData"]["p0_s0"]["textAnswer"], "hello");
    assert_eq!(reply["session"]["readyForExport"], false);
  }

  #[tokio::test]
  async fn import_result_reports_soft_gate() {
    let st = state();
    let msg = serde_json::json!({
      "type": "import_backup",
      "raw": r#"{"submission_data":{},"course_code":"CS 1","student_name":"Ada"}"#
    })
    .to_string();
    let reply = serde_json::to_value(handle_client_ws(parse(&msg), &st).await).unwrap();
    assert_eq!(reply["type"], "import_result");
    assert_eq!(reply["result"]["action"], "warn");
    assert_eq!(reply["result"]["code"], "no_assignment_loaded");
    assert_eq!(reply["result"]["applied"], false);
  }
}
