//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve the core and the UI independently.

use serde::{Deserialize, Serialize};

use crate::backup::ImportAction;
use crate::domain::{Assignment, BackupDocument, SubmissionData};
use crate::error::CoreError;
use crate::paginate::Page;
use crate::session::{Session, ViewMode};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetSession,
    SetStudent {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },
    LoadAssignment {
        raw: String,
    },
    LoadAssignmentFile {
        path: String,
    },
    SetTextAnswer {
        key: String,
        text: String,
    },
    SetAiReflective {
        key: String,
        text: String,
    },
    AddImages {
        key: String,
        images: Vec<String>,
    },
    RemoveImage {
        key: String,
        index: usize,
    },
    ImportBackup {
        raw: String,
        #[serde(default)]
        confirmed: bool,
    },
    ImportBackupFile {
        path: String,
        #[serde(default)]
        confirmed: bool,
    },
    ExportBackup,
    Preview,
    ExportDocument,
    ToggleView,
    AcknowledgePrivacy,
    Clear,
}

impl ClientWsMessage {
    /// Short name for logs; payloads carry student work and stay out of them.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientWsMessage::Ping => "ping",
            ClientWsMessage::GetSession => "get_session",
            ClientWsMessage::SetStudent { .. } => "set_student",
            ClientWsMessage::LoadAssignment { .. } => "load_assignment",
            ClientWsMessage::LoadAssignmentFile { .. } => "load_assignment_file",
            ClientWsMessage::SetTextAnswer { .. } => "set_text_answer",
            ClientWsMessage::SetAiReflective { .. } => "set_ai_reflective",
            ClientWsMessage::AddImages { .. } => "add_images",
            ClientWsMessage::RemoveImage { .. } => "remove_image",
            ClientWsMessage::ImportBackup { .. } => "import_backup",
            ClientWsMessage::ImportBackupFile { .. } => "import_backup_file",
            ClientWsMessage::ExportBackup => "export_backup",
            ClientWsMessage::Preview => "preview",
            ClientWsMessage::ExportDocument => "export_document",
            ClientWsMessage::ToggleView => "toggle_view",
            ClientWsMessage::AcknowledgePrivacy => "acknowledge_privacy",
            ClientWsMessage::Clear => "clear",
        }
    }
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionOut,
    },
    ImportResult {
        result: ImportOut,
    },
    BackupExported {
        backup: BackupOut,
    },
    Preview {
        pages: Vec<Page>,
    },
    DocumentExported {
        document: DocumentOut,
    },
    Error {
        code: String,
        message: String,
    },
}

impl From<CoreError> for ServerWsMessage {
    fn from(e: CoreError) -> Self {
        ServerWsMessage::Error { code: e.code().to_string(), message: e.to_string() }
    }
}

/// Session as the UI sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub student_name: String,
    pub student_id: String,
    pub assignment: Option<Assignment>,
    pub submission_data: SubmissionData,
    pub last_saved: Option<String>,
    pub view_mode: ViewMode,
    pub privacy_acknowledged: bool,
    /// Recomputed from subsection points.
    pub total_points: Option<f64>,
    pub ready_for_export: bool,
}

pub fn to_out(s: &Session) -> SessionOut {
    SessionOut {
        student_name: s.student_name.clone(),
        student_id: s.student_id.clone(),
        assignment: s.assignment.clone(),
        submission_data: s.submission_data.clone(),
        last_saved: s.last_saved.clone(),
        view_mode: s.view_mode,
        privacy_acknowledged: s.privacy_acknowledged,
        total_points: s.assignment.as_ref().map(Assignment::points),
        ready_for_export: s.ready_for_export().is_ok(),
    }
}

#[derive(Debug, Serialize)]
pub struct ImportOut {
    pub action: ImportAction,
    /// True when the backup replaced identity and answers.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupOut {
    pub filename: String,
    pub document: BackupDocument,
}

#[derive(Debug, Serialize)]
pub struct DocumentOut {
    pub filename: String,
    pub pages: usize,
    /// Rendered file, base64 encoded.
    pub data_base64: String,
    /// Backup written just before rendering.
    pub backup: BackupOut,
    /// Shown once per profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

//
// HTTP request/response DTOs
//

#[derive(Deserialize)]
pub struct StudentIn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Deserialize)]
pub struct RawIn {
    pub raw: String,
}

#[derive(Deserialize)]
pub struct PathIn {
    pub path: String,
}

#[derive(Deserialize)]
pub struct TextAnswerIn {
    pub key: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct ImagesIn {
    pub key: String,
    pub images: Vec<String>,
}

#[derive(Deserialize)]
pub struct RemoveImageIn {
    pub key: String,
    pub index: usize,
}

#[derive(Deserialize)]
pub struct ImportIn {
    pub raw: String,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Deserialize)]
pub struct ImportFileIn {
    pub path: String,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Serialize)]
pub struct PreviewOut {
    pub pages: Vec<Page>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub version: &'static str,
    pub renderer: bool,
}
