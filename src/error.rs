//! Error taxonomy shared by every core operation.
//!
//! `Display` is the user-facing message; `code()` is the stable identifier sent on the wire.

use serde::Serialize;

/// Which of the two structured file kinds an input was expected to be, or looked like.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
  Assignment,
  Backup,
}

impl std::fmt::Display for FileKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FileKind::Assignment => f.write_str("assignment"),
      FileKind::Backup => f.write_str("backup"),
    }
  }
}

impl FileKind {
  fn with_article(&self) -> &'static str {
    match self {
      FileKind::Assignment => "an assignment file",
      FileKind::Backup => "a backup file",
    }
  }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CoreError {
  #[error("Could not read this input: {0}")]
  MalformedInput(String),

  #[error("Wrong file type: this looks like {}, but {} was expected.", found.with_article(), expected.with_article())]
  WrongFileKind { expected: FileKind, found: FileKind },

  #[error("The {kind} file is missing required fields: {}", missing.join(", "))]
  SchemaIncomplete { kind: FileKind, missing: Vec<String> },

  #[error("No assignment is loaded. Load an assignment file first.")]
  NoAssignmentLoaded,

  #[error("This backup is for {backup}, but the loaded assignment is {loaded}.")]
  CourseMismatch { backup: String, loaded: String },

  #[error("The document renderer is not available: {0}. Your work is unchanged; please retry.")]
  RenderUnavailable(String),

  #[error("Local storage is unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Student name and student ID are required before exporting.")]
  IdentityIncomplete,

  #[error("No subsection matches answer key '{0}'.")]
  UnknownSubsection(String),

  #[error("At most {max} image(s) are allowed for this part.")]
  ImageLimitExceeded { max: usize },

  #[error("There is no image at position {index}.")]
  ImageIndexOutOfRange { index: usize },
}

impl CoreError {
  pub fn code(&self) -> &'static str {
    match self {
      CoreError::MalformedInput(_) => "malformed_input",
      CoreError::WrongFileKind { .. } => "wrong_file_kind",
      CoreError::SchemaIncomplete { .. } => "schema_incomplete",
      CoreError::NoAssignmentLoaded => "no_assignment_loaded",
      CoreError::CourseMismatch { .. } => "course_mismatch",
      CoreError::RenderUnavailable(_) => "render_unavailable",
      CoreError::StorageUnavailable(_) => "storage_unavailable",
      CoreError::IdentityIncomplete => "identity_incomplete",
      CoreError::UnknownSubsection(_) => "unknown_subsection",
      CoreError::ImageLimitExceeded { .. } => "image_limit_exceeded",
      CoreError::ImageIndexOutOfRange { .. } => "image_index_out_of_range",
    }
  }

  /// Soft gates can be passed with explicit user confirmation.
  pub fn is_confirmable(&self) -> bool {
    matches!(self, CoreError::CourseMismatch { .. } | CoreError::NoAssignmentLoaded)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrong_kind_message_names_both_kinds() {
    let e = CoreError::WrongFileKind { expected: FileKind::Backup, found: FileKind::Assignment };
    assert_eq!(e.code(), "wrong_file_kind");
    let msg = e.to_string();
    assert!(msg.contains("assignment file"), "{msg}");
    assert!(msg.contains("a backup file was expected"), "{msg}");
  }

  #[test]
  fn schema_incomplete_lists_fields() {
    let e = CoreError::SchemaIncomplete { kind: FileKind::Assignment, missing: vec!["title".into(), "courseCode".into()] };
    assert_eq!(e.to_string(), "The assignment file is missing required fields: title, courseCode");
  }
}
