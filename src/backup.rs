//! Backup protocol: export the student's work as a portable document and assess
//! incoming backups against the currently loaded assignment.
//!
//! A backup never carries problem definitions. Accepting one replaces identity and
//! answers only; the loaded assignment is left alone.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{Assignment, BackupDocument};
use crate::error::CoreError;
use crate::schema::validate_backup;
use crate::session::{Action, Session};

pub const BACKUP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hands out strictly increasing export timestamps (millisecond resolution),
/// even if the wall clock steps backwards.
#[derive(Default)]
pub struct ExportClock {
  last: Mutex<Option<DateTime<Utc>>>,
}

impl ExportClock {
  pub fn stamp(&self) -> String {
    let now = Utc::now().trunc_subsecs(3);
    let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
    let next = match *last {
      Some(prev) if now <= prev => prev + Duration::milliseconds(1),
      _ => now,
    };
    *last = Some(next);
    next.to_rfc3339_opts(SecondsFormat::Millis, true)
  }
}

#[instrument(level = "info", skip_all, fields(answers = session.submission_data.len()))]
pub fn export(session: &Session, clock: &ExportClock) -> Result<BackupDocument, CoreError> {
  let assignment = session.assignment.as_ref().ok_or(CoreError::NoAssignmentLoaded)?;
  let doc = BackupDocument {
    student_name: session.student_name.clone(),
    student_id: session.student_id.clone(),
    submission_data: session.submission_data.clone(),
    assignment_title: assignment.title.clone(),
    course_code: assignment.course_code.clone(),
    exported_at: clock.stamp(),
    version: BACKUP_VERSION.to_string(),
  };
  info!(target: "backup", course = %doc.course_code, exported_at = %doc.exported_at, "Backup exported");
  Ok(doc)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
  Accept,
  Warn,
  Reject,
}

/// Result of checking a backup before anything is changed.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportVerdict {
  Accept(BackupDocument),
  /// Usable, but the user must confirm first.
  Warn { backup: BackupDocument, reason: CoreError },
  Reject(CoreError),
}

impl ImportVerdict {
  pub fn action(&self) -> ImportAction {
    match self {
      ImportVerdict::Accept(_) => ImportAction::Accept,
      ImportVerdict::Warn { .. } => ImportAction::Warn,
      ImportVerdict::Reject(_) => ImportAction::Reject,
    }
  }

  pub fn reason(&self) -> Option<&CoreError> {
    match self {
      ImportVerdict::Accept(_) => None,
      ImportVerdict::Warn { reason, .. } | ImportVerdict::Reject(reason) => Some(reason),
    }
  }

  /// The backup to apply, given whether the user confirmed a warning.
  pub fn into_accepted(self, confirmed: bool) -> Result<BackupDocument, CoreError> {
    match self {
      ImportVerdict::Accept(b) => Ok(b),
      ImportVerdict::Warn { backup, .. } if confirmed => Ok(backup),
      ImportVerdict::Warn { reason, .. } | ImportVerdict::Reject(reason) => Err(reason),
    }
  }
}

#[instrument(level = "info", skip(raw, current), fields(raw_len = raw.len(), loaded = current.is_some()))]
pub fn import(raw: &str, current: Option<&Assignment>) -> ImportVerdict {
  let backup = match validate_backup(raw) {
    Ok(b) => b,
    Err(e) => {
      warn!(target: "backup", code = e.code(), "Backup rejected");
      return ImportVerdict::Reject(e);
    }
  };
  match current {
    None => ImportVerdict::Warn { backup, reason: CoreError::NoAssignmentLoaded },
    Some(a) if a.course_code.trim() != backup.course_code.trim() => {
      let reason = CoreError::CourseMismatch { backup: backup.course_code.clone(), loaded: a.course_code.clone() };
      ImportVerdict::Warn { backup, reason }
    }
    Some(_) => ImportVerdict::Accept(backup),
  }
}

/// Replace identity and answers from an accepted backup.
pub fn restore_action(backup: BackupDocument) -> Action {
  Action::RestoreWork {
    student_name: backup.student_name,
    student_id: backup.student_id,
    submission_data: backup.submission_data,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Answer;
  use crate::error::FileKind;
  use crate::schema::validate_assignment;

  fn assignment(course: &str) -> Assignment {
    validate_assignment(&format!(
      r#"{{"courseCode":"{}","title":"Homework 1","problems":[{{"subsections":[
        {{"points":5,"submissionType":"Text"}},{{"points":5,"submissionType":"Image","maxImages":2}}]}}]}}"#,
      course
    ))
    .expect("valid")
  }

  fn working_session() -> Session {
    let mut s = Session::default();
    s.apply(Action::LoadAssignment(assignment("MATH 101"))).unwrap();
    s.apply(Action::SetStudentName("Ada Lovelace".into())).unwrap();
    s.apply(Action::SetStudentId("42".into())).unwrap();
    s.apply(Action::SetTextAnswer { key: "p0_s0".into(), text: "$\\frac{d}{dx}x^2 = 2x$ ✓".into() }).unwrap();
    s.apply(Action::AddImages { key: "p0_s1".into(), images: vec!["data:image/png;base64,AAAA".into()] }).unwrap();
    s
  }

  #[test]
  fn export_requires_assignment() {
    let err = export(&Session::default(), &ExportClock::default()).unwrap_err();
    assert_eq!(err, CoreError::NoAssignmentLoaded);
  }

  #[test]
  fn export_then_import_restores_work_exactly() {
    let original = working_session();
    let doc = export(&original, &ExportClock::default()).unwrap();
    assert_eq!(doc.course_code, "MATH 101");
    assert_eq!(doc.assignment_title, "Homework 1");
    assert_eq!(doc.version, BACKUP_VERSION);
    let raw = serde_json::to_string_pretty(&doc).unwrap();

    let mut fresh = Session::default();
    fresh.apply(Action::LoadAssignment(assignment("MATH 101"))).unwrap();
    let verdict = import(&raw, fresh.assignment.as_ref());
    assert_eq!(verdict.action(), ImportAction::Accept);
    fresh.apply(restore_action(verdict.into_accepted(false).unwrap())).unwrap();

    assert_eq!(fresh.student_name, original.student_name);
    assert_eq!(fresh.student_id, original.student_id);
    assert_eq!(fresh.submission_data, original.submission_data);
    assert_eq!(
      serde_json::to_string(&fresh.submission_data).unwrap(),
      serde_json::to_string(&original.submission_data).unwrap()
    );
  }

  #[test]
  fn course_mismatch_needs_confirmation() {
    let mut physics = Session::default();
    physics.apply(Action::LoadAssignment(assignment("PHYS 201"))).unwrap();
    physics.apply(Action::SetStudentName("Alan".into())).unwrap();
    let raw = serde_json::to_string(&export(&physics, &ExportClock::default()).unwrap()).unwrap();

    let mut math = working_session();
    let before = math.clone();

    let verdict = import(&raw, math.assignment.as_ref());
    assert_eq!(verdict.action(), ImportAction::Warn);
    assert_eq!(
      verdict.reason(),
      Some(&CoreError::CourseMismatch { backup: "PHYS 201".into(), loaded: "MATH 101".into() })
    );
    let err = verdict.clone().into_accepted(false).unwrap_err();
    assert_eq!(err.code(), "course_mismatch");
    assert_eq!(math, before);

    math.apply(restore_action(verdict.into_accepted(true).unwrap())).unwrap();
    assert_eq!(math.student_name, "Alan");
    assert!(math.submission_data.is_empty());
    assert_eq!(math.assignment, before.assignment);
  }

  #[test]
  fn no_assignment_loaded_is_a_soft_gate() {
    let raw = serde_json::to_string(&export(&working_session(), &ExportClock::default()).unwrap()).unwrap();
    let verdict = import(&raw, None);
    assert_eq!(verdict.action(), ImportAction::Warn);
    assert_eq!(verdict.reason(), Some(&CoreError::NoAssignmentLoaded));
    assert!(verdict.into_accepted(true).is_ok());
  }

  #[test]
  fn assignment_file_as_backup_is_rejected_as_wrong_kind() {
    let raw = r#"{"courseCode":"MATH 101","title":"HW","problems":[{"subsections":[]}]}"#;
    let verdict = import(raw, None);
    assert_eq!(verdict.action(), ImportAction::Reject);
    assert_eq!(
      verdict.reason(),
      Some(&CoreError::WrongFileKind { expected: FileKind::Backup, found: FileKind::Assignment })
    );
  }

  #[test]
  fn export_stamps_increase() {
    let clock = ExportClock::default();
    let a = clock.stamp();
    let b = clock.stamp();
    let c = clock.stamp();
    assert!(a < b && b < c, "{a} {b} {c}");
  }

  #[test]
  fn orphaned_answers_survive_restore() {
    let mut s = working_session();
    s.submission_data.insert("p9_s9".into(), Answer { text_answer: Some("old".into()), ..Default::default() });
    let raw = serde_json::to_string(&export(&s, &ExportClock::default()).unwrap()).unwrap();
    let doc = import(&raw, s.assignment.as_ref()).into_accepted(false).unwrap();
    assert!(doc.submission_data.contains_key("p9_s9"));
  }
}
