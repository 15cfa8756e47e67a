//! Validation of loaded files.
//!
//! Assignment files and backup files are both plain JSON and differ only by which
//! fields are present, so classification is done on field presence before any
//! typed deserialization:
//!   - not JSON at all                        => `MalformedInput`
//!   - the other kind of file                 => `WrongFileKind`
//!   - the right kind with required fields missing => `SchemaIncomplete`
//!
//! Older assignment files (`assignment_title` / `course_code` / `problem_statement`)
//! are migrated to the current shape here, so nothing downstream sees them.

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{AnswerElement, Assignment, BackupDocument, Problem, Subsection, SubmissionType, MAX_IMAGES_PER_PART};
use crate::error::{CoreError, FileKind};

type Object = Map<String, Value>;

#[instrument(level = "info", skip(raw), fields(raw_len = raw.len()))]
pub fn validate_assignment(raw: &str) -> Result<Assignment, CoreError> {
  let value = parse_json(raw)?;
  let Some(obj) = value.as_object() else {
    return Err(incomplete(FileKind::Assignment, &["problems", "title", "courseCode"]));
  };

  if looks_like_backup(obj) {
    return Err(CoreError::WrongFileKind { expected: FileKind::Assignment, found: FileKind::Backup });
  }

  let assignment = if is_legacy_assignment(obj) {
    let a = migrate_legacy(obj)?;
    info!(target: "gradebridge", id = %a.id, course = %a.course_code, "Migrated legacy assignment file");
    a
  } else {
    check_assignment_fields(obj)?;
    serde_json::from_value::<Assignment>(value.clone()).map_err(|e| CoreError::SchemaIncomplete {
      kind: FileKind::Assignment,
      missing: vec![format!("well-formed fields ({})", e)],
    })?
  };

  if let Some(declared) = assignment.total_points {
    let computed = assignment.points();
    if (declared - computed).abs() > f64::EPSILON {
      warn!(target: "gradebridge", declared, computed, "Declared total points disagree with subsection sum; using the sum");
    }
  }
  Ok(assignment)
}

#[instrument(level = "info", skip(raw), fields(raw_len = raw.len()))]
pub fn validate_backup(raw: &str) -> Result<BackupDocument, CoreError> {
  let value = parse_json(raw)?;
  let Some(obj) = value.as_object() else {
    return Err(incomplete(FileKind::Backup, &["submission_data", "course_code"]));
  };

  if looks_like_assignment(obj) && !obj.contains_key("submission_data") {
    return Err(CoreError::WrongFileKind { expected: FileKind::Backup, found: FileKind::Assignment });
  }

  let mut missing = vec![];
  if !obj.get("submission_data").map(Value::is_object).unwrap_or(false) {
    missing.push("submission_data");
  }
  if !obj.get("course_code").map(Value::is_string).unwrap_or(false) {
    missing.push("course_code");
  }
  if !missing.is_empty() {
    return Err(incomplete(FileKind::Backup, &missing));
  }

  serde_json::from_value::<BackupDocument>(value.clone()).map_err(|e| CoreError::SchemaIncomplete {
    kind: FileKind::Backup,
    missing: vec![format!("well-formed fields ({})", e)],
  })
}

fn parse_json(raw: &str) -> Result<Value, CoreError> {
  serde_json::from_str::<Value>(raw).map_err(|e| CoreError::MalformedInput(e.to_string()))
}

fn incomplete(kind: FileKind, fields: &[&str]) -> CoreError {
  CoreError::SchemaIncomplete { kind, missing: fields.iter().map(|s| s.to_string()).collect() }
}

fn looks_like_assignment(obj: &Object) -> bool {
  obj.contains_key("problems") && (obj.contains_key("courseCode") || obj.contains_key("course_code"))
}

fn looks_like_backup(obj: &Object) -> bool {
  obj.contains_key("submission_data") && !obj.contains_key("problems")
}

fn is_legacy_assignment(obj: &Object) -> bool {
  obj.contains_key("problems")
    && (obj.contains_key("assignment_title") || obj.contains_key("course_code"))
    && !obj.contains_key("title")
    && !obj.contains_key("courseCode")
}

fn non_empty_str(obj: &Object, key: &str) -> bool {
  obj.get(key).and_then(Value::as_str).map(|s| !s.trim().is_empty()).unwrap_or(false)
}

fn non_negative_number(v: Option<&Value>) -> bool {
  v.and_then(Value::as_f64).map(|n| n >= 0.0 && n.is_finite()).unwrap_or(false)
}

/// A whole number of images within `MAX_IMAGES_PER_PART`.
fn image_limit(v: Option<&Value>) -> Option<u32> {
  v.and_then(Value::as_u64)
    .and_then(|n| u32::try_from(n).ok())
    .filter(|n| *n <= MAX_IMAGES_PER_PART)
}

fn check_assignment_fields(obj: &Object) -> Result<(), CoreError> {
  let mut missing: Vec<String> = vec![];
  if !non_empty_str(obj, "title") {
    missing.push("title".into());
  }
  if !non_empty_str(obj, "courseCode") {
    missing.push("courseCode".into());
  }

  match obj.get("problems").and_then(Value::as_array) {
    Some(problems) if !problems.is_empty() => {
      for (pi, p) in problems.iter().enumerate() {
        let Some(subs) = p.get("subsections").and_then(Value::as_array) else {
          missing.push(format!("problems[{}].subsections", pi));
          continue;
        };
        for (si, s) in subs.iter().enumerate() {
          if !non_negative_number(s.get("points")) {
            missing.push(format!("problems[{}].subsections[{}].points", pi, si));
          }
          if !s.get("submissionType").map(Value::is_string).unwrap_or(false) {
            missing.push(format!("problems[{}].subsections[{}].submissionType", pi, si));
          }
          if let Some(m) = s.get("maxImages") {
            if !m.is_null() && image_limit(Some(m)).is_none() {
              missing.push(format!("problems[{}].subsections[{}].maxImages", pi, si));
            }
          }
        }
      }
    }
    _ => missing.push("problems".into()),
  }

  if missing.is_empty() {
    Ok(())
  } else {
    Err(CoreError::SchemaIncomplete { kind: FileKind::Assignment, missing })
  }
}

fn str_field(v: &Value, key: &str) -> String {
  v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn legacy_element(label: &str) -> Option<AnswerElement> {
  match label {
    "Answer as text" => Some(AnswerElement::Text),
    "Answer as image" => Some(AnswerElement::Image),
    "AI Reflective" => Some(AnswerElement::AiReflective),
    _ => None,
  }
}

/// Convert the older assignment layout into the current one.
fn migrate_legacy(obj: &Object) -> Result<Assignment, CoreError> {
  let mut missing: Vec<String> = vec![];
  if !non_empty_str(obj, "assignment_title") {
    missing.push("assignment_title".into());
  }
  if !non_empty_str(obj, "course_code") {
    missing.push("course_code".into());
  }
  let problems_raw = obj.get("problems").and_then(Value::as_array).cloned().unwrap_or_default();
  if problems_raw.is_empty() {
    missing.push("problems".into());
  }

  let mut problems = Vec::with_capacity(problems_raw.len());
  for (pi, p) in problems_raw.iter().enumerate() {
    let subs_raw = p.get("subsections").and_then(Value::as_array).cloned().unwrap_or_default();
    let mut subsections = Vec::with_capacity(subs_raw.len());
    for (si, s) in subs_raw.iter().enumerate() {
      if !non_negative_number(s.get("points")) {
        missing.push(format!("problems[{}].subsections[{}].points", pi, si));
        continue;
      }
      let max_images = match s.get("max_images_allowed") {
        None | Some(Value::Null) => 0,
        m => match image_limit(m) {
          Some(n) => n,
          None => {
            missing.push(format!("problems[{}].subsections[{}].max_images_allowed", pi, si));
            continue;
          }
        },
      };
      let elements: Vec<AnswerElement> = s
        .get("submission_elements")
        .and_then(Value::as_array)
        .map(|xs| xs.iter().filter_map(Value::as_str).filter_map(legacy_element).collect())
        .unwrap_or_default();
      let submission_type = if elements.contains(&AnswerElement::Image) {
        SubmissionType::Image
      } else if elements == [AnswerElement::AiReflective] {
        SubmissionType::AiReflective
      } else {
        SubmissionType::Text
      };
      subsections.push(Subsection {
        id: format!("p{}s{}", pi, si),
        name: String::new(),
        description: str_field(s, "subsection_statement"),
        points: s.get("points").and_then(Value::as_f64).unwrap_or_default(),
        submission_type,
        max_images,
        answer_elements: if elements.len() > 1 { elements } else { vec![] },
        config: None,
      });
    }
    problems.push(Problem {
      id: format!("p{}", pi),
      name: String::new(),
      description: str_field(p, "problem_statement"),
      subsections,
    });
  }

  if !missing.is_empty() {
    return Err(CoreError::SchemaIncomplete { kind: FileKind::Assignment, missing });
  }

  let raw = Value::Object(obj.clone());
  let id = match str_field(&raw, "id") {
    s if s.is_empty() => Uuid::new_v4().to_string(),
    s => s,
  };
  Ok(Assignment {
    id,
    course_code: str_field(&raw, "course_code"),
    title: str_field(&raw, "assignment_title"),
    due_date: str_field(&raw, "due_date"),
    due_time: str_field(&raw, "due_time"),
    preamble: str_field(&raw, "preamble"),
    problems,
    total_points: obj.get("total_points").and_then(Value::as_f64),
  })
}
