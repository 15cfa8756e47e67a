//! Domain models: assignment structure, submission answers, backup and persisted shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Declared submission type of a subsection. Unknown strings are kept verbatim
/// and behave like `Text` when answers are collected or rendered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionType {
  Text,
  Image,
  AiReflective,
  MatlabGrader,
  Code,
  FileUpload,
  Other(String),
}

impl SubmissionType {
  pub fn as_str(&self) -> &str {
    match self {
      SubmissionType::Text => "Text",
      SubmissionType::Image => "Image",
      SubmissionType::AiReflective => "AI Reflective",
      SubmissionType::MatlabGrader => "MatlabGrader",
      SubmissionType::Code => "Code",
      SubmissionType::FileUpload => "File Upload",
      SubmissionType::Other(s) => s,
    }
  }
}

impl From<String> for SubmissionType {
  fn from(s: String) -> Self {
    match s.as_str() {
      "Text" => SubmissionType::Text,
      "Image" => SubmissionType::Image,
      "AI Reflective" => SubmissionType::AiReflective,
      "MatlabGrader" => SubmissionType::MatlabGrader,
      "Code" => SubmissionType::Code,
      "File Upload" => SubmissionType::FileUpload,
      _ => SubmissionType::Other(s),
    }
  }
}

impl From<SubmissionType> for String {
  fn from(t: SubmissionType) -> Self {
    t.as_str().to_string()
  }
}

/// One answer widget of a subsection, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerElement {
  Text,
  Image,
  AiReflective,
}

/// Upper bound on `maxImages`. Each slot past the first is a page of its own.
pub const MAX_IMAGES_PER_PART: u32 = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subsection {
  #[serde(default)] pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub description: String,
  pub points: f64,
  pub submission_type: SubmissionType,
  #[serde(default)] pub max_images: u32,
  /// Explicit element list (migrated legacy files); derived from `submission_type` when empty.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub answer_elements: Vec<AnswerElement>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub config: Option<String>,
}

impl Subsection {
  pub fn elements(&self) -> Vec<AnswerElement> {
    if !self.answer_elements.is_empty() {
      return self.answer_elements.clone();
    }
    match self.submission_type {
      SubmissionType::Image => vec![AnswerElement::Image],
      SubmissionType::AiReflective => vec![AnswerElement::AiReflective],
      _ => vec![AnswerElement::Text],
    }
  }

  pub fn accepts_images(&self) -> bool {
    self.elements().contains(&AnswerElement::Image)
  }

  /// How many images a student may attach. An image subsection without an
  /// explicit limit still takes one.
  pub fn upload_limit(&self) -> usize {
    if self.accepts_images() { self.max_images.max(1) as usize } else { 0 }
  }

  /// Number of extra image pages this subsection produces in the exported document.
  pub fn overflow_pages(&self) -> usize {
    (self.max_images as usize).saturating_sub(1)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
  #[serde(default)] pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub description: String,
  pub subsections: Vec<Subsection>,
}

impl Problem {
  pub fn points(&self) -> f64 {
    self.subsections.iter().map(|s| s.points).sum()
  }
}

/// A loaded assignment. Replaced wholesale on every load, never edited in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
  #[serde(default)] pub id: String,
  pub course_code: String,
  pub title: String,
  #[serde(default)] pub due_date: String,
  #[serde(default)] pub due_time: String,
  #[serde(default)] pub preamble: String,
  pub problems: Vec<Problem>,
  /// Denormalized total as written in the file. Informational only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_points: Option<f64>,
}

impl Assignment {
  /// Grand total, always recomputed from subsection points.
  pub fn points(&self) -> f64 {
    self.problems.iter().map(Problem::points).sum()
  }

  pub fn subsection(&self, problem: usize, subsection: usize) -> Option<&Subsection> {
    self.problems.get(problem)?.subsections.get(subsection)
  }

  pub fn subsection_by_key(&self, key: &str) -> Option<&Subsection> {
    let (p, s) = parse_answer_key(key)?;
    self.subsection(p, s)
  }

  /// Every image limit is within `MAX_IMAGES_PER_PART`.
  pub fn within_limits(&self) -> bool {
    self
      .problems
      .iter()
      .flat_map(|p| &p.subsections)
      .all(|s| s.max_images <= MAX_IMAGES_PER_PART)
  }

  /// Keys of `data` with no matching subsection in this assignment.
  pub fn orphaned_keys<'a>(&self, data: &'a SubmissionData) -> Vec<&'a str> {
    data
      .keys()
      .filter(|k| self.subsection_by_key(k).is_none())
      .map(String::as_str)
      .collect()
  }
}

/// Composite answer key: `p<problemIndex>_s<subsectionIndex>`, both 0-based.
pub fn answer_key(problem: usize, subsection: usize) -> String {
  format!("p{}_s{}", problem, subsection)
}

pub fn parse_answer_key(key: &str) -> Option<(usize, usize)> {
  let rest = key.strip_prefix('p')?;
  let (p, s) = rest.split_once("_s")?;
  Some((p.parse().ok()?, s.parse().ok()?))
}

/// A student's answer for one subsection. Image order is upload order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text_answer: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_answers: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ai_reflective: Option<String>,
}

impl Answer {
  pub fn images(&self) -> &[String] {
    self.image_answers.as_deref().unwrap_or(&[])
  }
}

pub type SubmissionData = BTreeMap<String, Answer>;

/// Portable backup of a student's work. Never carries problem definitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
  #[serde(default, deserialize_with = "null_as_empty")] pub student_name: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub student_id: String,
  pub submission_data: SubmissionData,
  #[serde(default, deserialize_with = "null_as_empty")] pub assignment_title: String,
  pub course_code: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub exported_at: String,
  #[serde(default, deserialize_with = "null_as_empty")] pub version: String,
}

/// Older writers emit `null` for fields they never filled in.
fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Shape of the persisted session record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
  pub student_name: String,
  pub student_id: String,
  pub assignment: Option<Assignment>,
  pub submission_data: SubmissionData,
  pub last_saved: Option<String>,
}

impl PersistedSnapshot {
  /// Empty sessions are not worth a write.
  pub fn has_content(&self) -> bool {
    !self.student_name.is_empty() || !self.student_id.is_empty() || !self.submission_data.is_empty()
  }
}
