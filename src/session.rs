//! Session state and its transition function.
//!
//! Every user action is an `Action`; `Session::apply` performs the transition and
//! reports which side effect the caller owes (autosave, purge, or nothing).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Answer, Assignment, PersistedSnapshot, SubmissionData};
use crate::error::CoreError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Edit,
    Preview,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub student_name: String,
    pub student_id: String,
    pub assignment: Option<Assignment>,
    pub submission_data: SubmissionData,
    pub last_saved: Option<String>,
    pub view_mode: ViewMode,
    pub privacy_acknowledged: bool,
}

#[derive(Clone, Debug)]
pub enum Action {
    SetStudentName(String),
    SetStudentId(String),
    /// Replaces the assignment wholesale and starts from empty answers.
    LoadAssignment(Assignment),
    SetTextAnswer { key: String, text: String },
    SetAiReflective { key: String, text: String },
    AddImages { key: String, images: Vec<String> },
    RemoveImage { key: String, index: usize },
    /// Accepted backup: identity and answers replaced, assignment untouched.
    RestoreWork {
        student_name: String,
        student_id: String,
        submission_data: SubmissionData,
    },
    Hydrate(PersistedSnapshot),
    ToggleView,
    AcknowledgePrivacy,
    MarkSaved(String),
    Clear,
}

/// What the caller must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    Autosave,
    Purge,
}

impl Session {
    pub fn apply(&mut self, action: Action) -> Result<Effect, CoreError> {
        match action {
            Action::SetStudentName(name) => {
                self.student_name = name;
                Ok(Effect::Autosave)
            }
            Action::SetStudentId(id) => {
                self.student_id = id;
                Ok(Effect::Autosave)
            }
            Action::LoadAssignment(assignment) => {
                self.assignment = Some(assignment);
                self.submission_data = SubmissionData::new();
                Ok(Effect::Autosave)
            }
            Action::SetTextAnswer { key, text } => {
                self.answer_mut(&key)?.text_answer = Some(text);
                Ok(Effect::Autosave)
            }
            Action::SetAiReflective { key, text } => {
                self.answer_mut(&key)?.ai_reflective = Some(text);
                Ok(Effect::Autosave)
            }
            Action::AddImages { key, images } => {
                let limit = self.upload_limit(&key)?;
                let answer = self.answer_mut(&key)?;
                if answer.images().len() + images.len() > limit {
                    return Err(CoreError::ImageLimitExceeded { max: limit });
                }
                answer.image_answers.get_or_insert_with(Vec::new).extend(images);
                Ok(Effect::Autosave)
            }
            Action::RemoveImage { key, index } => {
                let answer = self.answer_mut(&key)?;
                match answer.image_answers.as_mut() {
                    Some(imgs) if index < imgs.len() => {
                        imgs.remove(index);
                        Ok(Effect::Autosave)
                    }
                    _ => Err(CoreError::ImageIndexOutOfRange { index }),
                }
            }
            Action::RestoreWork { student_name, student_id, submission_data } => {
                self.student_name = student_name;
                self.student_id = student_id;
                self.submission_data = submission_data;
                Ok(Effect::Autosave)
            }
            Action::Hydrate(snapshot) => {
                let had_data = snapshot.has_content();
                self.student_name = snapshot.student_name;
                self.student_id = snapshot.student_id;
                self.assignment = snapshot.assignment;
                self.submission_data = snapshot.submission_data;
                self.last_saved = snapshot.last_saved;
                // Someone who already has saved work has seen the notice.
                self.privacy_acknowledged |= had_data;
                Ok(Effect::None)
            }
            Action::ToggleView => {
                self.view_mode = match self.view_mode {
                    ViewMode::Edit => ViewMode::Preview,
                    ViewMode::Preview => ViewMode::Edit,
                };
                Ok(Effect::None)
            }
            Action::AcknowledgePrivacy => {
                self.privacy_acknowledged = true;
                Ok(Effect::None)
            }
            Action::MarkSaved(at) => {
                self.last_saved = Some(at);
                Ok(Effect::None)
            }
            Action::Clear => {
                let privacy_acknowledged = self.privacy_acknowledged;
                *self = Session { privacy_acknowledged, ..Session::default() };
                Ok(Effect::Purge)
            }
        }
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            student_name: self.student_name.clone(),
            student_id: self.student_id.clone(),
            assignment: self.assignment.clone(),
            submission_data: self.submission_data.clone(),
            last_saved: self.last_saved.clone(),
        }
    }

    /// The assignment to export, once identity is filled in.
    pub fn ready_for_export(&self) -> Result<&Assignment, CoreError> {
        let assignment = self.assignment.as_ref().ok_or(CoreError::NoAssignmentLoaded)?;
        if self.student_name.trim().is_empty() || self.student_id.trim().is_empty() {
            return Err(CoreError::IdentityIncomplete);
        }
        Ok(assignment)
    }

    fn upload_limit(&self, key: &str) -> Result<usize, CoreError> {
        let assignment = self.assignment.as_ref().ok_or(CoreError::NoAssignmentLoaded)?;
        assignment
            .subsection_by_key(key)
            .map(|s| s.upload_limit())
            .ok_or_else(|| CoreError::UnknownSubsection(key.to_string()))
    }

    fn answer_mut(&mut self, key: &str) -> Result<&mut Answer, CoreError> {
        let assignment = self.assignment.as_ref().ok_or(CoreError::NoAssignmentLoaded)?;
        if assignment.subsection_by_key(key).is_none() {
            return Err(CoreError::UnknownSubsection(key.to_string()));
        }
        debug!(target: "gradebridge", %key, "Answer edited");
        Ok(self.submission_data.entry(key.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_assignment;

    fn assignment() -> Assignment {
        validate_assignment(
            r#"{"courseCode":"MATH 101","title":"HW","problems":[{"subsections":[
                {"points":5,"submissionType":"Text"},
                {"points":5,"submissionType":"Image","maxImages":2}
            ]}]}"#,
        )
        .expect("valid")
    }

    fn loaded() -> Session {
        let mut s = Session::default();
        s.apply(Action::LoadAssignment(assignment())).unwrap();
        s
    }

    #[test]
    fn loading_an_assignment_resets_answers() {
        let mut s = loaded();
        s.apply(Action::SetTextAnswer { key: "p0_s0".into(), text: "42".into() }).unwrap();
        assert_eq!(s.submission_data.len(), 1);
        assert_eq!(s.apply(Action::LoadAssignment(assignment())).unwrap(), Effect::Autosave);
        assert!(s.submission_data.is_empty());
    }

    #[test]
    fn answers_need_a_loaded_assignment_and_known_key() {
        let mut s = Session::default();
        let err = s.apply(Action::SetTextAnswer { key: "p0_s0".into(), text: "x".into() }).unwrap_err();
        assert_eq!(err, CoreError::NoAssignmentLoaded);

        let mut s = loaded();
        let err = s.apply(Action::SetTextAnswer { key: "p9_s0".into(), text: "x".into() }).unwrap_err();
        assert_eq!(err, CoreError::UnknownSubsection("p9_s0".into()));
        assert!(s.submission_data.is_empty());
    }

    #[test]
    fn image_limit_is_enforced() {
        let mut s = loaded();
        s.apply(Action::AddImages { key: "p0_s1".into(), images: vec!["a".into()] }).unwrap();
        let err = s.apply(Action::AddImages { key: "p0_s1".into(), images: vec!["b".into(), "c".into()] }).unwrap_err();
        assert_eq!(err, CoreError::ImageLimitExceeded { max: 2 });
        s.apply(Action::AddImages { key: "p0_s1".into(), images: vec!["b".into()] }).unwrap();
        assert_eq!(s.submission_data["p0_s1"].images(), ["a".to_string(), "b".to_string()]);

        s.apply(Action::RemoveImage { key: "p0_s1".into(), index: 0 }).unwrap();
        assert_eq!(s.submission_data["p0_s1"].images(), ["b".to_string()]);
        let err = s.apply(Action::RemoveImage { key: "p0_s1".into(), index: 5 }).unwrap_err();
        assert_eq!(err, CoreError::ImageIndexOutOfRange { index: 5 });
    }

    #[test]
    fn text_subsection_takes_no_images() {
        let mut s = loaded();
        let err = s.apply(Action::AddImages { key: "p0_s0".into(), images: vec!["a".into()] }).unwrap_err();
        assert_eq!(err, CoreError::ImageLimitExceeded { max: 0 });
    }

    #[test]
    fn clear_resets_everything_but_privacy() {
        let mut s = loaded();
        s.apply(Action::AcknowledgePrivacy).unwrap();
        s.apply(Action::SetStudentName("Ada".into())).unwrap();
        s.apply(Action::ToggleView).unwrap();
        assert_eq!(s.apply(Action::Clear).unwrap(), Effect::Purge);
        assert_eq!(s, Session { privacy_acknowledged: true, ..Session::default() });
    }

    #[test]
    fn export_readiness() {
        let mut s = Session::default();
        assert_eq!(s.ready_for_export().unwrap_err(), CoreError::NoAssignmentLoaded);
        s.apply(Action::LoadAssignment(assignment())).unwrap();
        assert_eq!(s.ready_for_export().unwrap_err(), CoreError::IdentityIncomplete);
        s.apply(Action::SetStudentName("Ada".into())).unwrap();
        s.apply(Action::SetStudentId("  ".into())).unwrap();
        assert_eq!(s.ready_for_export().unwrap_err(), CoreError::IdentityIncomplete);
        s.apply(Action::SetStudentId("42".into())).unwrap();
        assert!(s.ready_for_export().is_ok());
    }

    #[test]
    fn hydrate_does_not_request_a_save() {
        let mut s = Session::default();
        let snap = PersistedSnapshot { student_name: "Ada".into(), ..Default::default() };
        assert_eq!(s.apply(Action::Hydrate(snap)).unwrap(), Effect::None);
        assert_eq!(s.student_name, "Ada");
        assert!(s.privacy_acknowledged);
    }
}
