//! Pagination engine: Assignment + SubmissionData + identity -> ordered pages.
//!
//! Layout, in order:
//!   1. one title page (identity, course, title, grand total)
//!   2. per problem: one statement page, then per subsection
//!        - one primary answer page (start marker, answer blocks)
//!        - `maxImages - 1` extra image pages when `maxImages > 1`
//!      The end-of-answer marker sits on the primary page when there are no
//!      extra pages, otherwise on the last extra page only.
//!
//! Totals are always summed from subsection points. Missing answers still produce
//! every page, with a "not submitted" block; orphaned answer keys are ignored.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{answer_key, AnswerElement, Answer, Assignment, Problem, Subsection, SubmissionData};

pub const TITLE_FOOTER: &str = "Generated by GradeBridge";

/// Who the document belongs to.
#[derive(Clone, Copy, Debug)]
pub struct Identity<'a> {
  pub student_name: &'a str,
  pub student_id: &'a str,
}

/// Running header on every page except the title page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageHeader {
  pub student_id: String,
  pub student_name: String,
  pub title: String,
  pub subtitle: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerBlock {
  NotSubmitted,
  /// Markup is passed through untouched; the renderer formats it.
  Text { content: String },
  /// First uploaded image; the rest go to extra image pages.
  Image { position: usize, of: usize, data: String },
  AiReflection { content: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageBody {
  Title {
    course_code: String,
    title: String,
    student_name: String,
    student_id: String,
    total_points: f64,
    footer: String,
  },
  ProblemStatement {
    problem: usize,
    name: String,
    description: String,
    points: f64,
  },
  Answer {
    problem: usize,
    part: String,
    name: String,
    description: String,
    points: f64,
    start_marker: bool,
    blocks: Vec<AnswerBlock>,
    end_marker: bool,
  },
  ExtraImage {
    problem: usize,
    part: String,
    /// 1-based slot shown to the reader; slot 1 lives on the answer page.
    slot: usize,
    of: usize,
    image: Option<String>,
    end_marker: bool,
  },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
  /// 1-based position in the document.
  pub number: usize,
  pub header: Option<PageHeader>,
  pub body: PageBody,
}

impl Page {
  pub fn has_end_marker(&self) -> bool {
    match &self.body {
      PageBody::Answer { end_marker, .. } | PageBody::ExtraImage { end_marker, .. } => *end_marker,
      _ => false,
    }
  }

  pub fn has_start_marker(&self) -> bool {
    matches!(self.body, PageBody::Answer { start_marker: true, .. })
  }
}

/// Subsection label: a, b, ... z, aa, ab, ...
pub fn part_label(index: usize) -> String {
  let mut n = index + 1;
  let mut out = Vec::new();
  while n > 0 {
    n -= 1;
    out.push((b'a' + (n % 26) as u8) as char);
    n /= 26;
  }
  out.iter().rev().collect()
}

/// Page count the engine produces for `assignment`, independent of answers.
pub fn expected_page_count(assignment: &Assignment) -> usize {
  1 + assignment
    .problems
    .iter()
    .map(|p| 1 + p.subsections.iter().map(|s| 1 + s.overflow_pages()).sum::<usize>())
    .sum::<usize>()
}

struct Pager<'a> {
  who: Identity<'a>,
  course_code: &'a str,
  pages: Vec<Page>,
}

impl<'a> Pager<'a> {
  fn push(&mut self, subtitle: Option<String>, body: PageBody) {
    let header = subtitle.map(|subtitle| PageHeader {
      student_id: self.who.student_id.to_string(),
      student_name: self.who.student_name.to_string(),
      title: self.course_code.to_string(),
      subtitle,
    });
    self.pages.push(Page { number: self.pages.len() + 1, header, body });
  }

  fn problem(&mut self, index: usize, problem: &Problem, data: &SubmissionData) {
    let number = index + 1;
    self.push(
      Some(format!("Problem {}", number)),
      PageBody::ProblemStatement {
        problem: number,
        name: problem.name.clone(),
        description: problem.description.clone(),
        points: problem.points(),
      },
    );
    for (si, sub) in problem.subsections.iter().enumerate() {
      self.subsection(number, si, sub, data.get(&answer_key(index, si)));
    }
  }

  fn subsection(&mut self, problem: usize, index: usize, sub: &Subsection, answer: Option<&Answer>) {
    let part = part_label(index);
    let extra = sub.overflow_pages();

    self.push(
      Some(format!("Problem {} - Part ({})", problem, part)),
      PageBody::Answer {
        problem,
        part: part.clone(),
        name: sub.name.clone(),
        description: sub.description.clone(),
        points: sub.points,
        start_marker: true,
        blocks: answer_blocks(sub, answer),
        end_marker: extra == 0,
      },
    );

    let images = answer.map(Answer::images).unwrap_or(&[]);
    let of = sub.max_images as usize;
    for slot_index in 1..=extra {
      self.push(
        Some(format!("Problem {}({}) - Image {}", problem, part, slot_index + 1)),
        PageBody::ExtraImage {
          problem,
          part: part.clone(),
          slot: slot_index + 1,
          of,
          image: images.get(slot_index).cloned(),
          end_marker: slot_index == extra,
        },
      );
    }
  }
}

fn answer_blocks(sub: &Subsection, answer: Option<&Answer>) -> Vec<AnswerBlock> {
  let Some(answer) = answer else {
    return vec![AnswerBlock::NotSubmitted];
  };
  let mut blocks = vec![];
  for element in sub.elements() {
    match element {
      AnswerElement::Text => {
        if let Some(t) = answer.text_answer.as_deref().filter(|t| !t.is_empty()) {
          blocks.push(AnswerBlock::Text { content: t.to_string() });
        }
      }
      AnswerElement::Image => {
        let images = answer.images();
        if let Some(first) = images.first() {
          blocks.push(AnswerBlock::Image { position: 1, of: images.len(), data: first.clone() });
        }
      }
      AnswerElement::AiReflective => {
        if let Some(t) = answer.ai_reflective.as_deref().filter(|t| !t.is_empty()) {
          blocks.push(AnswerBlock::AiReflection { content: t.to_string() });
        }
      }
    }
  }
  if blocks.is_empty() {
    blocks.push(AnswerBlock::NotSubmitted);
  }
  blocks
}

#[instrument(level = "info", skip_all, fields(course = %assignment.course_code, problems = assignment.problems.len(), answers = data.len()))]
pub fn paginate(assignment: &Assignment, data: &SubmissionData, who: Identity<'_>) -> Vec<Page> {
  let orphans = assignment.orphaned_keys(data);
  if !orphans.is_empty() {
    debug!(target: "paginate", count = orphans.len(), "Ignoring answers with no matching subsection");
  }

  let mut pager = Pager {
    who,
    course_code: &assignment.course_code,
    pages: Vec::new(),
  };
  pager.push(
    None,
    PageBody::Title {
      course_code: assignment.course_code.clone(),
      title: assignment.title.clone(),
      student_name: who.student_name.to_string(),
      student_id: who.student_id.to_string(),
      total_points: assignment.points(),
      footer: TITLE_FOOTER.to_string(),
    },
  );
  for (pi, problem) in assignment.problems.iter().enumerate() {
    pager.problem(pi, problem, data);
  }

  debug!(target: "paginate", pages = pager.pages.len(), expected = expected_page_count(assignment), "Document paginated");
  pager.pages
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::validate_assignment;

  const ADA: Identity<'static> = Identity { student_name: "Ada Lovelace", student_id: "42" };

  fn assignment() -> Assignment {
    validate_assignment(
      r#"{
        "courseCode": "MATH 101", "title": "Homework 1", "totalPoints": 999,
        "problems": [
          { "name": "Derivatives", "description": "Differentiate.", "subsections": [
            { "name": "Power", "description": "x^2", "points": 10, "submissionType": "Text" },
            { "name": "Sketch", "description": "", "points": 10, "submissionType": "Image", "maxImages": 3 }
          ]},
          { "name": "Reflection", "description": "", "subsections": [
            { "name": "", "description": "", "points": 5, "submissionType": "AI Reflective", "maxImages": 1 }
          ]}
        ]
      }"#,
    )
    .expect("valid")
  }

  fn answer_pages(pages: &[Page], problem: usize, part: &str) -> Vec<Page> {
    pages
      .iter()
      .filter(|p| match &p.body {
        PageBody::Answer { problem: pr, part: pa, .. } | PageBody::ExtraImage { problem: pr, part: pa, .. } => {
          *pr == problem && pa == part
        }
        _ => false,
      })
      .cloned()
      .collect()
  }

  #[test]
  fn page_count_matches_formula_with_no_answers() {
    let a = assignment();
    let pages = paginate(&a, &SubmissionData::new(), ADA);
    // 1 title + (1 + 1 + 3) + (1 + 1)
    assert_eq!(pages.len(), 8);
    assert_eq!(pages.len(), expected_page_count(&a));
    assert!(pages.iter().enumerate().all(|(i, p)| p.number == i + 1));
  }

  #[test]
  fn title_page_total_is_recomputed() {
    let pages = paginate(&assignment(), &SubmissionData::new(), ADA);
    match &pages[0].body {
      PageBody::Title { total_points, course_code, student_id, .. } => {
        assert_eq!(*total_points, 25.0);
        assert_eq!(course_code, "MATH 101");
        assert_eq!(student_id, "42");
      }
      other => panic!("first page is {other:?}"),
    }
    assert!(pages[0].header.is_none());
  }

  #[test]
  fn two_problems_sum_to_thirty_five() {
    let a = validate_assignment(
      r#"{"courseCode":"C","title":"T","totalPoints":12,"problems":[
        {"subsections":[{"points":10,"submissionType":"Text"},{"points":10,"submissionType":"Text"}]},
        {"subsections":[{"points":5,"submissionType":"Text"}]}]}"#,
    )
    .unwrap();
    match &paginate(&a, &SubmissionData::new(), ADA)[0].body {
      PageBody::Title { total_points, .. } => assert_eq!(*total_points, 35.0),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn statement_page_precedes_answers_and_carries_problem_total() {
    let pages = paginate(&assignment(), &SubmissionData::new(), ADA);
    match &pages[1].body {
      PageBody::ProblemStatement { problem, points, name, .. } => {
        assert_eq!(*problem, 1);
        assert_eq!(*points, 20.0);
        assert_eq!(name, "Derivatives");
      }
      other => panic!("unexpected {other:?}"),
    }
    assert!(!pages[1].has_start_marker());
    assert_eq!(pages[1].header.as_ref().unwrap().subtitle, "Problem 1");
  }

  #[test]
  fn single_slot_subsection_ends_on_its_own_page() {
    let pages = paginate(&assignment(), &SubmissionData::new(), ADA);
    let a = answer_pages(&pages, 1, "a");
    assert_eq!(a.len(), 1);
    assert!(a[0].has_start_marker() && a[0].has_end_marker());

    let reflection = answer_pages(&pages, 2, "a");
    assert_eq!(reflection.len(), 1);
    assert!(reflection[0].has_end_marker());
  }

  #[test]
  fn multi_image_subsection_has_one_end_marker_on_last_extra_page() {
    let mut data = SubmissionData::new();
    data.insert("p0_s1".into(), Answer { image_answers: Some(vec!["img0".into(), "img1".into()]), ..Default::default() });
    let pages = paginate(&assignment(), &data, ADA);
    let b = answer_pages(&pages, 1, "b");
    assert_eq!(b.len(), 3);
    assert_eq!(b.iter().filter(|p| p.has_end_marker()).count(), 1);
    assert!(b[2].has_end_marker());
    assert!(!b[0].has_end_marker());

    match &b[0].body {
      PageBody::Answer { blocks, .. } => {
        assert_eq!(blocks, &vec![AnswerBlock::Image { position: 1, of: 2, data: "img0".into() }]);
      }
      other => panic!("unexpected {other:?}"),
    }
    match (&b[1].body, &b[2].body) {
      (PageBody::ExtraImage { slot: 2, of: 3, image: Some(i), .. }, PageBody::ExtraImage { slot: 3, image: None, .. }) => {
        assert_eq!(i, "img1");
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(b[2].header.as_ref().unwrap().subtitle, "Problem 1(b) - Image 3");
  }

  #[test]
  fn missing_answers_render_placeholder_pages() {
    let pages = paginate(&assignment(), &SubmissionData::new(), ADA);
    for p in &pages {
      if let PageBody::Answer { blocks, .. } = &p.body {
        assert_eq!(blocks, &vec![AnswerBlock::NotSubmitted]);
      }
    }
  }

  #[test]
  fn answers_follow_declared_elements() {
    let mut data = SubmissionData::new();
    data.insert("p0_s0".into(), Answer { text_answer: Some("$2x$".into()), ai_reflective: Some("unused".into()), ..Default::default() });
    data.insert("p1_s0".into(), Answer { ai_reflective: Some("Used a CAS.".into()), ..Default::default() });
    let pages = paginate(&assignment(), &data, ADA);
    match &answer_pages(&pages, 1, "a")[0].body {
      PageBody::Answer { blocks, .. } => assert_eq!(blocks, &vec![AnswerBlock::Text { content: "$2x$".into() }]),
      other => panic!("unexpected {other:?}"),
    }
    match &answer_pages(&pages, 2, "a")[0].body {
      PageBody::Answer { blocks, .. } => assert_eq!(blocks, &vec![AnswerBlock::AiReflection { content: "Used a CAS.".into() }]),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn orphaned_answers_change_nothing() {
    let a = assignment();
    let clean = paginate(&a, &SubmissionData::new(), ADA);
    let mut data = SubmissionData::new();
    data.insert("p7_s0".into(), Answer { text_answer: Some("stale".into()), ..Default::default() });
    data.insert("nonsense".into(), Answer::default());
    assert_eq!(paginate(&a, &data, ADA), clean);
  }

  #[test]
  fn part_labels_continue_past_z() {
    assert_eq!(part_label(0), "a");
    assert_eq!(part_label(1), "b");
    assert_eq!(part_label(25), "z");
    assert_eq!(part_label(26), "aa");
    assert_eq!(part_label(27), "ab");
  }
}
