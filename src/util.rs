//! Small utility helpers used across modules.

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
    .collect()
}

/// `<studentId>_<studentName>_<courseCode>.pdf`, restricted to a safe character set.
pub fn document_filename(student_id: &str, student_name: &str, course_code: &str) -> String {
  sanitize_filename(&format!("{}_{}_{}.pdf", student_id, student_name, course_code))
}

/// `<courseCode>_<title>_backup.json`. Only path separators are replaced, the rest is kept readable.
pub fn backup_filename(course_code: &str, title: &str) -> String {
  format!("{}_{}_backup.json", course_code, title).replace(['/', '\\'], "_")
}

/// Log-safe truncation for large strings (answers, renderer error bodies).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
