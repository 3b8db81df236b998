//! Strict checks over a normalized issue.
//!
//! These never block anything; the normalizer reports what they find and
//! carries on with the record.

use super::{date_key, Issue, TITLE_MAX_CHARS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
  pub field: &'static str,
  pub message: String,
}

impl ValidationError {
  fn new(field: &'static str, message: impl Into<String>) -> Self {
    Self {
      field,
      message: message.into(),
    }
  }
}

impl std::fmt::Display for ValidationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.field, self.message)
  }
}

/// Returns every rule `issue` breaks.
pub fn validate_issue(issue: &Issue) -> Result<(), Vec<ValidationError>> {
  let mut errors = Vec::new();

  if issue.id.is_none() {
    errors.push(ValidationError::new("id", "is missing"));
  }

  if issue.title.trim().is_empty() {
    errors.push(ValidationError::new("title", "cannot be empty"));
  }
  if issue.title.chars().count() > TITLE_MAX_CHARS {
    errors.push(ValidationError::new(
      "title",
      format!("exceeds {TITLE_MAX_CHARS} characters"),
    ));
  }

  if issue.category.is_empty() {
    errors.push(ValidationError::new("category", "cannot be empty"));
  } else if issue.category.split_whitespace().count() != 1 {
    errors.push(ValidationError::new("category", "must be a single word"));
  }

  if issue.created_at <= 0 {
    errors.push(ValidationError::new("createdAt", "must be a positive timestamp"));
  }

  if !is_date_key(&issue.date_key) {
    errors.push(ValidationError::new("dateKey", "must be YYYY-MM-DD"));
  } else if issue.date_key != date_key(issue.created_at) {
    errors.push(ValidationError::new("dateKey", "does not match createdAt"));
  }

  if issue.issue_number == Some(0) {
    errors.push(ValidationError::new("issueNumber", "must be positive"));
  }

  if errors.is_empty() {
    Ok(())
  } else {
    Err(errors)
  }
}

fn is_date_key(s: &str) -> bool {
  chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() && s.len() == 10
}
