//! Turns stored records of any vintage into canonical [`Issue`] values.
//!
//! Records reach us flat (`{id, type, title, ..}`) or wrapped
//! (`{id, data: {..}}`), with fields that older clients spelled
//! differently or never wrote. Normalization unwraps, fills defaults and
//! passes known optional fields through. It never fails: a record that
//! still breaks a rule afterwards is logged and returned as is.

use serde_json::Value;
use tracing::warn;

use super::validate::validate_issue;
use super::{
  date_key, now_millis, truncate_title, Comment, Issue, IssueStatus, DEFAULT_CATEGORY,
  DEFAULT_TITLE,
};
use crate::space::{record_id, Data};

/// The two record shapes a space hands back.
#[derive(Debug, Clone, Copy)]
pub enum StoredRecord<'a> {
  Nested { outer_id: Option<&'a Value>, data: &'a Data },
  Flat(&'a Data),
  /// Not an object at all; every field takes its default.
  Opaque,
}

impl<'a> StoredRecord<'a> {
  pub fn classify(record: &'a Value) -> Self {
    let Some(obj) = record.as_object() else {
      return StoredRecord::Opaque;
    };
    match obj.get("data").and_then(Value::as_object) {
      Some(data) => StoredRecord::Nested {
        outer_id: obj.get("id"),
        data,
      },
      None => StoredRecord::Flat(obj),
    }
  }

  fn source(&self) -> Option<&'a Data> {
    match *self {
      StoredRecord::Nested { data, .. } => Some(data),
      StoredRecord::Flat(data) => Some(data),
      StoredRecord::Opaque => None,
    }
  }

  fn get(&self, field: &str) -> Option<&'a Value> {
    self.source()?.get(field)
  }

  fn id(&self) -> Option<String> {
    let outer = match *self {
      StoredRecord::Nested { outer_id, .. } => outer_id,
      _ => None,
    };
    self.get("id").and_then(as_id).or_else(|| outer.and_then(as_id))
  }

  fn text(&self, field: &str) -> Option<String> {
    self
      .get(field)
      .and_then(Value::as_str)
      .filter(|s| !s.trim().is_empty())
      .map(str::to_string)
  }

  fn millis(&self, field: &str) -> Option<i64> {
    let value = self.get(field)?;
    value.as_i64().or_else(|| {
      value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
    })
  }
}

fn as_id(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Canonical issue for `record`, using the current time for a missing
/// `createdAt`.
pub fn normalize_issue(record: &Value) -> Issue {
  normalize_issue_at(record, now_millis())
}

pub fn normalize_issue_at(record: &Value, now: i64) -> Issue {
  let src = StoredRecord::classify(record);

  let title = src.text("title").unwrap_or_else(|| DEFAULT_TITLE.to_string());
  let content = src
    .get("content")
    .and_then(Value::as_str)
    .or_else(|| src.get("description").and_then(Value::as_str))
    .unwrap_or_default()
    .to_string();
  let created_at = src.millis("createdAt").unwrap_or(now);
  let date_key = src
    .text("dateKey")
    .unwrap_or_else(|| date_key(created_at));

  let id = src.id();
  let storage_id = record_id(record).filter(|outer| id.as_ref() != Some(outer));

  let issue = Issue {
    id,
    title: truncate_title(&title).to_string(),
    content,
    category: src
      .text("category")
      .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
    status: IssueStatus::from_stored(src.get("status")),
    created_by: src.text("createdBy"),
    created_by_name: src
      .text("createdByName")
      .or_else(|| src.text("createdByHandle"))
      .or_else(|| src.text("reportedBy")),
    created_at,
    date_key,
    issue_number: src
      .get("issueNumber")
      .and_then(Value::as_u64)
      .filter(|n| *n > 0),
    attachments: src.get("attachments").and_then(Value::as_array).map(|items| {
      items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
    }),
    is_bug: src.get("isBug").and_then(Value::as_bool),
    storage_id,
  };

  if let Err(errors) = validate_issue(&issue) {
    let id = issue.id.as_deref().unwrap_or("<unsaved>");
    let detail: Vec<String> = errors.iter().map(ToString::to_string).collect();
    warn!("issue {id} failed validation: {}", detail.join("; "));
  }

  issue
}

pub fn normalize_comment(record: &Value) -> Comment {
  let src = StoredRecord::classify(record);
  Comment {
    id: src.id(),
    issue_id: src.text("issueId").unwrap_or_default(),
    content: src
      .get("content")
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string(),
    created_by: src.text("createdBy"),
    created_by_name: src
      .text("createdByName")
      .or_else(|| src.text("createdByHandle")),
    created_at: src.millis("createdAt").unwrap_or(0),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const NOW: i64 = 1_700_000_000_000;

  #[test]
  fn test_flat_legacy_record() {
    let issue = normalize_issue_at(
      &json!({
        "id": "legacy-1",
        "type": "issue",
        "title": "Login broken",
        "description": "Cannot sign in",
        "status": "closed",
        "createdAt": 1_600_000_000_000_i64,
        "reportedBy": "@ana"
      }),
      NOW,
    );

    assert_eq!(issue.id.as_deref(), Some("legacy-1"));
    assert_eq!(issue.title, "Login broken");
    assert_eq!(issue.content, "Cannot sign in");
    assert_eq!(issue.category, "General");
    assert_eq!(issue.status, IssueStatus::Open);
    assert_eq!(issue.created_by_name.as_deref(), Some("@ana"));
    assert_eq!(issue.date_key, "2020-09-13");
    assert_eq!(issue.issue_number, None);
  }

  #[test]
  fn test_nested_record() {
    let issue = normalize_issue_at(
      &json!({
        "id": "outer",
        "data": {
          "type": "Issue",
          "title": "Crash",
          "content": "Boom",
          "category": "Bug",
          "status": "Solved",
          "createdAt": NOW,
          "dateKey": "2023-11-14",
          "createdBy": "u1",
          "createdByName": "Una",
          "issueNumber": 4,
          "attachments": ["media:a.png", 5, "media:b.png"],
          "isBug": true
        }
      }),
      0,
    );

    assert_eq!(issue.id.as_deref(), Some("outer"));
    assert_eq!(issue.status, IssueStatus::Solved);
    assert_eq!(issue.category, "Bug");
    assert_eq!(issue.created_by.as_deref(), Some("u1"));
    assert_eq!(issue.issue_number, Some(4));
    assert_eq!(
      issue.attachments,
      Some(vec!["media:a.png".to_string(), "media:b.png".to_string()])
    );
    assert_eq!(issue.is_bug, Some(true));
  }

  #[test]
  fn test_inner_id_wins_over_outer() {
    let issue = normalize_issue_at(&json!({"id": "outer", "data": {"id": "inner"}}), NOW);
    assert_eq!(issue.id.as_deref(), Some("inner"));
  }

  #[test]
  fn test_defaults_for_empty_record() {
    let issue = normalize_issue_at(&json!({}), NOW);
    assert_eq!(issue.id, None);
    assert_eq!(issue.title, "Untitled");
    assert_eq!(issue.content, "");
    assert_eq!(issue.category, "General");
    assert_eq!(issue.status, IssueStatus::Open);
    assert_eq!(issue.created_at, NOW);
    assert_eq!(issue.date_key, "2023-11-14");
  }

  #[test]
  fn test_blank_text_fields_take_defaults() {
    let issue = normalize_issue_at(
      &json!({"title": "   ", "category": "\t", "dateKey": " ", "createdAt": NOW}),
      0,
    );
    assert_eq!(issue.title, "Untitled");
    assert_eq!(issue.category, "General");
    assert_eq!(issue.date_key, "2023-11-14");
  }

  #[test]
  fn test_long_title_truncated() {
    let issue = normalize_issue_at(&json!({"title": "t".repeat(80)}), NOW);
    assert_eq!(issue.title.len(), 50);
  }

  #[test]
  fn test_idempotent_on_canonical_issue() {
    let first = normalize_issue_at(
      &json!({
        "id": "x",
        "data": {"title": "Slow search", "content": "It lags", "createdAt": NOW,
                 "status": "Rejected", "attachments": [], "issueNumber": 9}
      }),
      NOW,
    );
    let again = normalize_issue_at(&serde_json::to_value(&first).unwrap(), NOW + 1);
    assert_eq!(first, again);

    let via_data = normalize_issue_at(
      &json!({"id": "x", "data": Value::Object(first.to_data())}),
      NOW + 1,
    );
    assert_eq!(first, via_data);
  }

  #[test]
  fn test_never_panics_on_odd_input() {
    let inputs = [
      json!(null),
      json!(42),
      json!("issue"),
      json!([1, 2, 3]),
      json!({"data": null, "id": null}),
      json!({"data": [1]}),
      json!({"title": 7, "content": {"x": 1}, "category": [], "status": 3}),
      json!({"createdAt": "yesterday", "dateKey": false, "issueNumber": -3}),
      json!({"createdAt": 1.5e300, "issueNumber": "12", "attachments": "a.png"}),
      json!({"createdAt": f64::MAX, "isBug": "yes", "createdBy": 1}),
    ];
    for input in inputs {
      let issue = normalize_issue_at(&input, NOW);
      assert!(!issue.title.is_empty());
      assert_eq!(issue.date_key.len(), 10);
    }
  }

  #[test]
  fn test_comment_normalization() {
    let comment = normalize_comment(&json!({
      "id": "c1",
      "data": {"type": "Comment", "issueId": "i1", "content": "Same here",
               "createdBy": "u2", "createdByName": "Bo", "createdAt": 5}
    }));
    assert_eq!(comment.id.as_deref(), Some("c1"));
    assert_eq!(comment.issue_id, "i1");
    assert_eq!(comment.created_at, 5);
    assert_eq!(normalize_comment(&json!(null)).content, "");
  }
}
