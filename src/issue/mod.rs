pub mod content;
pub mod normalize;
pub mod numbering;
pub mod search;
pub mod validate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::space::Data;

pub use content::{parse_content, ParsedContent, SUMMARY_SEPARATOR};
pub use normalize::{normalize_comment, normalize_issue};

/// Type tag written on every issue record.
pub const ISSUE_TYPE: &str = "Issue";
/// Lowercase tag found on records written before the tag was standardized.
pub const LEGACY_ISSUE_TYPE: &str = "issue";
pub const COMMENT_TYPE: &str = "Comment";

pub const TITLE_MAX_CHARS: usize = 50;
pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum IssueStatus {
  #[default]
  Open,
  Solved,
  Rejected,
}

impl IssueStatus {
  pub const ALL: [IssueStatus; 3] = [IssueStatus::Open, IssueStatus::Solved, IssueStatus::Rejected];

  /// Stored values other than exactly `"Solved"` or `"Rejected"` read as Open.
  pub fn from_stored(value: Option<&Value>) -> Self {
    match value.and_then(Value::as_str) {
      Some("Solved") => IssueStatus::Solved,
      Some("Rejected") => IssueStatus::Rejected,
      _ => IssueStatus::Open,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      IssueStatus::Open => "Open",
      IssueStatus::Solved => "Solved",
      IssueStatus::Rejected => "Rejected",
    }
  }
}

impl std::fmt::Display for IssueStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for IssueStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| format!("unknown status {s:?} (expected Open, Solved or Rejected)"))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub title: String,
  pub content: String,
  pub category: String,
  pub status: IssueStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_by: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_by_name: Option<String>,
  pub created_at: i64,
  pub date_key: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub issue_number: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub attachments: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_bug: Option<bool>,
  /// Outer id the space keys the record by, when it differs from `id`.
  #[serde(skip)]
  pub storage_id: Option<String>,
}

impl Issue {
  /// Id to address writes to: the space's key for the record.
  pub fn write_id(&self) -> Option<&str> {
    self.storage_id.as_deref().or(self.id.as_deref())
  }

  /// Legacy records without an author are editable by anyone.
  pub fn can_edit(&self, user_id: &str) -> bool {
    self.created_by.as_deref().map_or(true, |owner| owner == user_id)
  }

  pub fn display_title(&self) -> &str {
    truncate_title(&self.title)
  }

  pub fn parsed_content(&self) -> ParsedContent {
    parse_content(Some(&self.content))
  }

  /// Record data as written to the space, canonical type tag included.
  pub fn to_data(&self) -> Data {
    let mut data = match serde_json::to_value(self) {
      Ok(Value::Object(map)) => map,
      _ => Data::new(),
    };
    data.remove("id");
    data.insert("type".into(), Value::String(ISSUE_TYPE.into()));
    data
  }
}

impl std::fmt::Display for Issue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.issue_number {
      Some(n) => write!(f, "#{n} {}", self.display_title()),
      None => write!(f, "#- {}", self.display_title()),
    }
  }
}

/// Fields a caller supplies when approving a new issue.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
  pub title: String,
  pub content: String,
  pub category: String,
  pub status: IssueStatus,
  pub is_bug: Option<bool>,
  pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub issue_id: String,
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_by: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_by_name: Option<String>,
  pub created_at: i64,
}

impl Comment {
  pub fn to_data(&self) -> Data {
    let mut data = match serde_json::to_value(self) {
      Ok(Value::Object(map)) => map,
      _ => Data::new(),
    };
    data.remove("id");
    data.insert("type".into(), Value::String(COMMENT_TYPE.into()));
    data
  }

  /// Author label with any leading `@` handles stripped.
  pub fn author(&self) -> &str {
    self
      .created_by_name
      .as_deref()
      .map(|n| n.trim_start_matches('@'))
      .filter(|n| !n.is_empty())
      .unwrap_or("Unknown User")
  }
}

pub fn truncate_title(title: &str) -> &str {
  match title.char_indices().nth(TITLE_MAX_CHARS) {
    Some((idx, _)) => &title[..idx],
    None => title,
  }
}

/// First whitespace-separated word of `input`, or the default category.
pub fn category_token(input: &str) -> String {
  input
    .split_whitespace()
    .next()
    .unwrap_or(DEFAULT_CATEGORY)
    .to_string()
}

pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

/// UTC calendar day of an epoch-millisecond timestamp, as `YYYY-MM-DD`.
pub fn date_key(created_at: i64) -> String {
  DateTime::<Utc>::from_timestamp_millis(created_at)
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    .format("%Y-%m-%d")
    .to_string()
}

pub fn format_date(created_at: i64) -> String {
  DateTime::<Utc>::from_timestamp_millis(created_at)
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    .format("%-d %B %Y")
    .to_string()
}
