//! The conversation that turns into an issue.
//!
//! Messages, the draft input and the pending summary are kept in a snapshot
//! file between invocations and dropped once the issue is approved.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::assistant::{parse_summary, Assistant, IssueSummary, SUMMARY_PROMPT};
use crate::desk::Desk;
use crate::error::{DeskError, Result};
use crate::issue::{Issue, NewIssue, SUMMARY_SEPARATOR};
use crate::space::Space;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

impl Role {
  fn label(&self) -> &'static str {
    match self {
      Role::User => "User",
      Role::Assistant => "Assistant",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChatState {
  pub messages: Vec<ChatMessage>,
  pub input: String,
  pub summary: Option<IssueSummary>,
}

impl ChatState {
  pub fn is_empty(&self) -> bool {
    self.messages.is_empty() && self.input.is_empty() && self.summary.is_none()
  }
}

pub struct ChatStore {
  path: PathBuf,
}

impl ChatStore {
  pub fn new(path: &Path) -> Self {
    Self {
      path: path.to_path_buf(),
    }
  }

  /// The saved snapshot. Missing or unreadable snapshots, and fields of the
  /// wrong shape, read as empty.
  pub fn load(&self) -> ChatState {
    let content = match std::fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(_) => return ChatState::default(),
    };
    let value: Value = match serde_json::from_str(&content) {
      Ok(value @ Value::Object(_)) => value,
      Ok(_) | Err(_) => {
        warn!("ignoring corrupt chat state at {}", self.path.display());
        return ChatState::default();
      }
    };

    ChatState {
      messages: value
        .get("messages")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default(),
      input: value
        .get("input")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string(),
      summary: value
        .get("summary")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok()),
    }
  }

  /// Best effort: a failed write is logged and otherwise ignored.
  pub fn save(&self, state: &ChatState) {
    let result = (|| -> Result<()> {
      if let Some(parent) = self.path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(&self.path, serde_json::to_string(state)?)?;
      Ok(())
    })();
    if let Err(e) = result {
      warn!("could not save chat state: {e}");
    }
  }

  pub fn clear(&self) {
    match std::fs::remove_file(&self.path) {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => warn!("could not clear chat state: {e}"),
    }
  }
}

/// `User: ..` / `Assistant: ..` lines separated by blank lines.
pub fn transcript(messages: &[ChatMessage]) -> String {
  messages
    .iter()
    .map(|m| format!("{}: {}", m.role.label(), m.content))
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// Stored content of an approved issue: the conversation, then the summary
/// after the separator the content parser looks for.
pub fn approved_content(messages: &[ChatMessage], summary: &IssueSummary) -> String {
  format!(
    "{}\n{}{}",
    transcript(messages),
    SUMMARY_SEPARATOR,
    summary.summary
  )
}

/// Sends `message` with the conversation so far and records both turns.
pub async fn send_message<A: Assistant>(
  assistant: &A,
  state: &mut ChatState,
  message: &str,
) -> Result<String> {
  let message = message.trim();
  if message.is_empty() {
    return Err(DeskError::Invalid("message cannot be empty".into()));
  }

  let user_turn = ChatMessage {
    role: Role::User,
    content: message.to_string(),
  };
  let mut history = state.messages.clone();
  history.push(user_turn.clone());

  let reply = assistant.prompt(&transcript(&history)).await?;
  state.messages.push(user_turn);
  state.messages.push(ChatMessage {
    role: Role::Assistant,
    content: reply.clone(),
  });
  state.input.clear();
  Ok(reply)
}

pub async fn request_summary<A: Assistant>(assistant: &A, state: &mut ChatState) -> Result<IssueSummary> {
  if state.messages.is_empty() {
    return Err(DeskError::Invalid("nothing to summarize yet".into()));
  }
  let prompt = format!("{}\n\n{SUMMARY_PROMPT}", transcript(&state.messages));
  let raw = assistant.prompt(&prompt).await?;
  let summary = parse_summary(&raw);
  state.summary = Some(summary.clone());
  Ok(summary)
}

/// Saves the pending summary as an issue and resets the conversation.
pub async fn approve<S: Space>(desk: &Desk<S>, state: &mut ChatState) -> Result<Issue> {
  let summary = state
    .summary
    .clone()
    .ok_or_else(|| DeskError::Invalid("no summary to approve; summarize first".into()))?;

  let issue = desk
    .create_issue(NewIssue {
      title: summary.title.clone(),
      content: approved_content(&state.messages, &summary),
      category: summary.category.clone(),
      status: summary.status,
      is_bug: summary.is_bug,
      attachments: Vec::new(),
    })
    .await?;

  info!("approved conversation as issue {}", issue);
  *state = ChatState::default();
  Ok(issue)
}
