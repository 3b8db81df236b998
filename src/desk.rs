use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{DeskError, Result};
use crate::issue::numbering::{self, NumberingReport};
use crate::issue::search::search_issues;
use crate::issue::{
  category_token, date_key, normalize_comment, normalize_issue, now_millis, truncate_title,
  Comment, Issue, IssueStatus, NewIssue, COMMENT_TYPE, DEFAULT_TITLE, ISSUE_TYPE,
  LEGACY_ISSUE_TYPE,
};
use crate::space::{find_all, record_id, Data, ObjectQuery, Space, UserIdentity};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];

/// Issue operations for one signed-in user over one space.
pub struct Desk<S> {
  space: S,
  user: UserIdentity,
  settings: Settings,
}

impl<S: Space> Desk<S> {
  pub fn new(space: S, settings: Settings) -> Result<Self> {
    let user = space.current_user().ok_or(DeskError::NotSignedIn)?;
    Ok(Self {
      space,
      user,
      settings,
    })
  }

  pub fn space(&self) -> &S {
    &self.space
  }

  pub fn user(&self) -> &UserIdentity {
    &self.user
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  /// All issues, newest first. Read failures give an empty list.
  pub async fn list_issues(&self) -> Vec<Issue> {
    match self.load_issues().await {
      Ok(issues) => issues,
      Err(e) => {
        warn!("failed to load issues: {e}");
        Vec::new()
      }
    }
  }

  async fn load_issues(&self) -> Result<Vec<Issue>> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();

    for tag in [ISSUE_TYPE, LEGACY_ISSUE_TYPE] {
      let page = self
        .space
        .find_objects(&ObjectQuery::of_type(tag).limit(self.settings.list_limit))
        .await?;
      for record in &page.objects {
        if let Some(id) = record_id(record) {
          if !seen.insert(id) {
            continue;
          }
        }
        issues.push(normalize_issue(record));
      }
    }

    issues.sort_by_key(|issue| std::cmp::Reverse(issue.created_at));
    debug!("loaded {} issue(s)", issues.len());
    Ok(issues)
  }

  pub async fn search(&self, query: &str) -> Vec<Issue> {
    if query.trim().is_empty() {
      return Vec::new();
    }
    let issues = self.list_issues().await;
    search_issues(&issues, query)
  }

  pub async fn find_issue(&self, id: &str) -> Result<Issue> {
    self
      .load_issues()
      .await?
      .into_iter()
      .find(|issue| issue.id.as_deref() == Some(id))
      .ok_or_else(|| DeskError::NotFound(format!("issue {id}")))
  }

  pub async fn create_issue(&self, new: NewIssue) -> Result<Issue> {
    let title = match new.title.trim() {
      "" => DEFAULT_TITLE,
      title => truncate_title(title),
    };
    let number = numbering::next_issue_number(&self.space, self.settings.number_scan_limit).await?;
    let now = now_millis();

    let mut issue = Issue {
      id: None,
      title: title.to_string(),
      content: new.content,
      category: category_token(&new.category),
      status: new.status,
      created_by: Some(self.user.id.clone()),
      created_by_name: self.user.name.clone(),
      created_at: now,
      date_key: date_key(now),
      issue_number: Some(number),
      attachments: (!new.attachments.is_empty()).then_some(new.attachments),
      is_bug: new.is_bug,
      storage_id: None,
    };

    let id = self.space.create_object(issue.to_data()).await?;
    info!("created issue {id} as #{number}: {}", issue.title);
    issue.id = Some(id);
    Ok(issue)
  }

  /// The id to write the issue under, provided the current user may edit it.
  fn ensure_can_edit<'i>(&self, issue: &'i Issue) -> Result<&'i str> {
    let id = issue
      .write_id()
      .ok_or_else(|| DeskError::Invalid("issue has not been saved yet".into()))?;
    if !issue.can_edit(&self.user.id) {
      return Err(DeskError::Forbidden {
        issue_id: id.to_string(),
        owner: issue.created_by.clone().unwrap_or_default(),
      });
    }
    Ok(id)
  }

  async fn update_field(&self, id: &str, field: &str, value: Value) -> Result<()> {
    let mut patch = Data::new();
    patch.insert(field.to_string(), value);
    self.space.update_object(id, patch).await?;
    Ok(())
  }

  pub async fn update_status(&self, issue: &Issue, status: IssueStatus) -> Result<Issue> {
    let id = self.ensure_can_edit(issue)?;
    self.update_field(id, "status", Value::from(status.as_str())).await?;
    info!("issue {id}: {} -> {status}", issue.status);
    Ok(Issue {
      status,
      ..issue.clone()
    })
  }

  /// Stores only the first word of `input`.
  pub async fn update_category(&self, issue: &Issue, input: &str) -> Result<Issue> {
    let id = self.ensure_can_edit(issue)?;
    let category = input
      .split_whitespace()
      .next()
      .ok_or_else(|| DeskError::Invalid("category cannot be empty".into()))?
      .to_string();
    self.update_field(id, "category", Value::from(category.as_str())).await?;
    info!("issue {id}: category {} -> {category}", issue.category);
    Ok(Issue {
      category,
      ..issue.clone()
    })
  }

  /// Appends media references to the issue's attachments.
  pub async fn add_attachments(&self, issue: &Issue, references: Vec<String>) -> Result<Issue> {
    let id = self.ensure_can_edit(issue)?;
    if references.is_empty() {
      return Ok(issue.clone());
    }
    let mut attachments = issue.attachments.clone().unwrap_or_default();
    attachments.extend(references);
    self
      .update_field(id, "attachments", Value::from(attachments.clone()))
      .await?;
    info!("issue {id}: {} attachment(s)", attachments.len());
    Ok(Issue {
      attachments: Some(attachments),
      ..issue.clone()
    })
  }

  /// Uploads the image files among `paths` and attaches them.
  pub async fn attach_files(&self, issue: &Issue, paths: &[PathBuf]) -> Result<Issue> {
    self.ensure_can_edit(issue)?;
    let mut references = Vec::new();
    for path in paths {
      if !is_image(path) {
        warn!("skipping {}: not an image", path.display());
        continue;
      }
      references.push(self.space.upload_media(path).await?);
    }
    self.add_attachments(issue, references).await
  }

  pub async fn fetch_attachment(&self, reference: &str) -> Result<Vec<u8>> {
    Ok(self.space.fetch_media(reference).await?)
  }

  pub async fn add_comment(&self, issue_id: &str, text: &str) -> Result<Comment> {
    let text = text.trim();
    if text.is_empty() {
      return Err(DeskError::Invalid("comment cannot be empty".into()));
    }
    let mut comment = Comment {
      id: None,
      issue_id: issue_id.to_string(),
      content: text.to_string(),
      created_by: Some(self.user.id.clone()),
      created_by_name: self.user.name.clone(),
      created_at: now_millis(),
    };
    let id = self.space.create_object(comment.to_data()).await?;
    info!("added comment {id} to issue {issue_id}");
    comment.id = Some(id);
    Ok(comment)
  }

  /// Comments on an issue, oldest first.
  pub async fn list_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
    let query = ObjectQuery::of_type(COMMENT_TYPE)
      .with_field("issueId", issue_id)
      .limit(self.settings.list_limit);
    let mut comments: Vec<Comment> = find_all(&self.space, query)
      .await?
      .iter()
      .map(normalize_comment)
      .collect();
    comments.sort_by_key(|c| c.created_at);
    Ok(comments)
  }

  pub async fn assign_missing_numbers(&self, issues: &mut [Issue]) -> NumberingReport {
    numbering::assign_missing_numbers(&self.space, issues).await
  }
}

fn is_image(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Latest issue list for a long-lived view.
///
/// Every refresh takes a ticket; when a newer refresh starts while an older
/// one is still waiting on the space, the older result is dropped instead
/// of overwriting the newer one.
#[derive(Default)]
pub struct Feed {
  generation: AtomicU64,
  issues: Mutex<Vec<Issue>>,
}

impl Feed {
  pub fn new() -> Self {
    Self::default()
  }

  fn begin(&self) -> u64 {
    self.generation.fetch_add(1, Ordering::SeqCst) + 1
  }

  fn is_current(&self, ticket: u64) -> bool {
    self.generation.load(Ordering::SeqCst) == ticket
  }

  /// Reloads the list; returns false when the result was superseded.
  pub async fn refresh<S: Space>(&self, desk: &Desk<S>) -> bool {
    let ticket = self.begin();
    let mut issues = desk.list_issues().await;
    if !self.is_current(ticket) {
      debug!("discarding superseded refresh #{ticket}");
      return false;
    }

    if desk.settings().assign_numbers_on_load {
      desk.assign_missing_numbers(&mut issues).await;
      if !self.is_current(ticket) {
        debug!("discarding superseded refresh #{ticket}");
        return false;
      }
    }

    match self.issues.lock() {
      Ok(mut current) => *current = issues,
      Err(poisoned) => *poisoned.into_inner() = issues,
    }
    true
  }

  pub fn snapshot(&self) -> Vec<Issue> {
    match self.issues.lock() {
      Ok(current) => current.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}
