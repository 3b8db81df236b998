//! `001_initial_normalization`: rewrites every issue record in canonical
//! form so older records stop depending on read-time fallbacks.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Migration, MigrationFuture};
use crate::config::MigrationSettings;
use crate::error::Result;
use crate::issue::{normalize_issue, ISSUE_TYPE, LEGACY_ISSUE_TYPE};
use crate::space::{find_all, record_data, record_id, retry_once_on_rate_limit, Data, ObjectQuery, Space};

pub struct InitialNormalization;

impl<S: Space> Migration<S> for InitialNormalization {
  fn name(&self) -> &'static str {
    "001_initial_normalization"
  }

  fn up<'a>(&'a self, space: &'a S, settings: &'a MigrationSettings) -> MigrationFuture<'a> {
    Box::pin(normalize_all(space, settings))
  }
}

/// Fields a stored record is missing or holds in a legacy form: the
/// `type` tag, `content` (from `description`), `createdAt`, `dateKey` and
/// absent defaults. A title or status that is present is left alone, so no
/// stored text is shortened or replaced. Empty when nothing needs repair.
pub fn repair_patch(record: &Value) -> Data {
  let issue = normalize_issue(record);
  let stored = record_data(record);
  let field = |key: &str| stored.and_then(|s| s.get(key));
  let blank = |key: &str| field(key).and_then(Value::as_str).map_or(true, |s| s.trim().is_empty());

  let mut patch = Data::new();
  if field("type").and_then(Value::as_str) != Some(ISSUE_TYPE) {
    patch.insert("type".into(), Value::from(ISSUE_TYPE));
  }
  if field("content").and_then(Value::as_str).is_none() {
    patch.insert("content".into(), Value::from(issue.content));
  }
  if field("createdAt").and_then(Value::as_i64).is_none() {
    patch.insert("createdAt".into(), Value::from(issue.created_at));
  }
  if blank("dateKey") {
    patch.insert("dateKey".into(), Value::from(issue.date_key));
  }
  if blank("title") {
    patch.insert("title".into(), Value::from(issue.title));
  }
  if blank("category") {
    patch.insert("category".into(), Value::from(issue.category));
  }
  if field("status").and_then(Value::as_str).is_none() {
    patch.insert("status".into(), Value::from(issue.status.as_str()));
  }
  patch
}

/// Writes each record's repair patch. `update_delay` is slept between two
/// writes only: records that need no repair are skipped without a pause,
/// and there is no pause after the last write.
async fn normalize_all<S: Space>(space: &S, settings: &MigrationSettings) -> Result<()> {
  let mut seen = HashSet::new();
  let mut records = Vec::new();
  for tag in [LEGACY_ISSUE_TYPE, ISSUE_TYPE] {
    let query = ObjectQuery::of_type(tag).limit(settings.page_size);
    for record in find_all(space, query).await? {
      match record_id(&record) {
        Some(id) if seen.insert(id.clone()) => records.push((id, record)),
        Some(_) => {}
        None => warn!("skipping issue record without an id"),
      }
    }
  }
  info!("found {} issue record(s)", records.len());

  let mut written = 0usize;
  for (id, record) in &records {
    let patch = repair_patch(record);
    if patch.is_empty() {
      debug!("{id} is already canonical");
      continue;
    }
    if written > 0 {
      tokio::time::sleep(settings.update_delay()).await;
    }

    let fields: Vec<&str> = patch.keys().map(String::as_str).collect();
    debug!("normalizing {id}: {}", fields.join(", "));
    retry_once_on_rate_limit(settings.rate_limit_backoff(), &format!("update of {id}"), || {
      space.update_object(id, patch.clone())
    })
    .await?;
    written += 1;
  }

  info!(
    "normalized {written} record(s), {} already canonical",
    records.len() - written
  );
  Ok(())
}
