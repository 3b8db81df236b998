//! The backing object store, seen from the client side.
//!
//! Everything the desk persists goes through [`Space`]: object queries,
//! partial updates, media, and change notifications. Records come back as
//! raw JSON in whatever shape they were stored; turning them into typed
//! values is the normalizer's job.

pub mod local;
pub mod retry;
#[cfg(test)]
pub mod testing;

use std::future::Future;
use std::path::Path;

use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub use local::LocalSpace;
pub use retry::retry_once_on_rate_limit;

pub type Data = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
  pub id: String,
  pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceEvent {
  ObjectCreated(String),
  ObjectUpdated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceErrorKind {
  RateLimited,
  NotFound,
  Unauthorized,
  Unavailable,
  Other,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct SpaceError {
  pub kind: SpaceErrorKind,
  pub message: String,
}

impl SpaceError {
  pub fn new(kind: SpaceErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn rate_limited(message: impl Into<String>) -> Self {
    Self::new(SpaceErrorKind::RateLimited, message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(SpaceErrorKind::NotFound, message)
  }

  pub fn is_rate_limited(&self) -> bool {
    self.kind == SpaceErrorKind::RateLimited
  }
}

impl From<std::io::Error> for SpaceError {
  fn from(e: std::io::Error) -> Self {
    let kind = match e.kind() {
      std::io::ErrorKind::NotFound => SpaceErrorKind::NotFound,
      std::io::ErrorKind::PermissionDenied => SpaceErrorKind::Unauthorized,
      _ => SpaceErrorKind::Unavailable,
    };
    Self::new(kind, e.to_string())
  }
}

/// Equality filters over a record's data fields plus paging.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectQuery {
  pub filters: Vec<(String, Value)>,
  pub limit: usize,
  pub cursor: Option<String>,
}

impl ObjectQuery {
  pub fn of_type(type_tag: &str) -> Self {
    Self {
      filters: vec![("type".to_string(), Value::String(type_tag.to_string()))],
      limit: 100,
      cursor: None,
    }
  }

  pub fn with_field(mut self, field: &str, value: impl Into<Value>) -> Self {
    self.filters.push((field.to_string(), value.into()));
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  pub fn after(mut self, cursor: Option<String>) -> Self {
    self.cursor = cursor;
    self
  }

  pub fn matches(&self, record: &Value) -> bool {
    let data = record_data(record);
    self
      .filters
      .iter()
      .all(|(field, expected)| data.and_then(|d| d.get(field)) == Some(expected))
  }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
  pub objects: Vec<Value>,
  /// `None` on the last page.
  pub cursor: Option<String>,
}

/// The fields of a stored record, whether it is flat or wrapped in `data`.
pub fn record_data(record: &Value) -> Option<&Data> {
  let obj = record.as_object()?;
  match obj.get("data").and_then(Value::as_object) {
    Some(inner) => Some(inner),
    None => Some(obj),
  }
}

/// The storage id of a record: the outer `id`, else the one inside `data`.
pub fn record_id(record: &Value) -> Option<String> {
  let outer = record.get("id").and_then(id_string);
  outer.or_else(|| record_data(record)?.get("id").and_then(id_string))
}

fn id_string(v: &Value) -> Option<String> {
  match v {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

pub trait Space: Send + Sync {
  fn current_user(&self) -> Option<UserIdentity>;

  fn find_objects(
    &self,
    query: &ObjectQuery,
  ) -> impl Future<Output = Result<ObjectPage, SpaceError>> + Send;

  fn create_object(&self, data: Data) -> impl Future<Output = Result<String, SpaceError>> + Send;

  /// Shallow-merges `patch` into the record's data.
  fn update_object(
    &self,
    id: &str,
    patch: Data,
  ) -> impl Future<Output = Result<(), SpaceError>> + Send;

  fn upload_media(&self, path: &Path) -> impl Future<Output = Result<String, SpaceError>> + Send;

  fn fetch_media(
    &self,
    reference: &str,
  ) -> impl Future<Output = Result<Vec<u8>, SpaceError>> + Send;

  fn subscribe(&self) -> broadcast::Receiver<SpaceEvent>;
}

/// Reads every page of `query`, following cursors until the last page.
pub async fn find_all<S: Space>(space: &S, query: ObjectQuery) -> Result<Vec<Value>, SpaceError> {
  let mut objects = Vec::new();
  let mut query = query;
  loop {
    let page = space.find_objects(&query).await?;
    objects.extend(page.objects);
    match page.cursor {
      Some(cursor) => query = query.after(Some(cursor)),
      None => return Ok(objects),
    }
  }
}
