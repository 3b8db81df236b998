use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;

use super::{
  record_id, Data, ObjectPage, ObjectQuery, Space, SpaceError, SpaceErrorKind, SpaceEvent,
  UserIdentity,
};

/// In-memory space with failure injection for unit tests.
pub struct FakeSpace {
  pub records: Mutex<Vec<Value>>,
  pub user: Option<UserIdentity>,
  pub updates: Mutex<Vec<(String, Data)>>,
  pub creates: AtomicUsize,
  pub finds: AtomicUsize,
  pub rate_limit_updates: AtomicUsize,
  pub rate_limit_creates: AtomicUsize,
  pub failing_ids: Mutex<HashSet<String>>,
  pub fail_finds: AtomicBool,
  next_id: AtomicUsize,
  events: broadcast::Sender<SpaceEvent>,
}

impl FakeSpace {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      records: Mutex::new(Vec::new()),
      user: Some(UserIdentity {
        id: "user-1".into(),
        name: Some("Test User".into()),
      }),
      updates: Mutex::new(Vec::new()),
      creates: AtomicUsize::new(0),
      finds: AtomicUsize::new(0),
      rate_limit_updates: AtomicUsize::new(0),
      rate_limit_creates: AtomicUsize::new(0),
      failing_ids: Mutex::new(HashSet::new()),
      fail_finds: AtomicBool::new(false),
      next_id: AtomicUsize::new(1),
      events,
    }
  }

  pub fn with_records(records: Vec<Value>) -> Self {
    let space = Self::new();
    *space.records.lock().unwrap() = records;
    space
  }

  pub fn signed_out() -> Self {
    Self {
      user: None,
      ..Self::new()
    }
  }

  pub fn fail_updates_for(&self, id: &str) {
    self.failing_ids.lock().unwrap().insert(id.to_string());
  }

  pub fn update_count(&self) -> usize {
    self.updates.lock().unwrap().len()
  }

  pub fn record(&self, id: &str) -> Option<Value> {
    self
      .records
      .lock()
      .unwrap()
      .iter()
      .find(|r| record_id(r).as_deref() == Some(id))
      .cloned()
  }

  fn read_page(&self, query: &ObjectQuery) -> Result<ObjectPage, SpaceError> {
    if self.fail_finds.load(Ordering::SeqCst) {
      return Err(SpaceError::new(SpaceErrorKind::Unavailable, "backend down"));
    }
    let offset: usize = query.cursor.as_deref().map_or(0, |c| c.parse().unwrap());
    let records = self.records.lock().unwrap();
    let matching: Vec<&Value> = records.iter().filter(|r| query.matches(r)).collect();
    let objects: Vec<Value> = matching
      .iter()
      .skip(offset)
      .take(query.limit.max(1))
      .map(|r| (*r).clone())
      .collect();
    let next = offset + objects.len();
    let cursor = (next < matching.len()).then(|| next.to_string());
    Ok(ObjectPage { objects, cursor })
  }

  fn take_one(counter: &AtomicUsize) -> bool {
    counter
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok()
  }
}

impl Space for FakeSpace {
  fn current_user(&self) -> Option<UserIdentity> {
    self.user.clone()
  }

  async fn find_objects(&self, query: &ObjectQuery) -> Result<ObjectPage, SpaceError> {
    self.finds.fetch_add(1, Ordering::SeqCst);
    let result = self.read_page(query);
    // hands back a snapshot taken before the yield, so concurrent callers
    // can both act on the same read
    tokio::task::yield_now().await;
    result
  }

  async fn create_object(&self, data: Data) -> Result<String, SpaceError> {
    if Self::take_one(&self.rate_limit_creates) {
      return Err(SpaceError::rate_limited("429 Too Many Requests"));
    }
    self.creates.fetch_add(1, Ordering::SeqCst);
    let id = format!("obj-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
    self
      .records
      .lock()
      .unwrap()
      .push(serde_json::json!({ "id": id, "data": Value::Object(data) }));
    let _ = self.events.send(SpaceEvent::ObjectCreated(id.clone()));
    Ok(id)
  }

  async fn update_object(&self, id: &str, patch: Data) -> Result<(), SpaceError> {
    if self.failing_ids.lock().unwrap().contains(id) {
      return Err(SpaceError::new(SpaceErrorKind::Other, format!("write to {id} failed")));
    }
    if Self::take_one(&self.rate_limit_updates) {
      return Err(SpaceError::rate_limited("429 Too Many Requests"));
    }
    {
      let mut records = self.records.lock().unwrap();
      let record = records
        .iter_mut()
        .find(|r| record_id(r).as_deref() == Some(id))
        .ok_or_else(|| SpaceError::not_found(id.to_string()))?;
      let obj = record.as_object_mut().unwrap();
      let target = if obj.get("data").is_some_and(Value::is_object) {
        obj.get_mut("data").and_then(Value::as_object_mut).unwrap()
      } else {
        obj
      };
      for (k, v) in patch.clone() {
        target.insert(k, v);
      }
    }
    self.updates.lock().unwrap().push((id.to_string(), patch));
    let _ = self.events.send(SpaceEvent::ObjectUpdated(id.to_string()));
    Ok(())
  }

  async fn upload_media(&self, path: &Path) -> Result<String, SpaceError> {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| SpaceError::not_found(path.display().to_string()))?;
    Ok(format!("fake-media:{name}"))
  }

  async fn fetch_media(&self, reference: &str) -> Result<Vec<u8>, SpaceError> {
    Ok(reference.as_bytes().to_vec())
  }

  fn subscribe(&self) -> broadcast::Receiver<SpaceEvent> {
    self.events.subscribe()
  }
}
