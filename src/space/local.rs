use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::{
  record_id, Data, ObjectPage, ObjectQuery, Space, SpaceError, SpaceErrorKind, SpaceEvent,
  UserIdentity,
};

const MEDIA_PREFIX: &str = "media:";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
  #[serde(default)]
  objects: Vec<Value>,
}

/// A space kept in one JSON file, with uploaded media in a `media/`
/// directory beside it. Each call re-reads the file so that several
/// processes sharing a store see each other's writes.
pub struct LocalSpace {
  path: PathBuf,
  media_dir: PathBuf,
  user: Option<UserIdentity>,
  lock: Mutex<()>,
  events: broadcast::Sender<SpaceEvent>,
}

impl LocalSpace {
  pub fn open(path: &Path, user: Option<UserIdentity>) -> Self {
    let media_dir = path
      .parent()
      .map(|p| p.join("media"))
      .unwrap_or_else(|| PathBuf::from("media"));
    let (events, _) = broadcast::channel(64);
    Self {
      path: path.to_path_buf(),
      media_dir,
      user,
      lock: Mutex::new(()),
      events,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn load(&self) -> Result<StoreFile, SpaceError> {
    if !self.path.exists() {
      return Ok(StoreFile::default());
    }
    let content = std::fs::read_to_string(&self.path)?;
    if content.trim().is_empty() {
      return Ok(StoreFile::default());
    }
    serde_json::from_str(&content).map_err(|e| {
      SpaceError::new(
        SpaceErrorKind::Unavailable,
        format!("corrupt store {}: {e}", self.path.display()),
      )
    })
  }

  fn save(&self, store: &StoreFile) -> Result<(), SpaceError> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(store)
      .map_err(|e| SpaceError::new(SpaceErrorKind::Other, e.to_string()))?;
    let tmp = self.path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &self.path)?;
    Ok(())
  }

  fn notify(&self, event: SpaceEvent) {
    // no receivers is fine
    let _ = self.events.send(event);
  }
}

fn parse_cursor(cursor: Option<&str>) -> Result<usize, SpaceError> {
  match cursor {
    None => Ok(0),
    Some(c) => c
      .parse()
      .map_err(|_| SpaceError::new(SpaceErrorKind::Other, format!("invalid cursor: {c}"))),
  }
}

fn merge_into(record: &mut Value, patch: Data) {
  let Some(obj) = record.as_object_mut() else {
    return;
  };
  let target = if obj.get("data").is_some_and(Value::is_object) {
    obj.get_mut("data").and_then(Value::as_object_mut)
  } else {
    Some(obj)
  };
  if let Some(target) = target {
    for (key, value) in patch {
      target.insert(key, value);
    }
  }
}

impl Space for LocalSpace {
  fn current_user(&self) -> Option<UserIdentity> {
    self.user.clone()
  }

  async fn find_objects(&self, query: &ObjectQuery) -> Result<ObjectPage, SpaceError> {
    let _guard = self.lock.lock().await;
    let store = self.load()?;
    let offset = parse_cursor(query.cursor.as_deref())?;
    let limit = query.limit.max(1);

    let matching: Vec<&Value> = store.objects.iter().filter(|r| query.matches(r)).collect();
    let objects: Vec<Value> = matching
      .iter()
      .skip(offset)
      .take(limit)
      .map(|r| (*r).clone())
      .collect();
    let next = offset + objects.len();
    let cursor = (next < matching.len()).then(|| next.to_string());

    debug!(
      "find_objects {:?}: {} of {} matching",
      query.filters,
      objects.len(),
      matching.len()
    );
    Ok(ObjectPage { objects, cursor })
  }

  async fn create_object(&self, data: Data) -> Result<String, SpaceError> {
    let guard = self.lock.lock().await;
    let mut store = self.load()?;
    let id = uuid::Uuid::new_v4().to_string();
    store
      .objects
      .push(serde_json::json!({ "id": id, "data": Value::Object(data) }));
    self.save(&store)?;
    drop(guard);

    info!("created object {id}");
    self.notify(SpaceEvent::ObjectCreated(id.clone()));
    Ok(id)
  }

  async fn update_object(&self, id: &str, patch: Data) -> Result<(), SpaceError> {
    let guard = self.lock.lock().await;
    let mut store = self.load()?;
    let record = store
      .objects
      .iter_mut()
      .find(|r| record_id(r).as_deref() == Some(id))
      .ok_or_else(|| SpaceError::not_found(format!("object {id}")))?;
    merge_into(record, patch);
    self.save(&store)?;
    drop(guard);

    debug!("updated object {id}");
    self.notify(SpaceEvent::ObjectUpdated(id.to_string()));
    Ok(())
  }

  async fn upload_media(&self, path: &Path) -> Result<String, SpaceError> {
    let bytes = std::fs::read(path)?;
    let name = match path.extension().and_then(|e| e.to_str()) {
      Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext.to_ascii_lowercase()),
      None => uuid::Uuid::new_v4().to_string(),
    };
    std::fs::create_dir_all(&self.media_dir)?;
    std::fs::write(self.media_dir.join(&name), bytes)?;
    info!("uploaded {} as {name}", path.display());
    Ok(format!("{MEDIA_PREFIX}{name}"))
  }

  async fn fetch_media(&self, reference: &str) -> Result<Vec<u8>, SpaceError> {
    let name = reference
      .strip_prefix(MEDIA_PREFIX)
      .filter(|n| !n.is_empty() && !n.contains(['/', '\\']) && !n.contains(".."))
      .ok_or_else(|| SpaceError::not_found(format!("not a local media reference: {reference}")))?;
    Ok(std::fs::read(self.media_dir.join(name))?)
  }

  fn subscribe(&self) -> broadcast::Receiver<SpaceEvent> {
    self.events.subscribe()
  }
}
