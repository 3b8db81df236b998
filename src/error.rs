use std::path::PathBuf;

use crate::space::SpaceError;

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
  #[error("config error: {0}")]
  Config(String),

  #[error("config file not found: {0}")]
  ConfigNotFound(PathBuf),

  #[error("not signed in: set user.id in the config or ISSUE_DESK_USER_ID, then retry")]
  NotSignedIn,

  #[error("issue {issue_id} belongs to {owner}; only its author can edit it")]
  Forbidden { issue_id: String, owner: String },

  #[error("invalid input: {0}")]
  Invalid(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("space error: {0}")]
  Space(#[from] SpaceError),

  #[error("assistant error: {0}")]
  Assistant(String),

  #[error("timeout: {0}")]
  Timeout(String),

  #[error("migration {name} failed: {source}")]
  Migration {
    name: String,
    #[source]
    source: Box<DeskError>,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("yaml error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl DeskError {
  pub fn is_rate_limited(&self) -> bool {
    matches!(self, DeskError::Space(e) if e.is_rate_limited())
  }
}

pub type Result<T> = std::result::Result<T, DeskError>;
