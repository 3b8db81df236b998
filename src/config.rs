use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};
use crate::space::UserIdentity;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
  #[serde(default)]
  pub space: SpaceConfig,
  #[serde(default)]
  pub user: UserConfig,
  #[serde(default)]
  pub settings: Settings,
  #[serde(default)]
  pub assistant: AssistantConfig,
  #[serde(default)]
  pub migrations: MigrationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
  #[serde(default = "default_space_name")]
  pub name: String,
  #[serde(default = "default_store")]
  pub store: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
  pub id: Option<String>,
  pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
  #[serde(default = "default_list_limit")]
  pub list_limit: usize,
  #[serde(default = "default_number_scan_limit")]
  pub number_scan_limit: usize,
  #[serde(default = "default_assign_numbers_on_load")]
  pub assign_numbers_on_load: bool,
  #[serde(default = "default_chat_state_file")]
  pub chat_state_file: PathBuf,
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u64,
  #[serde(default = "default_base_url")]
  pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
  #[serde(default = "default_assistant_command")]
  pub command: String,
  #[serde(default = "default_assistant_args")]
  pub args: Vec<String>,
  #[serde(default = "default_assistant_timeout")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationSettings {
  #[serde(default = "default_page_size")]
  pub page_size: usize,
  #[serde(default = "default_update_delay")]
  pub update_delay_secs: u64,
  #[serde(default = "default_rate_limit_backoff")]
  pub rate_limit_backoff_secs: u64,
}

impl Default for SpaceConfig {
  fn default() -> Self {
    Self {
      name: default_space_name(),
      store: default_store(),
    }
  }
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      list_limit: default_list_limit(),
      number_scan_limit: default_number_scan_limit(),
      assign_numbers_on_load: default_assign_numbers_on_load(),
      chat_state_file: default_chat_state_file(),
      poll_interval_secs: default_poll_interval(),
      base_url: default_base_url(),
    }
  }
}

impl Default for AssistantConfig {
  fn default() -> Self {
    Self {
      command: default_assistant_command(),
      args: default_assistant_args(),
      timeout_secs: default_assistant_timeout(),
    }
  }
}

impl Default for MigrationSettings {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      update_delay_secs: default_update_delay(),
      rate_limit_backoff_secs: default_rate_limit_backoff(),
    }
  }
}

fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
    .join(".issue-desk")
}
fn default_space_name() -> String {
  "Issue Desk".to_string()
}
fn default_store() -> PathBuf {
  home_dir().join("space.json")
}
fn default_list_limit() -> usize {
  200
}
fn default_number_scan_limit() -> usize {
  500
}
fn default_assign_numbers_on_load() -> bool {
  true
}
fn default_chat_state_file() -> PathBuf {
  home_dir().join("chat-state.json")
}
fn default_poll_interval() -> u64 {
  30
}
fn default_base_url() -> String {
  "/issue-desk/".to_string()
}
fn default_assistant_command() -> String {
  "claude".to_string()
}
fn default_assistant_args() -> Vec<String> {
  vec!["-p".into()]
}
fn default_assistant_timeout() -> u64 {
  120
}
fn default_page_size() -> usize {
  500
}
fn default_update_delay() -> u64 {
  5
}
fn default_rate_limit_backoff() -> u64 {
  30
}

impl Config {
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Err(DeskError::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = serde_yaml::from_str(&content)?;
    config.user.apply_env();
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.settings.list_limit == 0 {
      return Err(DeskError::Config("settings.list_limit must be positive".into()));
    }
    if self.settings.number_scan_limit == 0 {
      return Err(DeskError::Config(
        "settings.number_scan_limit must be positive".into(),
      ));
    }
    if self.migrations.page_size == 0 {
      return Err(DeskError::Config("migrations.page_size must be positive".into()));
    }
    if self.assistant.command.trim().is_empty() {
      return Err(DeskError::Config("assistant.command is empty".into()));
    }
    if let Some(id) = &self.user.id {
      if id.trim().is_empty() {
        return Err(DeskError::Config("user.id is empty".into()));
      }
    }
    Ok(())
  }
}

impl UserConfig {
  /// The configured user, if an id is set.
  pub fn identity(&self) -> Option<UserIdentity> {
    self.id.as_ref().map(|id| UserIdentity {
      id: id.clone(),
      name: self.name.clone(),
    })
  }

  fn apply_env(&mut self) {
    if let Ok(id) = std::env::var("ISSUE_DESK_USER_ID") {
      self.id = Some(id);
    }
    if let Ok(name) = std::env::var("ISSUE_DESK_USER_NAME") {
      self.name = Some(name);
    }
  }
}

impl MigrationSettings {
  pub fn update_delay(&self) -> Duration {
    Duration::from_secs(self.update_delay_secs)
  }

  pub fn rate_limit_backoff(&self) -> Duration {
    Duration::from_secs(self.rate_limit_backoff_secs)
  }
}
