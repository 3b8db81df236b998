//! Versioned data upgrades for a space.
//!
//! The space holds one `SchemaInfo` record with the version of the last
//! migration applied. A run applies every migration with a higher version,
//! in order, and bumps the record after each one finishes, so a failed run
//! can be resumed without repeating completed work.

pub mod normalization;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::MigrationSettings;
use crate::error::{DeskError, Result};
use crate::space::{
  record_data, record_id, retry_once_on_rate_limit, Data, ObjectQuery, Space, SpaceError,
};

pub use normalization::InitialNormalization;

pub const SCHEMA_TYPE: &str = "SchemaInfo";

pub type MigrationFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

pub trait Migration<S: Space>: Send + Sync {
  /// `<version>_<description>`, e.g. `001_initial_normalization`.
  fn name(&self) -> &'static str;

  /// Must be safe to run again on data it has already upgraded.
  fn up<'a>(&'a self, space: &'a S, settings: &'a MigrationSettings) -> MigrationFuture<'a>;
}

/// Numeric prefix of a migration name.
pub fn version_of(name: &str) -> Option<u64> {
  name.split('_').next()?.parse().ok()
}

pub fn builtin<S: Space>() -> Vec<Box<dyn Migration<S>>> {
  vec![Box::new(InitialNormalization)]
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
  pub from: u64,
  pub to: u64,
  pub applied: Vec<String>,
}

pub struct MigrationRunner<'a, S: Space> {
  space: &'a S,
  settings: &'a MigrationSettings,
  migrations: Vec<(u64, Box<dyn Migration<S>>)>,
}

impl<'a, S: Space> MigrationRunner<'a, S> {
  pub fn new(
    space: &'a S,
    settings: &'a MigrationSettings,
    migrations: Vec<Box<dyn Migration<S>>>,
  ) -> Self {
    let mut ordered = Vec::new();
    for migration in migrations {
      match version_of(migration.name()) {
        Some(version) => ordered.push((version, migration)),
        None => warn!("skipping migration without a version prefix: {}", migration.name()),
      }
    }
    ordered.sort_by_key(|(version, _)| *version);
    Self {
      space,
      settings,
      migrations: ordered,
    }
  }

  async fn load_version(&self) -> Result<(Option<String>, u64)> {
    let page = self
      .space
      .find_objects(&ObjectQuery::of_type(SCHEMA_TYPE).limit(1))
      .await?;
    Ok(match page.objects.first() {
      Some(record) => {
        let version = record_data(record)
          .and_then(|d| d.get("version"))
          .and_then(Value::as_u64)
          .unwrap_or(0);
        (record_id(record), version)
      }
      None => (None, 0),
    })
  }

  /// Writes `version`, creating the record the first time. Returns the id of
  /// a newly created record.
  async fn write_version(
    &self,
    schema_id: Option<&str>,
    version: u64,
  ) -> std::result::Result<Option<String>, SpaceError> {
    let mut data = Data::new();
    data.insert("version".into(), Value::from(version));
    match schema_id {
      Some(id) => {
        self.space.update_object(id, data).await?;
        Ok(None)
      }
      None => {
        data.insert("type".into(), Value::from(SCHEMA_TYPE));
        self.space.create_object(data).await.map(Some)
      }
    }
  }

  pub async fn run(&self) -> Result<MigrationReport> {
    let (mut schema_id, mut current) = self.load_version().await?;
    info!("current schema version: {current}");

    let mut report = MigrationReport {
      from: current,
      to: current,
      applied: Vec::new(),
    };

    for (version, migration) in &self.migrations {
      let version = *version;
      if version <= current {
        continue;
      }
      let name = migration.name();
      info!(">>> running migration {name}");

      let applied = async {
        migration.up(self.space, self.settings).await?;
        let created = retry_once_on_rate_limit(
          self.settings.rate_limit_backoff(),
          "schema version update",
          || self.write_version(schema_id.as_deref(), version),
        )
        .await?;
        Ok::<_, DeskError>(created)
      }
      .await;

      match applied {
        Ok(created) => {
          if created.is_some() {
            schema_id = created;
          }
          current = version;
          report.to = version;
          report.applied.push(name.to_string());
          info!(">>> {name} done, schema version is now {current}");
        }
        Err(e) => {
          error!(">>> migration {name} failed: {e}");
          return Err(DeskError::Migration {
            name: name.to_string(),
            source: Box::new(e),
          });
        }
      }
    }

    info!("schema is up to date at version {current}");
    Ok(report)
  }
}
