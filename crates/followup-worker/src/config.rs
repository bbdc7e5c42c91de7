//! Runtime configuration, layered as built-in defaults, then an optional
//! TOML file, then `FOLLOWUP_*` environment variables (nested keys separated
//! by `__`, e.g. `FOLLOWUP_HTTP__PORT=9090`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  Compact,
  Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  pub store_path:     PathBuf,
  pub log_level:      String,
  pub log_format:     LogFormat,
  /// Consumer group under which every driver commits its offsets.
  pub consumer_group: String,
  pub http:           HttpConfig,
  pub ingest:         IngestConfig,
  pub cronjobs:       CronjobConfig,
  pub clients:        ClientsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  pub host: String,
  pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
  pub poll_interval_ms: u64,
  pub batch_size:       usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CronjobConfig {
  pub enabled:                bool,
  pub interval_secs:          u64,
  pub batch_size:             usize,
  /// Resolved org units older than this are looked up again.
  pub org_unit_refresh_hours: i64,
  /// A row whose lookup was attempted is left alone for this long, whatever
  /// the outcome.
  pub retry_after_minutes:    i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientsConfig {
  pub timeout_secs:              u64,
  pub person_directory_url:      String,
  pub organization_registry_url: String,
  pub unit_directory_url:        String,
  pub identity_registry_url:     String,
}

impl IngestConfig {
  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
}

impl CronjobConfig {
  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs) }

  pub fn org_unit_refresh(&self) -> chrono::Duration {
    chrono::Duration::hours(self.org_unit_refresh_hours)
  }

  pub fn retry_after(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.retry_after_minutes)
  }
}

impl ClientsConfig {
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

impl WorkerConfig {
  /// Load the configuration. A missing file at `path` is not an error.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .set_default("store_path", "followup.db")?
      .set_default("log_level", "info")?
      .set_default("log_format", "compact")?
      .set_default("consumer_group", "followup-worker")?
      .set_default("http.host", "0.0.0.0")?
      .set_default("http.port", 8080)?
      .set_default("ingest.poll_interval_ms", 1000)?
      .set_default("ingest.batch_size", 100)?
      .set_default("cronjobs.enabled", true)?
      .set_default("cronjobs.interval_secs", 300)?
      .set_default("cronjobs.batch_size", 50)?
      .set_default("cronjobs.org_unit_refresh_hours", 24)?
      .set_default("cronjobs.retry_after_minutes", 60)?
      .set_default("clients.timeout_secs", 10)?
      .set_default("clients.person_directory_url", "http://localhost:8081")?
      .set_default("clients.organization_registry_url", "http://localhost:8082")?
      .set_default("clients.unit_directory_url", "http://localhost:8083")?
      .set_default("clients.identity_registry_url", "http://localhost:8084")?
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("FOLLOWUP")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_apply_without_a_file() {
    let config = WorkerConfig::load(Path::new("does-not-exist.toml")).unwrap();
    assert_eq!(config.log_format, LogFormat::Compact);
    assert_eq!(config.ingest.poll_interval(), Duration::from_secs(1));
    assert_eq!(config.cronjobs.org_unit_refresh(), chrono::Duration::hours(24));
    assert_eq!(config.cronjobs.retry_after(), chrono::Duration::minutes(60));
  }
}
