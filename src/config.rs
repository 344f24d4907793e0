use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::SchemaSource;

pub const CONFIG_ENV: &str = "ACTIVITY_HOST_CONFIG";
pub const DB_ENV: &str = "ACTIVITY_HOST_DB";
pub const LOG_ENV: &str = "ACTIVITY_HOST_LOG";
pub const POLL_ENV: &str = "ACTIVITY_HOST_POLL_MS";

const CONFIG_FILE_NAME: &str = "activity-host.json";
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Runtime settings for the host. Every field has a default, so an absent or
/// partial config file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub database_path: PathBuf,
    /// Replaces the embedded schema when the file exists.
    pub schema_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::with_base(&exe_dir())
    }
}

impl HostConfig {
    fn with_base(exe_dir: &Path) -> Self {
        let root = exe_dir.join("..");
        let database_dir = root.join("database");
        Self {
            database_path: database_dir.join("activity.db"),
            schema_path: database_dir.join("schema.sql"),
            log_file: Some(root.join("logs").join("native-host.log")),
            poll_interval_ms: 1000,
            shutdown_grace_ms: 3000,
        }
    }

    /// Loads the config file named by `ACTIVITY_HOST_CONFIG`, else the one
    /// next to the executable, then applies env overrides.
    ///
    /// A broken file is reported alongside the defaults so the caller can log
    /// it once logging is up.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| exe_dir().join(CONFIG_FILE_NAME));

        let (mut config, error) = match Self::load_from(&path) {
            Ok(config) => (config, None),
            Err(err) => (Self::default(), Some(err)),
        };
        config.apply_env(|key| env::var(key).ok());
        (config, error)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(DB_ENV).filter(|v| !v.is_empty()) {
            let db = PathBuf::from(db);
            if let Some(dir) = db.parent() {
                self.schema_path = dir.join("schema.sql");
            }
            self.database_path = db;
        }
        if let Some(log) = lookup(LOG_ENV).filter(|v| !v.is_empty()) {
            self.log_file = Some(PathBuf::from(log));
        }
        if let Some(poll) = lookup(POLL_ENV).and_then(|v| v.trim().parse().ok()) {
            self.poll_interval_ms = poll;
        }
    }

    pub fn schema_source(&self) -> SchemaSource {
        if self.schema_path.is_file() {
            SchemaSource::File(self.schema_path.clone())
        } else {
            SchemaSource::Embedded
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn exe_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
