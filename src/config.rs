use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::BucketNames;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the dashboard origin; relative paths are resolved against it
  pub origin: String,
  /// Build tag appended to bucket names
  pub version: String,
  pub cache_prefix: String,
  /// App-shell files pre-cached on install
  pub shell_assets: Vec<String>,
  pub router: RouterConfig,
  pub sync: SyncConfig,
  pub push: PushConfig,
  /// Directory for the worker database (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  /// Per-request network timeout
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
  /// Path fragments that mark a request as an API call
  pub api_patterns: Vec<String>,
  pub static_prefix: String,
  /// File extensions served cache-first (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub static_extensions: BTreeSet<String>,
  /// Document served when a navigation fails offline
  pub shell_document: String,
  /// The one API endpoint with a synthesized offline response
  pub messages_endpoint: String,
  pub offline_message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub message_endpoint: String,
  pub call_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
  pub title: String,
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  /// Route opened by the "view" notification action
  pub view_route: String,
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(
    v.into_iter()
      .map(|s| s.trim_start_matches('.').to_lowercase())
      .collect(),
  )
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      version: "v1".to_string(),
      cache_prefix: "dialdeck".to_string(),
      shell_assets: [
        "/",
        "/index.html",
        "/manifest.json",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      router: RouterConfig::default(),
      sync: SyncConfig::default(),
      push: PushConfig::default(),
      data_dir: None,
      timeout_secs: 10,
    }
  }
}

impl Default for RouterConfig {
  fn default() -> Self {
    Self {
      api_patterns: ["/api/messages", "/api/calls", "/api/numbers", "/api/analytics"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      static_prefix: "/static/".to_string(),
      static_extensions: ["js", "css", "png", "jpg", "svg"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      shell_document: "/index.html".to_string(),
      messages_endpoint: "/api/messages".to_string(),
      offline_message: "You are offline. Messages will sync when connection is restored."
        .to_string(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      message_endpoint: "/api/messages".to_string(),
      call_endpoint: "/api/calls".to_string(),
    }
  }
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      title: "DialDeck".to_string(),
      default_body: "New notification from DialDeck".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      view_route: "/messages".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dialdeck-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dialdeck-worker/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists. `DIALDECK_ORIGIN`
  /// overrides the configured origin.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no config file found, using defaults");
        Self::default()
      }
    };

    if let Ok(origin) = std::env::var("DIALDECK_ORIGIN") {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dialdeck-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dialdeck-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    if self.timeout_secs == 0 {
      return Err(eyre!("timeout_secs must be positive"));
    }
    Ok(())
  }

  /// The parsed origin URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin URL '{}': {}", self.origin, e))
  }

  /// Resolve a path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
  }

  /// Names of the live cache buckets for this build.
  pub fn buckets(&self) -> BucketNames {
    BucketNames {
      static_name: format!("{}-static-{}", self.cache_prefix, self.version),
      dynamic_name: format!("{}-dynamic-{}", self.cache_prefix, self.version),
    }
  }

  pub fn timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.timeout_secs)
  }

  /// Directory holding the database and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("dialdeck-worker"))
  }

  /// Location of the worker database.
  pub fn database_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("worker.db"))
  }
}
