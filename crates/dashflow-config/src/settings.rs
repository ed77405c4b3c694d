//! Runtime settings for the dashflow services.
//!
//! Every field has a default, so an empty JSON object is a valid settings
//! file:
//!
//! ```json
//! {
//!   "warehouse": { "default_ttl_ms": 60000, "max_items": 500 },
//!   "trigger": { "default_debounce_ms": 250 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
  #[error("failed to read settings file '{path}'")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse settings file '{path}'")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashflowSettings {
  pub warehouse: WarehouseSettings,
  pub fetch: FetchSettings,
  pub script: ScriptSettings,
  pub trigger: TriggerSettings,
}

impl DashflowSettings {
  /// Load settings from a JSON file.
  pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
      path: path.display().to_string(),
      source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| SettingsError::Parse {
      path: path.display().to_string(),
      source: e,
    })
  }
}

/// Cache budget and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseSettings {
  pub default_ttl_ms: u64,
  pub max_memory_bytes: u64,
  pub cleanup_interval_ms: u64,
  pub max_items: usize,
  pub enable_metrics: bool,
}

impl Default for WarehouseSettings {
  fn default() -> Self {
    Self {
      default_ttl_ms: 5 * 60 * 1000,
      max_memory_bytes: 100 * 1024 * 1024,
      cleanup_interval_ms: 60 * 1000,
      max_items: 1000,
      enable_metrics: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
  pub default_timeout_ms: u64,
}

impl Default for FetchSettings {
  fn default() -> Self {
    Self {
      default_timeout_ms: 10_000,
    }
  }
}

/// Limits applied to every sandboxed script evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
  pub timeout_ms: u64,
  pub memory_limit_bytes: usize,
}

impl Default for ScriptSettings {
  fn default() -> Self {
    Self {
      timeout_ms: 1000,
      memory_limit_bytes: 16 * 1024 * 1024,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
  pub default_debounce_ms: u64,
}

impl Default for TriggerSettings {
  fn default() -> Self {
    Self {
      default_debounce_ms: 100,
    }
  }
}
