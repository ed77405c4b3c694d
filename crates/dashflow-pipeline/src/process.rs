//! Item processing: default substitution, path filtering and transforms.

use std::sync::Arc;

use dashflow_config::ProcessingConfig;
use dashflow_script::ScriptEngine;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::path::{parse_path, select};

/// Whether a fetched value counts as "no data".
///
/// `null`, `{}` and `""` are empty. An empty array is data.
pub fn is_empty_value(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::Null => true,
    serde_json::Value::Object(map) => map.is_empty(),
    serde_json::Value::String(s) => s.is_empty(),
    _ => false,
  }
}

/// Filters and transforms one fetched value according to its
/// [`ProcessingConfig`].
#[derive(Clone)]
pub struct DataItemProcessor {
  script: Arc<dyn ScriptEngine>,
}

impl DataItemProcessor {
  pub fn new(script: Arc<dyn ScriptEngine>) -> Self {
    Self { script }
  }

  /// Process a raw value. Never fails: a bad or missing path yields the
  /// default value and a failed transform yields the filtered value.
  pub fn process(&self, raw: &serde_json::Value, config: &ProcessingConfig) -> serde_json::Value {
    if is_empty_value(raw) {
      return config.default_value.clone();
    }

    let filtered = match self.filter(raw, config) {
      Ok(value) => value,
      Err(e @ ProcessError::PathNotFound { .. }) => {
        debug!(error = %e, "filter_path_missed");
        config.default_value.clone()
      }
      Err(e) => {
        warn!(error = %e, "filter_path_invalid");
        config.default_value.clone()
      }
    };

    match transform_source(config) {
      Some(source) => self.transform(&filtered, source).unwrap_or_else(|e| {
        warn!(error = %e, "transform_failed");
        filtered
      }),
      None => filtered,
    }
  }

  /// Process a raw value, reporting the first problem instead of falling
  /// back.
  pub fn try_process(
    &self,
    raw: &serde_json::Value,
    config: &ProcessingConfig,
  ) -> Result<serde_json::Value, ProcessError> {
    if is_empty_value(raw) {
      return Ok(config.default_value.clone());
    }

    let filtered = self.filter(raw, config)?;
    match transform_source(config) {
      Some(source) => self.transform(&filtered, source),
      None => Ok(filtered),
    }
  }

  fn filter(
    &self,
    raw: &serde_json::Value,
    config: &ProcessingConfig,
  ) -> Result<serde_json::Value, ProcessError> {
    if config.is_root_filter() {
      return Ok(raw.clone());
    }

    let segments = parse_path(&config.filter_path)?;
    match select(raw, &segments) {
      Some(serde_json::Value::Null) | None => Err(ProcessError::PathNotFound {
        path: config.filter_path.clone(),
      }),
      Some(value) => Ok(value.clone()),
    }
  }

  fn transform(
    &self,
    value: &serde_json::Value,
    source: &str,
  ) -> Result<serde_json::Value, ProcessError> {
    self
      .script
      .evaluate(source, &[("data", value)])
      .map_err(|e| ProcessError::Transform { source: e })
  }
}

fn transform_source(config: &ProcessingConfig) -> Option<&str> {
  config
    .transform_script
    .as_deref()
    .filter(|source| !source.trim().is_empty())
}
