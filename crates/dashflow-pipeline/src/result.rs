//! Pipeline result types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trace::PipelineTrace;

/// Outcome of one source after fetch, process and merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceResult {
  pub source_id: String,
  #[serde(rename = "type")]
  pub source_type: String,
  pub data: serde_json::Value,
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl DataSourceResult {
  pub fn succeeded(
    source_id: impl Into<String>,
    source_type: impl Into<String>,
    data: serde_json::Value,
  ) -> Self {
    Self {
      source_id: source_id.into(),
      source_type: source_type.into(),
      data,
      success: true,
      error: None,
    }
  }

  pub fn failed(
    source_id: impl Into<String>,
    source_type: impl Into<String>,
    error: impl Into<String>,
  ) -> Self {
    Self {
      source_id: source_id.into(),
      source_type: source_type.into(),
      data: serde_json::Value::Object(serde_json::Map::new()),
      success: false,
      error: Some(error.into()),
    }
  }
}

/// The per-widget data bag, keyed by source id.
pub type ComponentData = BTreeMap<String, SourceEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
  #[serde(rename = "type")]
  pub source_type: String,
  pub data: serde_json::Value,
  pub last_updated: DateTime<Utc>,
  pub metadata: EntryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
  pub widget_id: String,
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
  /// Unique execution ID.
  pub execution_id: String,
  /// False only when integration itself failed.
  pub success: bool,
  pub component_data: ComponentData,
  pub execution_time_ms: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trace: Option<PipelineTrace>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}
