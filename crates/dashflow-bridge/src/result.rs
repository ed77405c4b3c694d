//! Bridge results.

use chrono::{DateTime, Utc};
use dashflow_pipeline::ComponentData;
use serde::{Deserialize, Serialize};

/// Outcome of [`DataBridge::execute_widget`](crate::DataBridge::execute_widget).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResult {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<ComponentData>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub timestamp: DateTime<Utc>,
}

impl DataResult {
  pub fn succeeded(data: ComponentData) -> Self {
    Self {
      success: true,
      data: Some(data),
      error: None,
      timestamp: Utc::now(),
    }
  }

  pub fn failed(error: impl Into<String>) -> Self {
    Self {
      success: false,
      data: None,
      error: Some(error.into()),
      timestamp: Utc::now(),
    }
  }
}

/// Summary returned by [`DataBridge::stats`](crate::DataBridge::stats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStats {
  pub active_listeners: usize,
  pub timestamp: DateTime<Utc>,
  pub warehouse: WarehouseSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseSummary {
  pub total_widgets: usize,
  pub total_sources: usize,
  pub memory_usage_mb: f64,
}
