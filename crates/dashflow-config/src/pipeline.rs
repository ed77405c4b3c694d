use serde::{Deserialize, Serialize};

use crate::item::DataItemConfig;
use crate::merge::MergeStrategy;
use crate::processing::ProcessingConfig;

/// The full pipeline description for one widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(alias = "widgetId", alias = "componentId")]
  pub widget_id: String,
  #[serde(default, alias = "dataSources")]
  pub data_sources: Vec<DataSourceDef>,
  /// Request parameters for this run. HTTP items render their URL, header
  /// values and string bodies against them.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub params: serde_json::Map<String, serde_json::Value>,
}

impl PipelineConfig {
  pub fn new(widget_id: impl Into<String>, data_sources: Vec<DataSourceDef>) -> Self {
    Self {
      widget_id: widget_id.into(),
      data_sources,
      params: serde_json::Map::new(),
    }
  }
}

/// A named group of items merged into a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDef {
  #[serde(alias = "sourceId")]
  pub source_id: String,
  #[serde(default, alias = "dataItems")]
  pub data_items: Vec<DataItemDef>,
  #[serde(default, alias = "mergeStrategy")]
  pub merge_strategy: MergeStrategy,
}

impl DataSourceDef {
  /// Type tag of the source, taken from its first item.
  pub fn kind(&self) -> &'static str {
    self
      .data_items
      .first()
      .map(|def| def.item.kind())
      .unwrap_or("unknown")
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItemDef {
  pub item: DataItemConfig,
  #[serde(default)]
  pub processing: ProcessingConfig,
}

impl DataItemDef {
  pub fn new(item: DataItemConfig, processing: ProcessingConfig) -> Self {
    Self { item, processing }
  }
}
