use serde::{Deserialize, Serialize};

use crate::item::DataItemConfig;
use crate::merge::MergeStrategy;
use crate::pipeline::DataItemDef;

/// What a widget declares it needs: the input to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRequirement {
  #[serde(alias = "widgetId", alias = "componentId")]
  pub widget_id: String,
  #[serde(default, alias = "dataSources")]
  pub data_sources: Vec<DataSourceSpec>,
  /// Request parameters produced by the binding engine. Available to HTTP
  /// items as query parameters and template context.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub params: serde_json::Map<String, serde_json::Value>,
}

impl WidgetRequirement {
  pub fn new(widget_id: impl Into<String>, data_sources: Vec<DataSourceSpec>) -> Self {
    Self {
      widget_id: widget_id.into(),
      data_sources,
      params: serde_json::Map::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  Static,
  Json,
  Http,
  #[serde(alias = "websocket")]
  Socket,
  Script,
}

impl SourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceKind::Static => "static",
      SourceKind::Json => "json",
      SourceKind::Http => "http",
      SourceKind::Socket => "socket",
      SourceKind::Script => "script",
    }
  }
}

/// One declared source of a widget requirement.
///
/// The simple form is a single item described by `type` + `config`. A source
/// may instead list `data_items` explicitly, in which case `type`/`config`
/// are ignored and `merge_strategy` applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSpec {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: SourceKind,
  #[serde(default)]
  pub config: serde_json::Value,
  #[serde(
    default,
    alias = "filterPath",
    skip_serializing_if = "Option::is_none"
  )]
  pub filter_path: Option<String>,
  #[serde(
    default,
    alias = "transformScript",
    alias = "processScript",
    skip_serializing_if = "Option::is_none"
  )]
  pub transform_script: Option<String>,
  #[serde(default, alias = "dataItems", skip_serializing_if = "Vec::is_empty")]
  pub data_items: Vec<DataItemDef>,
  #[serde(
    default,
    alias = "mergeStrategy",
    skip_serializing_if = "Option::is_none"
  )]
  pub merge_strategy: Option<MergeStrategy>,
}

impl DataSourceSpec {
  /// Build the single data item described by `type` + `config`.
  pub fn to_item(&self) -> Result<DataItemConfig, serde_json::Error> {
    let mut fields = match &self.config {
      serde_json::Value::Object(map) => map.clone(),
      serde_json::Value::Null => serde_json::Map::new(),
      other => {
        // A bare value is shorthand for a static payload.
        let mut map = serde_json::Map::new();
        map.insert("payload".to_string(), other.clone());
        map
      }
    };
    fields.insert(
      "type".to_string(),
      serde_json::Value::String(self.kind.as_str().to_string()),
    );
    serde_json::from_value(serde_json::Value::Object(fields))
  }
}
