//! Layered widget configuration.

use chrono::{DateTime, Utc};
use dashflow_pipeline::{parse_path, select};
use serde::{Deserialize, Serialize};

/// A widget's configuration as a set of named layers (`base`, `component`,
/// `data_source`, `interaction`, ...), each a JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WidgetConfig {
  #[serde(
    default,
    alias = "componentType",
    skip_serializing_if = "Option::is_none"
  )]
  pub component_type: Option<String>,
  #[serde(flatten)]
  pub layers: serde_json::Map<String, serde_json::Value>,
}

/// One changed property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
  pub widget_id: String,
  /// `layer.key`
  pub property_path: String,
  pub old_value: Option<serde_json::Value>,
  pub new_value: serde_json::Value,
  pub timestamp: DateTime<Utc>,
}

impl WidgetConfig {
  pub fn new(component_type: Option<String>) -> Self {
    Self {
      component_type,
      layers: serde_json::Map::new(),
    }
  }

  pub fn with_layer(
    mut self,
    layer: impl Into<String>,
    values: serde_json::Map<String, serde_json::Value>,
  ) -> Self {
    self
      .layers
      .insert(layer.into(), serde_json::Value::Object(values));
    self
  }

  pub fn layer(&self, name: &str) -> Option<&serde_json::Value> {
    self.layers.get(name)
  }

  /// Read a property by dotted path (`base.deviceId`, `component.range.start`).
  /// Missing segments and malformed paths read as absent.
  pub fn read(&self, property_path: &str) -> Option<&serde_json::Value> {
    let segments = parse_path(property_path).ok()?;
    let (first, rest) = segments.split_first()?;
    let dashflow_pipeline::PathSegment::Key(layer) = first else {
      return None;
    };
    select(self.layers.get(layer)?, rest)
  }

  /// Shallow-merge `partial` into `layer` and report the keys whose value
  /// changed.
  pub(crate) fn merge_layer(
    &mut self,
    widget_id: &str,
    layer: &str,
    partial: serde_json::Map<String, serde_json::Value>,
  ) -> Vec<PropertyChange> {
    let entry = self
      .layers
      .entry(layer.to_string())
      .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if !entry.is_object() {
      *entry = serde_json::Value::Object(serde_json::Map::new());
    }
    let serde_json::Value::Object(values) = entry else {
      return Vec::new();
    };

    let now = Utc::now();
    let mut changes = Vec::new();
    for (key, new_value) in partial {
      let old_value = values.get(&key).cloned();
      if old_value.as_ref() == Some(&new_value) {
        continue;
      }
      changes.push(PropertyChange {
        widget_id: widget_id.to_string(),
        property_path: format!("{}.{}", layer, key),
        old_value,
        new_value: new_value.clone(),
        timestamp: now,
      });
      values.insert(key, new_value);
    }
    changes
  }
}
