//! Binding and trigger rule types.
//!
//! A binding rule maps a configuration property (`"base.deviceId"`) to an
//! outgoing request parameter (`"deviceId"`). A trigger rule decides whether
//! a change to a property should re-run the widget's pipeline.

use serde::{Deserialize, Serialize};

/// Transform applied to a bound property value before it becomes a request
/// parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueTransform {
  /// Join an array into a string. Non-arrays pass through.
  Join {
    #[serde(default = "default_separator")]
    separator: String,
  },
  Uppercase,
  Lowercase,
  /// Parse into an integer, using `fallback` when that is not possible.
  ParseInt { fallback: i64 },
  /// Clamp a number into `[min, max]`.
  Clamp { min: f64, max: f64 },
  /// Render a minijinja template with the value bound as `value`.
  Template { source: String },
  /// Evaluate a sandboxed script with the value bound as `value`.
  Script { source: String },
}

fn default_separator() -> String {
  ",".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRule {
  #[serde(alias = "propertyPath")]
  pub property_path: String,
  #[serde(alias = "paramName")]
  pub param_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub transform: Option<ValueTransform>,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl BindingRule {
  pub fn new(property_path: impl Into<String>, param_name: impl Into<String>) -> Self {
    Self {
      property_path: property_path.into(),
      param_name: param_name.into(),
      transform: None,
      required: false,
      description: None,
    }
  }

  pub fn with_transform(mut self, transform: ValueTransform) -> Self {
    self.transform = Some(transform);
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
  #[serde(alias = "propertyPath")]
  pub property_path: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Quiet period before the pipeline re-runs. Falls back to the trigger
  /// settings when absent.
  #[serde(default, alias = "debounceMs", skip_serializing_if = "Option::is_none")]
  pub debounce_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

fn default_true() -> bool {
  true
}

impl TriggerRule {
  pub fn new(property_path: impl Into<String>) -> Self {
    Self {
      property_path: property_path.into(),
      enabled: true,
      debounce_ms: None,
      description: None,
    }
  }

  pub fn with_debounce(mut self, debounce_ms: u64) -> Self {
    self.debounce_ms = Some(debounce_ms);
    self
  }

  pub fn disabled(mut self) -> Self {
    self.enabled = false;
    self
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

/// Extra rules that apply only to widgets of one component type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentOverrides {
  #[serde(default)]
  pub bindings: Vec<BindingRule>,
  #[serde(default)]
  pub triggers: Vec<TriggerRule>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_binding_rule_from_camel_case() {
    let rule: BindingRule = serde_json::from_value(json!({
      "propertyPath": "base.metricsList",
      "paramName": "metrics",
      "transform": { "type": "join" }
    }))
    .unwrap();

    assert_eq!(rule.property_path, "base.metricsList");
    assert_eq!(
      rule.transform,
      Some(ValueTransform::Join {
        separator: ",".to_string()
      })
    );
    assert!(!rule.required);
  }

  #[test]
  fn test_trigger_rule_enabled_by_default() {
    let rule: TriggerRule =
      serde_json::from_value(json!({ "propertyPath": "base.deviceId", "debounceMs": 50 }))
        .unwrap();
    assert!(rule.enabled);
    assert_eq!(rule.debounce_ms, Some(50));
  }
}
