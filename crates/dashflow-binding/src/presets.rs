//! Built-in rule sets.

use dashflow_config::{BindingRule, TriggerRule, ValueTransform};
use serde::{Deserialize, Serialize};

/// A named replacement for the whole rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
  IotDevice,
  DataAnalytics,
  UserInterface,
  /// No rules at all.
  Custom,
}

fn join() -> ValueTransform {
  ValueTransform::Join {
    separator: ",".to_string(),
  }
}

/// The rules a fresh registry starts with. All of them can be changed or
/// removed.
pub fn default_rules() -> (Vec<BindingRule>, Vec<TriggerRule>) {
  let bindings = vec![
    BindingRule::new("base.deviceId", "deviceId")
      .required()
      .describe("Device id"),
    BindingRule::new("base.metricsList", "metrics")
      .with_transform(join())
      .describe("Metric list"),
    BindingRule::new("component.startTime", "startTime").describe("Range start"),
    BindingRule::new("component.endTime", "endTime").describe("Range end"),
    BindingRule::new("component.dataType", "dataType").describe("Data type"),
    BindingRule::new("component.refreshInterval", "refreshInterval")
      .with_transform(ValueTransform::ParseInt { fallback: 30 })
      .describe("Refresh interval"),
    BindingRule::new("component.filterCondition", "filter").describe("Filter condition"),
  ];

  let triggers = vec![
    TriggerRule::new("base.deviceId").with_debounce(100),
    TriggerRule::new("base.metricsList").with_debounce(200),
    TriggerRule::new("component.startTime").with_debounce(300),
    TriggerRule::new("component.endTime").with_debounce(300),
    TriggerRule::new("component.dataType").with_debounce(150),
    TriggerRule::new("component.refreshInterval").disabled(),
    TriggerRule::new("component.filterCondition").with_debounce(250),
  ];

  (bindings, triggers)
}

impl Preset {
  pub fn rules(self) -> (Vec<BindingRule>, Vec<TriggerRule>) {
    match self {
      Preset::IotDevice => (
        vec![
          BindingRule::new("base.deviceId", "device_id")
            .required()
            .describe("Device id"),
          BindingRule::new("base.deviceType", "device_type").describe("Device type"),
          BindingRule::new("component.sensorIds", "sensors")
            .with_transform(join())
            .describe("Sensor list"),
        ],
        vec![
          TriggerRule::new("base.deviceId").with_debounce(50),
          TriggerRule::new("component.sensorIds").with_debounce(200),
        ],
      ),
      Preset::DataAnalytics => (
        vec![
          BindingRule::new("component.timeRange", "time_range").describe("Time range"),
          BindingRule::new("component.aggregationType", "aggregation")
            .describe("Aggregation"),
          BindingRule::new("component.groupBy", "group_by")
            .with_transform(join())
            .describe("Group-by fields"),
        ],
        vec![
          TriggerRule::new("component.timeRange").with_debounce(500),
          TriggerRule::new("component.aggregationType").with_debounce(100),
        ],
      ),
      Preset::UserInterface => (
        vec![
          BindingRule::new("component.selectedTab", "active_tab").describe("Selected tab"),
          BindingRule::new("component.filterText", "search_query").describe("Search text"),
          BindingRule::new("component.pageSize", "limit")
            .with_transform(ValueTransform::Clamp {
              min: 1.0,
              max: 100.0,
            })
            .describe("Page size"),
        ],
        vec![
          TriggerRule::new("component.selectedTab").with_debounce(50),
          TriggerRule::new("component.filterText").with_debounce(300),
        ],
      ),
      Preset::Custom => (Vec::new(), Vec::new()),
    }
  }
}
