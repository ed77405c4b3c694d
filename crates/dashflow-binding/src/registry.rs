//! Binding and trigger rule registry.

use std::collections::BTreeMap;

use dashflow_config::{BindingRule, ComponentOverrides, TriggerRule};
use serde::Serialize;

use crate::presets::{Preset, default_rules};

/// Global rules plus per-component-type overrides.
///
/// Rules are keyed by property path: registering a rule for a path that
/// already has one replaces it in place. A component type's rules replace
/// global rules for the same path.
#[derive(Debug, Clone)]
pub struct BindingRegistry {
  bindings: Vec<BindingRule>,
  triggers: Vec<TriggerRule>,
  overrides: BTreeMap<String, ComponentOverrides>,
}

/// Snapshot of the registry for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDebugInfo {
  pub component_type: Option<String>,
  pub binding_rules: Vec<BindingRule>,
  pub trigger_rules: Vec<TriggerRule>,
  pub whitelist: Vec<String>,
  pub component_types: Vec<String>,
}

impl Default for BindingRegistry {
  fn default() -> Self {
    let (bindings, triggers) = default_rules();
    Self {
      bindings,
      triggers,
      overrides: BTreeMap::new(),
    }
  }
}

impl BindingRegistry {
  /// A registry with no rules at all.
  pub fn empty() -> Self {
    Self {
      bindings: Vec::new(),
      triggers: Vec::new(),
      overrides: BTreeMap::new(),
    }
  }

  pub fn register_binding_rule(&mut self, rule: BindingRule) {
    upsert(&mut self.bindings, rule, |r| &r.property_path);
  }

  pub fn remove_binding_rule(&mut self, property_path: &str) -> bool {
    remove(&mut self.bindings, property_path, |r| &r.property_path)
  }

  pub fn register_trigger_rule(&mut self, rule: TriggerRule) {
    upsert(&mut self.triggers, rule, |r| &r.property_path);
  }

  pub fn remove_trigger_rule(&mut self, property_path: &str) -> bool {
    remove(&mut self.triggers, property_path, |r| &r.property_path)
  }

  /// Drop every global and component-type rule.
  pub fn clear_all_rules(&mut self) {
    self.bindings.clear();
    self.triggers.clear();
    self.overrides.clear();
  }

  pub fn set_component_type_overrides(
    &mut self,
    component_type: impl Into<String>,
    overrides: ComponentOverrides,
  ) {
    self.overrides.insert(component_type.into(), overrides);
  }

  pub fn remove_component_type_overrides(&mut self, component_type: &str) -> bool {
    self.overrides.remove(component_type).is_some()
  }

  /// Replace every rule with a preset's.
  pub fn apply_preset(&mut self, preset: Preset) {
    let (bindings, triggers) = preset.rules();
    self.clear_all_rules();
    self.bindings = bindings;
    self.triggers = triggers;
  }

  /// Binding rules in effect for a component type.
  pub fn binding_rules(&self, component_type: Option<&str>) -> Vec<BindingRule> {
    let mut rules = self.bindings.clone();
    if let Some(overrides) = component_type.and_then(|t| self.overrides.get(t)) {
      for rule in &overrides.bindings {
        upsert(&mut rules, rule.clone(), |r| &r.property_path);
      }
    }
    rules
  }

  /// Trigger rules in effect for a component type, enabled or not.
  pub fn trigger_rules(&self, component_type: Option<&str>) -> Vec<TriggerRule> {
    let mut rules = self.triggers.clone();
    if let Some(overrides) = component_type.and_then(|t| self.overrides.get(t)) {
      for rule in &overrides.triggers {
        upsert(&mut rules, rule.clone(), |r| &r.property_path);
      }
    }
    rules
  }

  /// The enabled trigger rule for a property path, if any.
  pub fn trigger_for(&self, property_path: &str, component_type: Option<&str>) -> Option<TriggerRule> {
    let overridden = component_type
      .and_then(|t| self.overrides.get(t))
      .and_then(|o| o.triggers.iter().find(|r| r.property_path == property_path));
    overridden
      .or_else(|| self.triggers.iter().find(|r| r.property_path == property_path))
      .filter(|r| r.enabled)
      .cloned()
  }

  /// Property paths whose change re-runs a widget of this component type.
  pub fn trigger_whitelist(&self, component_type: Option<&str>) -> Vec<String> {
    self
      .trigger_rules(component_type)
      .into_iter()
      .filter(|r| r.enabled)
      .map(|r| r.property_path)
      .collect()
  }

  pub fn debug_info(&self, component_type: Option<&str>) -> RuleDebugInfo {
    RuleDebugInfo {
      component_type: component_type.map(str::to_string),
      binding_rules: self.binding_rules(component_type),
      trigger_rules: self.trigger_rules(component_type),
      whitelist: self.trigger_whitelist(component_type),
      component_types: self.overrides.keys().cloned().collect(),
    }
  }
}

fn upsert<T>(rules: &mut Vec<T>, rule: T, path: impl Fn(&T) -> &String) {
  match rules.iter().position(|r| path(r) == path(&rule)) {
    Some(index) => rules[index] = rule,
    None => rules.push(rule),
  }
}

fn remove<T>(rules: &mut Vec<T>, property_path: &str, path: impl Fn(&T) -> &String) -> bool {
  let before = rules.len();
  rules.retain(|r| path(r) != property_path);
  rules.len() != before
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_removable() {
    let mut registry = BindingRegistry::default();
    assert!(registry.trigger_for("base.deviceId", None).is_some());
    assert!(registry.remove_trigger_rule("base.deviceId"));
    assert!(!registry.remove_trigger_rule("base.deviceId"));
    assert!(registry.trigger_for("base.deviceId", None).is_none());
  }

  #[test]
  fn test_disabled_rule_not_whitelisted() {
    let registry = BindingRegistry::default();
    assert!(registry.trigger_for("component.refreshInterval", None).is_none());
    assert!(
      !registry
        .trigger_whitelist(None)
        .contains(&"component.refreshInterval".to_string())
    );
  }

  #[test]
  fn test_register_replaces_same_path() {
    let mut registry = BindingRegistry::empty();
    registry.register_binding_rule(BindingRule::new("base.a", "first"));
    registry.register_binding_rule(BindingRule::new("base.b", "b"));
    registry.register_binding_rule(BindingRule::new("base.a", "second"));

    let rules = registry.binding_rules(None);
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].param_name, "second");
  }

  #[test]
  fn test_component_type_overrides() {
    let mut registry = BindingRegistry::empty();
    registry.register_trigger_rule(TriggerRule::new("base.deviceId").with_debounce(100));
    registry.set_component_type_overrides(
      "map",
      ComponentOverrides {
        bindings: vec![BindingRule::new("component.zoom", "zoom")],
        triggers: vec![
          TriggerRule::new("component.zoom"),
          TriggerRule::new("base.deviceId").disabled(),
        ],
      },
    );

    assert!(registry.trigger_for("component.zoom", None).is_none());
    assert!(registry.trigger_for("component.zoom", Some("map")).is_some());
    assert!(registry.trigger_for("base.deviceId", Some("map")).is_none());
    assert!(registry.trigger_for("base.deviceId", Some("chart")).is_some());
    assert_eq!(registry.binding_rules(Some("map")).len(), 1);
    assert_eq!(registry.trigger_whitelist(Some("map")), vec!["component.zoom"]);
  }

  #[test]
  fn test_apply_preset_replaces_rules() {
    let mut registry = BindingRegistry::default();
    registry.set_component_type_overrides("map", ComponentOverrides::default());
    registry.apply_preset(Preset::IotDevice);

    let info = registry.debug_info(None);
    assert_eq!(info.binding_rules[0].param_name, "device_id");
    assert_eq!(info.whitelist, vec!["base.deviceId", "component.sensorIds"]);
    assert!(info.component_types.is_empty());

    registry.apply_preset(Preset::Custom);
    assert!(registry.binding_rules(None).is_empty());
    assert!(registry.trigger_whitelist(None).is_empty());
  }
}
