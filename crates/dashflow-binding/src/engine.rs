//! The trigger engine.
//!
//! Holds each registered widget's layered configuration. A layer update
//! whose changed paths are whitelisted schedules a debounced execution:
//!
//! ```text
//! update_layer ──► diff ──► whitelisted? ──► (re)start widget timer
//!                                                 │ quiet period
//!                                                 ▼
//!                      build_request_params(current config) ──► executor
//! ```
//!
//! One timer per widget: a later qualifying change cancels the pending
//! timer and starts a new one, so a burst of changes yields one execution
//! that sees the final state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashflow_config::{BindingRule, ComponentOverrides, TriggerRule, TriggerSettings};
use dashflow_script::ScriptEngine;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{PropertyChange, WidgetConfig};
use crate::error::BindingError;
use crate::executor::{ExecutionRequest, WidgetExecutor};
use crate::presets::Preset;
use crate::registry::{BindingRegistry, RuleDebugInfo};
use crate::transform::TransformRunner;
use crate::watch::{WatchHandle, WatcherSet};

/// Request parameters built from a widget's binding rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestParams {
  pub params: serde_json::Map<String, serde_json::Value>,
  pub warnings: Vec<BindingWarning>,
}

/// A binding problem that did not stop the params from being built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingWarning {
  /// A required property is absent.
  MissingRequired {
    property_path: String,
    param_name: String,
  },
  /// The transform failed; the untransformed value was used.
  TransformFailed {
    property_path: String,
    param_name: String,
    message: String,
  },
}

/// What [`TriggerEngine::update_layer`] did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerUpdate {
  pub changes: Vec<PropertyChange>,
  /// Changed paths with an enabled trigger rule.
  pub triggered: Vec<String>,
  /// Delay of the execution that was scheduled, if any.
  pub scheduled_in_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
  Executed,
  /// Another execution of the same widget was still running.
  Suppressed,
  /// The widget was unregistered before the execution started.
  Unregistered,
  Failed,
}

/// Runtime state alongside the rule set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineDebugInfo {
  pub rules: RuleDebugInfo,
  pub registered_widgets: Vec<String>,
  pub pending: Vec<String>,
  pub executing: Vec<String>,
  pub watchers: usize,
  pub executions: u64,
}

struct PendingTimer {
  generation: u64,
  handle: JoinHandle<()>,
  cancel: CancellationToken,
}

struct EngineInner {
  widgets: RwLock<HashMap<String, WidgetConfig>>,
  registry: RwLock<BindingRegistry>,
  transforms: TransformRunner,
  executor: Arc<dyn WidgetExecutor>,
  settings: TriggerSettings,
  timers: Mutex<HashMap<String, PendingTimer>>,
  executing: Mutex<HashSet<String>>,
  watchers: Arc<WatcherSet>,
  generation: AtomicU64,
  executions: AtomicU64,
}

/// Binds widget configuration to request parameters and re-runs widgets
/// when whitelisted properties change.
///
/// Cloning is cheap; clones share state. Scheduling executions spawns tokio
/// tasks, so layer updates must happen inside a tokio runtime.
#[derive(Clone)]
pub struct TriggerEngine {
  inner: Arc<EngineInner>,
}

impl TriggerEngine {
  /// Create an engine with the default rule set.
  pub fn new(
    executor: Arc<dyn WidgetExecutor>,
    script: Arc<dyn ScriptEngine>,
    settings: TriggerSettings,
  ) -> Self {
    Self::with_registry(executor, script, settings, BindingRegistry::default())
  }

  pub fn with_registry(
    executor: Arc<dyn WidgetExecutor>,
    script: Arc<dyn ScriptEngine>,
    settings: TriggerSettings,
    registry: BindingRegistry,
  ) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        widgets: RwLock::new(HashMap::new()),
        registry: RwLock::new(registry),
        transforms: TransformRunner::new(script),
        executor,
        settings,
        timers: Mutex::new(HashMap::new()),
        executing: Mutex::new(HashSet::new()),
        watchers: Arc::new(WatcherSet::default()),
        generation: AtomicU64::new(0),
        executions: AtomicU64::new(0),
      }),
    }
  }

  /// Register or replace a widget's configuration. Does not execute.
  pub fn register_widget(&self, widget_id: impl Into<String>, config: WidgetConfig) {
    let widget_id = widget_id.into();
    debug!(%widget_id, component_type = ?config.component_type, "widget_registered");
    self.inner.write_widgets().insert(widget_id, config);
  }

  /// Forget a widget and cancel its pending execution.
  pub fn unregister_widget(&self, widget_id: &str) -> bool {
    let removed = self.inner.write_widgets().remove(widget_id).is_some();
    self.inner.cancel_timer(widget_id);
    self.inner.lock_executing().remove(widget_id);
    debug!(widget_id, removed, "widget_unregistered");
    removed
  }

  pub fn widget_config(&self, widget_id: &str) -> Option<WidgetConfig> {
    self.inner.read_widgets().get(widget_id).cloned()
  }

  /// Merge `partial` into one layer of a widget's configuration.
  ///
  /// Watchers see every changed path. If any changed path has an enabled
  /// trigger rule, the widget's execution is (re)scheduled after the
  /// longest debounce among those rules.
  pub fn update_layer(
    &self,
    widget_id: &str,
    layer: &str,
    partial: serde_json::Map<String, serde_json::Value>,
  ) -> Result<LayerUpdate, BindingError> {
    let (changes, component_type) = {
      let mut widgets = self.inner.write_widgets();
      let config = widgets
        .get_mut(widget_id)
        .ok_or_else(|| BindingError::WidgetNotFound {
          widget_id: widget_id.to_string(),
        })?;
      let changes = config.merge_layer(widget_id, layer, partial);
      (changes, config.component_type.clone())
    };

    let mut triggered = Vec::new();
    let mut delay_ms = None;
    {
      let registry = self.inner.read_registry();
      for change in &changes {
        if let Some(rule) = registry.trigger_for(&change.property_path, component_type.as_deref()) {
          let debounce = rule
            .debounce_ms
            .unwrap_or(self.inner.settings.default_debounce_ms);
          delay_ms = Some(delay_ms.map_or(debounce, |d: u64| d.max(debounce)));
          triggered.push(change.property_path.clone());
        }
      }
    }

    if let Some(delay) = delay_ms {
      debug!(widget_id, ?triggered, delay_ms = delay, "execution_scheduled");
      self.inner.schedule(widget_id, delay, triggered.join(","));
    }

    for change in &changes {
      self.inner.watchers.notify(change);
    }

    Ok(LayerUpdate {
      changes,
      triggered,
      scheduled_in_ms: delay_ms,
    })
  }

  /// Build the request parameters for a widget from its current
  /// configuration.
  pub fn build_request_params(&self, widget_id: &str) -> Result<RequestParams, BindingError> {
    let config = self
      .widget_config(widget_id)
      .ok_or_else(|| BindingError::WidgetNotFound {
        widget_id: widget_id.to_string(),
      })?;
    Ok(self.inner.build_params(&config))
  }

  /// Execute a widget now, bypassing debounce. Suppressed if an execution
  /// of the widget is already running.
  pub async fn trigger_now(
    &self,
    widget_id: &str,
    reason: &str,
  ) -> Result<ExecutionOutcome, BindingError> {
    if !self.inner.read_widgets().contains_key(widget_id) {
      return Err(BindingError::WidgetNotFound {
        widget_id: widget_id.to_string(),
      });
    }
    Ok(self.inner.clone().execute(widget_id.to_string(), reason.to_string()).await)
  }

  /// Call `callback` whenever `property_path` changes on any widget.
  pub fn watch_property(
    &self,
    property_path: &str,
    callback: impl Fn(&PropertyChange) + Send + Sync + 'static,
  ) -> WatchHandle {
    self.inner.watchers.add(property_path, Arc::new(callback))
  }

  pub fn register_binding_rule(&self, rule: BindingRule) {
    self.inner.write_registry().register_binding_rule(rule);
  }

  pub fn remove_binding_rule(&self, property_path: &str) -> bool {
    self.inner.write_registry().remove_binding_rule(property_path)
  }

  pub fn register_trigger_rule(&self, rule: TriggerRule) {
    self.inner.write_registry().register_trigger_rule(rule);
  }

  pub fn remove_trigger_rule(&self, property_path: &str) -> bool {
    self.inner.write_registry().remove_trigger_rule(property_path)
  }

  pub fn clear_all_rules(&self) {
    self.inner.write_registry().clear_all_rules();
  }

  pub fn set_component_type_overrides(
    &self,
    component_type: impl Into<String>,
    overrides: ComponentOverrides,
  ) {
    self
      .inner
      .write_registry()
      .set_component_type_overrides(component_type, overrides);
  }

  pub fn apply_preset(&self, preset: Preset) {
    info!(?preset, "preset_applied");
    self.inner.write_registry().apply_preset(preset);
  }

  pub fn trigger_whitelist(&self, component_type: Option<&str>) -> Vec<String> {
    self.inner.read_registry().trigger_whitelist(component_type)
  }

  pub fn debug_info(&self, component_type: Option<&str>) -> EngineDebugInfo {
    let mut registered_widgets: Vec<String> = self.inner.read_widgets().keys().cloned().collect();
    registered_widgets.sort();
    let mut pending: Vec<String> = self.inner.lock_timers().keys().cloned().collect();
    pending.sort();
    let mut executing: Vec<String> = self.inner.lock_executing().iter().cloned().collect();
    executing.sort();

    EngineDebugInfo {
      rules: self.inner.read_registry().debug_info(component_type),
      registered_widgets,
      pending,
      executing,
      watchers: self.inner.watchers.count(),
      executions: self.inner.executions.load(Ordering::Relaxed),
    }
  }

  /// Cancel every pending execution.
  pub fn shutdown(&self) {
    let timers: Vec<PendingTimer> = self.inner.lock_timers().drain().map(|(_, t)| t).collect();
    for timer in timers {
      timer.cancel.cancel();
    }
  }
}

/// Clears the executing flag however the execution ends.
struct ExecutingGuard<'a> {
  inner: &'a EngineInner,
  widget_id: &'a str,
}

impl Drop for ExecutingGuard<'_> {
  fn drop(&mut self) {
    self.inner.lock_executing().remove(self.widget_id);
  }
}

impl EngineInner {
  fn read_widgets(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, WidgetConfig>> {
    self.widgets.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write_widgets(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, WidgetConfig>> {
    self.widgets.write().unwrap_or_else(|e| e.into_inner())
  }

  fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, BindingRegistry> {
    self.registry.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, BindingRegistry> {
    self.registry.write().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingTimer>> {
    self.timers.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_executing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
    self.executing.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn cancel_timer(&self, widget_id: &str) {
    if let Some(timer) = self.lock_timers().remove(widget_id) {
      timer.cancel.cancel();
    }
  }

  fn schedule(self: &Arc<Self>, widget_id: &str, delay_ms: u64, reason: String) {
    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
    let cancel = CancellationToken::new();

    // Held until the timer is recorded, so a task that fires immediately
    // cannot look for its entry before it exists.
    let mut timers = self.lock_timers();
    let handle = {
      let inner = Arc::clone(self);
      let cancel = cancel.clone();
      let widget_id = widget_id.to_string();
      tokio::spawn(async move {
        tokio::select! {
          _ = cancel.cancelled() => return,
          _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
        {
          let mut timers = inner.lock_timers();
          if timers.get(&widget_id).is_some_and(|t| t.generation == generation) {
            timers.remove(&widget_id);
          }
        }
        inner.execute(widget_id, reason).await;
      })
    };

    let previous = timers.insert(
      widget_id.to_string(),
      PendingTimer {
        generation,
        handle,
        cancel,
      },
    );
    drop(timers);
    if let Some(previous) = previous {
      previous.cancel.cancel();
      debug!(widget_id, "debounce_reset");
    }
  }

  #[instrument(
    name = "trigger_execute",
    skip(self),
    fields(executions = tracing::field::Empty)
  )]
  async fn execute(self: Arc<Self>, widget_id: String, reason: String) -> ExecutionOutcome {
    if !self.lock_executing().insert(widget_id.clone()) {
      debug!("execution_suppressed");
      return ExecutionOutcome::Suppressed;
    }
    let _guard = ExecutingGuard {
      inner: &self,
      widget_id: &widget_id,
    };

    let config = self.read_widgets().get(&widget_id).cloned();
    let Some(config) = config else {
      debug!("execution_skipped_unregistered");
      return ExecutionOutcome::Unregistered;
    };

    let params = self.build_params(&config);
    for warning in &params.warnings {
      warn!(?warning, "binding_warning");
    }

    let executions = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::Span::current().record("executions", executions);

    let request = ExecutionRequest {
      widget_id: widget_id.clone(),
      config,
      params: params.params,
      reason,
    };
    match self.executor.execute(request).await {
      Ok(()) => {
        info!("execution_completed");
        ExecutionOutcome::Executed
      }
      Err(e) => {
        error!(error = %e, "execution_failed");
        ExecutionOutcome::Failed
      }
    }
  }

  fn build_params(&self, config: &WidgetConfig) -> RequestParams {
    let rules = self
      .read_registry()
      .binding_rules(config.component_type.as_deref());
    let mut result = RequestParams::default();

    for rule in rules {
      let Some(value) = config.read(&rule.property_path) else {
        if rule.required {
          result.warnings.push(BindingWarning::MissingRequired {
            property_path: rule.property_path,
            param_name: rule.param_name,
          });
        }
        continue;
      };

      let value = match &rule.transform {
        None => value.clone(),
        Some(transform) => match self.transforms.apply(transform, value) {
          Ok(transformed) => transformed,
          Err(e) => {
            result.warnings.push(BindingWarning::TransformFailed {
              property_path: rule.property_path.clone(),
              param_name: rule.param_name.clone(),
              message: e.to_string(),
            });
            value.clone()
          }
        },
      };
      result.params.insert(rule.param_name, value);
    }

    result
  }
}

impl Drop for EngineInner {
  fn drop(&mut self) {
    let timers = self.timers.get_mut().unwrap_or_else(|e| e.into_inner());
    for (_, timer) in timers.drain() {
      timer.cancel.cancel();
      timer.handle.abort();
    }
  }
}
