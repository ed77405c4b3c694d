//! Pipeline coordination.
//!
//! A run fetches, processes and merges every source of a widget, then
//! integrates the source results into the widget's data bag. Sources run
//! concurrently and fail independently; items inside a source run one after
//! another in declaration order.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use dashflow_config::{DashflowSettings, DataItemConfig, DataSourceDef, PipelineConfig};
use dashflow_script::{LuaScriptEngine, ScriptEngine};
use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::fetch::DataItemFetcher;
use crate::integrate::integrate;
use crate::merge::{SourceMerger, validate_strategy};
use crate::path::parse_path;
use crate::process::DataItemProcessor;
use crate::result::{ComponentData, DataSourceResult, PipelineResult};
use crate::trace::{PipelineStage, PipelineTrace};

/// What a coordinator can handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatistics {
  pub item_kinds: Vec<&'static str>,
  pub merge_strategies: Vec<&'static str>,
}

pub struct PipelineCoordinator {
  fetcher: DataItemFetcher,
  processor: DataItemProcessor,
  merger: SourceMerger,
}

impl PipelineCoordinator {
  /// Create a coordinator with the Lua sandbox for scripts.
  pub fn new(settings: &DashflowSettings) -> Self {
    let script = LuaScriptEngine::shared(settings.script.clone());
    let fetcher = DataItemFetcher::new(settings.fetch.clone(), script.clone());
    Self::with_fetcher(fetcher, script)
  }

  /// Create a coordinator around a pre-built fetcher, e.g. one with a socket
  /// source installed.
  pub fn with_fetcher(fetcher: DataItemFetcher, script: Arc<dyn ScriptEngine>) -> Self {
    Self {
      fetcher,
      processor: DataItemProcessor::new(script.clone()),
      merger: SourceMerger::new(script),
    }
  }

  /// Run the pipeline for one widget. Never fails: source failures are
  /// recorded in the data bag.
  pub async fn run(&self, config: &PipelineConfig, debug: bool) -> PipelineResult {
    let execution_id = uuid::Uuid::new_v4().to_string();
    self.run_inner(config, execution_id, debug).await
  }

  #[instrument(
    name = "pipeline_run",
    skip_all,
    fields(widget_id = %config.widget_id, execution_id = %execution_id)
  )]
  async fn run_inner(
    &self,
    config: &PipelineConfig,
    execution_id: String,
    debug: bool,
  ) -> PipelineResult {
    let started = Instant::now();
    info!(
      execution_id = %execution_id,
      widget_id = %config.widget_id,
      source_count = config.data_sources.len(),
      "pipeline_started"
    );

    let mut trace = debug.then(PipelineTrace::new);
    if let Some(trace) = trace.as_mut() {
      trace.enter(PipelineStage::Idle);
    }

    let runs = config.data_sources.iter().map(|source| {
      AssertUnwindSafe(self.run_source(source, &config.params, debug)).catch_unwind()
    });
    let outcomes = futures::future::join_all(runs).await;

    let mut results = Vec::with_capacity(outcomes.len());
    for (source, outcome) in config.data_sources.iter().zip(outcomes) {
      match outcome {
        Ok((result, partial)) => {
          if let (Some(trace), Some(partial)) = (trace.as_mut(), partial) {
            trace.absorb(partial);
          }
          results.push(result);
        }
        Err(panic) => {
          let message = panic_message(panic.as_ref());
          error!(source_id = %source.source_id, error = %message, "source_panicked");
          results.push(DataSourceResult::failed(
            &source.source_id,
            source.kind(),
            format!("source panicked: {}", message),
          ));
        }
      }
    }

    if let Some(trace) = trace.as_mut() {
      trace.enter(PipelineStage::Integrating);
    }
    let integrated =
      std::panic::catch_unwind(AssertUnwindSafe(|| integrate(&results, &config.widget_id)));
    let (success, component_data, error) = match integrated {
      Ok(bag) => (true, bag, None),
      Err(panic) => {
        let message = format!("integration panicked: {}", panic_message(panic.as_ref()));
        (false, ComponentData::new(), Some(message))
      }
    };

    if let Some(trace) = trace.as_mut() {
      let snapshot = serde_json::to_value(&component_data).unwrap_or(serde_json::Value::Null);
      trace.record_final(snapshot, success);
      trace.enter(PipelineStage::Done);
    }

    let execution_time_ms = started.elapsed().as_millis() as u64;
    match &error {
      None => {
        let failed_sources = results.iter().filter(|r| !r.success).count();
        info!(
          execution_id = %execution_id,
          failed_sources,
          execution_time_ms,
          "pipeline_completed"
        );
      }
      Some(e) => {
        error!(execution_id = %execution_id, error = %e, "pipeline_failed");
      }
    }

    PipelineResult {
      execution_id,
      success,
      component_data,
      execution_time_ms,
      trace,
      error,
    }
  }

  #[instrument(name = "source_run", skip_all, fields(source_id = %source.source_id))]
  async fn run_source(
    &self,
    source: &DataSourceDef,
    params: &serde_json::Map<String, serde_json::Value>,
    debug: bool,
  ) -> (DataSourceResult, Option<PipelineTrace>) {
    let source_id = source.source_id.as_str();
    let source_type = source.kind();
    let mut trace = debug.then(PipelineTrace::new);

    if source.data_items.is_empty() {
      warn!(source_id, "source_has_no_items");
      return (
        DataSourceResult::failed(source_id, source_type, "source has no data items"),
        trace,
      );
    }

    if let Some(trace) = trace.as_mut() {
      trace.enter_for_source(PipelineStage::Fetching, source_id);
    }
    let mut raw = Vec::with_capacity(source.data_items.len());
    let mut fetch_errors = Vec::new();
    for (index, def) in source.data_items.iter().enumerate() {
      let value = match self.fetcher.try_fetch(&def.item, params).await {
        Ok(value) => {
          if let Some(trace) = trace.as_mut() {
            trace.record_raw(PipelineTrace::item_key(source_id, index), &value, true);
          }
          value
        }
        Err(e) => {
          warn!(source_id, item = index, error = %e, "item_fetch_failed");
          fetch_errors.push(format!("item {}: {}", index, e));
          let empty = serde_json::Value::Object(serde_json::Map::new());
          if let Some(trace) = trace.as_mut() {
            trace.record_raw(PipelineTrace::item_key(source_id, index), &empty, false);
          }
          empty
        }
      };
      raw.push(value);
    }

    if fetch_errors.len() == source.data_items.len() {
      let message = fetch_errors.join("; ");
      warn!(source_id, error = %message, "source_failed");
      if let Some(trace) = trace.as_mut() {
        trace.record_merged(source_id, &serde_json::json!({}), false);
      }
      return (
        DataSourceResult::failed(source_id, source_type, message),
        trace,
      );
    }

    if let Some(trace) = trace.as_mut() {
      trace.enter_for_source(PipelineStage::Processing, source_id);
    }
    let mut processed = Vec::with_capacity(raw.len());
    for (index, (value, def)) in raw.iter().zip(&source.data_items).enumerate() {
      let value = self.processor.process(value, &def.processing);
      if let Some(trace) = trace.as_mut() {
        trace.record_processed(PipelineTrace::item_key(source_id, index), &value);
      }
      processed.push(value);
    }

    if let Some(trace) = trace.as_mut() {
      trace.enter_for_source(PipelineStage::Merging, source_id);
    }
    let result = match self.merger.try_merge(&processed, &source.merge_strategy) {
      Ok(data) => DataSourceResult::succeeded(source_id, source_type, data),
      Err(e) => {
        warn!(source_id, error = %e, "source_failed");
        DataSourceResult::failed(source_id, source_type, e.to_string())
      }
    };
    if let Some(trace) = trace.as_mut() {
      trace.record_merged(source_id, &result.data, result.success);
    }

    (result, trace)
  }

  /// Check a configuration without running it. Returns one message per
  /// problem; an empty list means the configuration is runnable.
  pub fn validate(config: &PipelineConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.widget_id.trim().is_empty() {
      problems.push("widget id is required".to_string());
    }
    if config.data_sources.is_empty() {
      problems.push("at least one data source is required".to_string());
    }

    let mut seen = HashSet::new();
    for (index, source) in config.data_sources.iter().enumerate() {
      let name = if source.source_id.trim().is_empty() {
        problems.push(format!("source #{} has no id", index));
        format!("#{}", index)
      } else {
        if !seen.insert(source.source_id.as_str()) {
          problems.push(format!("duplicate source id '{}'", source.source_id));
        }
        format!("'{}'", source.source_id)
      };

      if source.data_items.is_empty() {
        problems.push(format!("source {} has no data items", name));
      }
      if !validate_strategy(&source.merge_strategy) {
        problems.push(format!(
          "source {} has an invalid '{}' merge strategy",
          name,
          source.merge_strategy.kind()
        ));
      }

      for (item_index, def) in source.data_items.iter().enumerate() {
        match &def.item {
          DataItemConfig::Http(http) if http.url.trim().is_empty() => {
            problems.push(format!("source {} item {} has an empty url", name, item_index));
          }
          DataItemConfig::Socket(socket) if socket.url.trim().is_empty() => {
            problems.push(format!("source {} item {} has an empty url", name, item_index));
          }
          DataItemConfig::Script(script) if script.script.trim().is_empty() => {
            problems.push(format!("source {} item {} has an empty script", name, item_index));
          }
          _ => {}
        }
        if let Err(e) = parse_path(&def.processing.filter_path) {
          problems.push(format!("source {} item {}: {}", name, item_index, e));
        }
      }
    }

    problems
  }

  pub fn statistics() -> PipelineStatistics {
    PipelineStatistics {
      item_kinds: vec!["static", "json", "http", "socket", "script"],
      merge_strategies: vec!["object", "array", "select", "script"],
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
