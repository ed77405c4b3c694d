//! Debug trace of a pipeline run.
//!
//! Only collected when a run is started with `debug = true`. Each source
//! builds its own partial trace while it runs; the coordinator absorbs them
//! once every source has finished, so no locking is needed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
  Idle,
  Fetching,
  Processing,
  Merging,
  Integrating,
  Done,
}

/// A value captured at one point of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub data: serde_json::Value,
  pub timestamp: DateTime<Utc>,
  pub success: bool,
}

impl Snapshot {
  pub fn now(data: serde_json::Value, success: bool) -> Self {
    Self {
      data,
      timestamp: Utc::now(),
      success,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
  pub stage: PipelineStage,
  /// Set for the per-source stages (fetching, processing, merging).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_id: Option<String>,
  pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrace {
  /// Fetched values keyed `<source_id>_item_<n>`.
  pub raw_data: BTreeMap<String, Snapshot>,
  /// Processed values keyed `<source_id>_item_<n>`.
  pub processed_data: BTreeMap<String, Snapshot>,
  /// Merged values keyed by source id.
  pub merged_data: BTreeMap<String, Snapshot>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub final_data: Option<Snapshot>,
  pub stages: Vec<StageTransition>,
}

impl PipelineTrace {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn item_key(source_id: &str, index: usize) -> String {
    format!("{}_item_{}", source_id, index)
  }

  pub fn enter(&mut self, stage: PipelineStage) {
    self.stages.push(StageTransition {
      stage,
      source_id: None,
      at: Utc::now(),
    });
  }

  pub fn enter_for_source(&mut self, stage: PipelineStage, source_id: &str) {
    self.stages.push(StageTransition {
      stage,
      source_id: Some(source_id.to_string()),
      at: Utc::now(),
    });
  }

  pub fn record_raw(&mut self, key: String, data: &serde_json::Value, success: bool) {
    self.raw_data.insert(key, Snapshot::now(data.clone(), success));
  }

  pub fn record_processed(&mut self, key: String, data: &serde_json::Value) {
    self
      .processed_data
      .insert(key, Snapshot::now(data.clone(), true));
  }

  pub fn record_merged(&mut self, source_id: &str, data: &serde_json::Value, success: bool) {
    self
      .merged_data
      .insert(source_id.to_string(), Snapshot::now(data.clone(), success));
  }

  pub fn record_final(&mut self, data: serde_json::Value, success: bool) {
    self.final_data = Some(Snapshot::now(data, success));
  }

  /// Fold a source's partial trace into this one.
  pub fn absorb(&mut self, partial: PipelineTrace) {
    self.raw_data.extend(partial.raw_data);
    self.processed_data.extend(partial.processed_data);
    self.merged_data.extend(partial.merged_data);
    self.stages.extend(partial.stages);
  }

  /// Current stage: the last one entered, or idle.
  pub fn stage(&self) -> PipelineStage {
    self
      .stages
      .last()
      .map(|t| t.stage)
      .unwrap_or(PipelineStage::Idle)
  }
}
