//! Requirement to pipeline conversion.

use dashflow_config::{
  DataItemConfig, DataItemDef, DataSourceDef, DataSourceSpec, HttpParam, MergeStrategy,
  PipelineConfig, ProcessingConfig, WidgetRequirement,
};
use dashflow_pipeline::DataSourceResult;

type Params = serde_json::Map<String, serde_json::Value>;

/// A requirement turned into one pipeline configuration.
#[derive(Debug, Clone)]
pub struct ConvertedRequirement {
  pub config: PipelineConfig,
  /// Sources whose declaration could not be turned into an item. They are
  /// reported as failed without being run.
  pub rejected: Vec<DataSourceResult>,
}

/// Build the pipeline configuration for a requirement.
///
/// A simple source becomes a one-item source using its filter path (root
/// when absent), its transform and the `object` strategy. A source that
/// lists its own items keeps them and its merge strategy. The requirement's
/// params are appended to every HTTP item as query parameters, except where
/// the item already declares the key.
pub fn convert_requirement(requirement: &WidgetRequirement) -> ConvertedRequirement {
  let mut data_sources = Vec::with_capacity(requirement.data_sources.len());
  let mut rejected = Vec::new();

  for spec in &requirement.data_sources {
    match convert_source(spec, &requirement.params) {
      Ok(source) => data_sources.push(source),
      Err(message) => {
        rejected.push(DataSourceResult::failed(&spec.id, spec.kind.as_str(), message));
      }
    }
  }

  let mut config = PipelineConfig::new(requirement.widget_id.clone(), data_sources);
  config.params = requirement.params.clone();

  ConvertedRequirement { config, rejected }
}

fn convert_source(spec: &DataSourceSpec, params: &Params) -> Result<DataSourceDef, String> {
  if !spec.data_items.is_empty() {
    let data_items = spec
      .data_items
      .iter()
      .map(|def| DataItemDef::new(with_request_params(&def.item, params), def.processing.clone()))
      .collect();
    return Ok(DataSourceDef {
      source_id: spec.id.clone(),
      data_items,
      merge_strategy: spec.merge_strategy.clone().unwrap_or_default(),
    });
  }

  let item = spec
    .to_item()
    .map_err(|e| format!("invalid {} source config: {}", spec.kind.as_str(), e))?;

  let filter_path = match spec.filter_path.as_deref().map(str::trim) {
    None | Some("") => "$".to_string(),
    Some(path) => path.to_string(),
  };
  let processing = ProcessingConfig {
    filter_path,
    transform_script: spec.transform_script.clone(),
    ..ProcessingConfig::default()
  };

  Ok(DataSourceDef {
    source_id: spec.id.clone(),
    data_items: vec![DataItemDef::new(
      with_request_params(&item, params),
      processing,
    )],
    merge_strategy: MergeStrategy::Object,
  })
}

fn with_request_params(item: &DataItemConfig, params: &Params) -> DataItemConfig {
  match item {
    DataItemConfig::Http(http) if !params.is_empty() => {
      let mut http = http.clone();
      for (key, value) in params {
        if !http.params.iter().any(|p| &p.key == key) {
          http.params.push(HttpParam {
            key: key.clone(),
            value: value.clone(),
            enabled: true,
          });
        }
      }
      DataItemConfig::Http(http)
    }
    other => other.clone(),
  }
}
