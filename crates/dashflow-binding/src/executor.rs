//! What the trigger engine calls to refresh a widget.

use std::sync::Arc;

use async_trait::async_trait;
use dashflow_bridge::DataBridge;
use dashflow_config::{DataSourceSpec, WidgetRequirement};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WidgetConfig;
use crate::error::BindingError;

/// Everything an executor needs for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
  pub widget_id: String,
  /// The widget's configuration at the moment the execution started.
  pub config: WidgetConfig,
  pub params: serde_json::Map<String, serde_json::Value>,
  pub reason: String,
}

/// Layers that may hold a widget's data source declarations.
const DATA_SOURCE_LAYERS: [&str; 2] = ["data_source", "dataSource"];

#[derive(Deserialize)]
struct DataSourceLayer {
  #[serde(default, alias = "dataSources")]
  data_sources: Vec<DataSourceSpec>,
}

impl ExecutionRequest {
  /// The widget requirement described by the data source layer, with the
  /// request params attached. `None` when the widget declares no sources.
  pub fn requirement(&self) -> Result<Option<WidgetRequirement>, BindingError> {
    let Some(layer) = DATA_SOURCE_LAYERS
      .iter()
      .find_map(|name| self.config.layer(name))
    else {
      return Ok(None);
    };

    let layer: DataSourceLayer =
      serde_json::from_value(layer.clone()).map_err(|e| BindingError::InvalidConfig {
        widget_id: self.widget_id.clone(),
        message: e.to_string(),
      })?;
    if layer.data_sources.is_empty() {
      return Ok(None);
    }

    let mut requirement = WidgetRequirement::new(self.widget_id.clone(), layer.data_sources);
    requirement.params = self.params.clone();
    Ok(Some(requirement))
  }
}

/// Refreshes a widget's data.
#[async_trait]
pub trait WidgetExecutor: Send + Sync {
  async fn execute(&self, request: ExecutionRequest) -> Result<(), BindingError>;
}

/// Executes widgets through a [`DataBridge`], dropping cached data first so
/// every trigger refetches instead of being answered from the cache.
pub struct BridgeExecutor {
  bridge: Arc<DataBridge>,
}

impl BridgeExecutor {
  pub fn new(bridge: Arc<DataBridge>) -> Self {
    Self { bridge }
  }
}

#[async_trait]
impl WidgetExecutor for BridgeExecutor {
  async fn execute(&self, request: ExecutionRequest) -> Result<(), BindingError> {
    let Some(requirement) = request.requirement()? else {
      debug!(widget_id = %request.widget_id, "no_data_sources");
      return Ok(());
    };

    self.bridge.clear_widget(&request.widget_id);
    let result = self.bridge.execute_widget(&requirement).await;
    if result.success {
      Ok(())
    } else {
      Err(BindingError::Execution {
        widget_id: request.widget_id,
        message: result.error.unwrap_or_default(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn request(config: serde_json::Value) -> ExecutionRequest {
    ExecutionRequest {
      widget_id: "w1".to_string(),
      config: serde_json::from_value(config).unwrap(),
      params: json!({ "deviceId": "d-1" }).as_object().cloned().unwrap(),
      reason: "test".to_string(),
    }
  }

  #[test]
  fn test_requirement_from_data_source_layer() {
    let request = request(json!({
      "dataSource": {
        "dataSources": [{ "id": "s", "type": "static", "config": { "data": 1 } }]
      }
    }));
    let requirement = request.requirement().unwrap().unwrap();
    assert_eq!(requirement.widget_id, "w1");
    assert_eq!(requirement.data_sources[0].id, "s");
    assert_eq!(requirement.params["deviceId"], json!("d-1"));
  }

  #[test]
  fn test_no_data_source_layer() {
    let request = request(json!({ "base": { "deviceId": "d-1" } }));
    assert!(request.requirement().unwrap().is_none());
  }

  #[test]
  fn test_malformed_layer_is_invalid_config() {
    let request = request(json!({ "data_source": { "data_sources": "nope" } }));
    assert!(matches!(
      request.requirement(),
      Err(BindingError::InvalidConfig { .. })
    ));
  }

  #[tokio::test]
  async fn test_bridge_executor_caches_result() {
    let bridge = Arc::new(DataBridge::new(&Default::default()));
    let executor = BridgeExecutor::new(bridge.clone());
    executor
      .execute(request(json!({
        "data_source": {
          "data_sources": [{ "id": "s", "type": "static", "config": { "data": { "v": 2 } } }]
        }
      })))
      .await
      .unwrap();

    let cached = bridge.get_widget_data("w1").unwrap();
    assert_eq!(cached["s"]["data"], json!({ "v": 2 }));
  }
}
