//! The data bridge.

use std::sync::Arc;

use dashflow_config::{DashflowSettings, WidgetRequirement};
use dashflow_pipeline::{ComponentData, PipelineCoordinator, SourceEntry, integrate};
use dashflow_warehouse::{DataWarehouse, PerformanceMetrics, StorageStats, WidgetData};
use tracing::{debug, info, instrument, warn};

use crate::convert::convert_requirement;
use crate::events::{DataListener, ListenerSet, Subscription};
use crate::result::{BridgeStats, DataResult, WarehouseSummary};

/// Runs widget requirements through the pipeline, writes the resulting data
/// bag into the warehouse and tells listeners about it.
///
/// Bridges are independent: each owns its listeners and shares only the
/// warehouse it was given.
pub struct DataBridge {
  coordinator: PipelineCoordinator,
  warehouse: Arc<DataWarehouse>,
  listeners: Arc<ListenerSet>,
}

impl DataBridge {
  /// Create a bridge with its own coordinator and warehouse.
  ///
  /// Inside a tokio runtime the warehouse sweeper starts right away and runs
  /// until [`destroy`](Self::destroy). Elsewhere expired entries are only
  /// dropped when they are read or when a store needs their room.
  pub fn new(settings: &DashflowSettings) -> Self {
    let warehouse = Arc::new(DataWarehouse::new(settings.warehouse.clone()));
    warehouse.start_sweeper();
    Self::with_parts(PipelineCoordinator::new(settings), warehouse)
  }

  /// Build a bridge around a warehouse owned by the caller, who decides
  /// whether its sweeper runs.
  pub fn with_parts(coordinator: PipelineCoordinator, warehouse: Arc<DataWarehouse>) -> Self {
    Self {
      coordinator,
      warehouse,
      listeners: Arc::new(ListenerSet::default()),
    }
  }

  pub fn warehouse(&self) -> &Arc<DataWarehouse> {
    &self.warehouse
  }

  /// Supply data for a widget.
  ///
  /// A cached bag holding every declared source is returned (and announced
  /// to listeners) without running the pipeline. Otherwise the sources are
  /// fetched: they run concurrently and fail independently, and a failed
  /// source shows up in the bag with `success: false`. The result is only a
  /// failure when the pipeline could not integrate the sources at all.
  ///
  /// A requirement without sources drops whatever was cached for the widget.
  #[instrument(name = "bridge_execute", skip_all, fields(widget_id = %requirement.widget_id))]
  pub async fn execute_widget(&self, requirement: &WidgetRequirement) -> DataResult {
    let widget_id = requirement.widget_id.as_str();
    if requirement.data_sources.is_empty() {
      self.warehouse.clear_widget(widget_id);
    } else if let Some(data) = self.cached(requirement) {
      debug!(sources = data.len(), "bridge_cache_hit");
      self.listeners.notify(widget_id, &data);
      return DataResult::succeeded(data);
    }

    let converted = convert_requirement(requirement);
    for rejected in &converted.rejected {
      warn!(
        source_id = %rejected.source_id,
        error = rejected.error.as_deref().unwrap_or_default(),
        "source_rejected"
      );
    }

    let result = self.coordinator.run(&converted.config, false).await;
    if !result.success {
      let error = result
        .error
        .unwrap_or_else(|| "pipeline failed".to_string());
      warn!(%error, "bridge_execute_failed");
      return DataResult::failed(error);
    }

    let mut data = result.component_data;
    data.extend(integrate(&converted.rejected, widget_id));

    self.cache(widget_id, &data);
    self.listeners.notify(widget_id, &data);

    info!(
      sources = data.len(),
      failed = data.values().filter(|e| !e.metadata.success).count(),
      execution_time_ms = result.execution_time_ms,
      "bridge_execute_completed"
    );
    DataResult::succeeded(data)
  }

  /// The cached bag of the requirement's sources, if all of them are cached.
  fn cached(&self, requirement: &WidgetRequirement) -> Option<ComponentData> {
    let mut bag = self.warehouse.get(&requirement.widget_id)?;
    let mut data = ComponentData::new();
    for source in &requirement.data_sources {
      let value = bag.remove(&source.id)?;
      match serde_json::from_value::<SourceEntry>(value) {
        Ok(entry) => {
          data.insert(source.id.clone(), entry);
        }
        Err(e) => {
          warn!(source_id = %source.id, error = %e, "cache_decode_failed");
          return None;
        }
      }
    }
    Some(data)
  }

  fn cache(&self, widget_id: &str, data: &ComponentData) {
    for (source_id, entry) in data {
      let value = match serde_json::to_value(entry) {
        Ok(value) => value,
        Err(e) => {
          warn!(widget_id, %source_id, error = %e, "cache_encode_failed");
          continue;
        }
      };
      if let Err(e) = self
        .warehouse
        .store(widget_id, source_id, value, &entry.source_type, None)
      {
        warn!(widget_id, %source_id, error = %e, "cache_store_failed");
      }
    }
  }

  /// Register a listener for refreshed data bags.
  pub fn on_data_update(&self, listener: impl DataListener + 'static) -> Subscription {
    self.listeners.add(Arc::new(listener))
  }

  /// The cached bag of a widget: source id to serialized source entry.
  pub fn get_widget_data(&self, widget_id: &str) -> Option<WidgetData> {
    self.warehouse.get(widget_id)
  }

  pub fn clear_widget(&self, widget_id: &str) {
    self.warehouse.clear_widget(widget_id);
  }

  pub fn clear_all(&self) {
    self.warehouse.clear_all();
  }

  /// Time-to-live for data cached from now on.
  pub fn set_cache_expiry(&self, ttl_ms: u64) {
    self.warehouse.set_default_ttl(ttl_ms);
  }

  pub fn storage_stats(&self) -> StorageStats {
    self.warehouse.storage_stats()
  }

  pub fn performance_metrics(&self) -> PerformanceMetrics {
    self.warehouse.performance_metrics()
  }

  pub fn stats(&self) -> BridgeStats {
    let storage = self.warehouse.storage_stats();
    BridgeStats {
      active_listeners: self.listeners.len(),
      timestamp: chrono::Utc::now(),
      warehouse: WarehouseSummary {
        total_widgets: storage.total_widgets,
        total_sources: storage.total_sources,
        memory_usage_mb: storage.memory_usage_mb,
      },
    }
  }

  /// Drop every listener and tear down the warehouse.
  pub fn destroy(&self) {
    self.listeners.clear();
    self.warehouse.destroy();
    debug!("bridge_destroyed");
  }
}
