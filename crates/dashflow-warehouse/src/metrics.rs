//! Warehouse metrics and statistics.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashflow_config::WarehouseSettings;
use serde::{Deserialize, Serialize};

/// Point-in-time performance figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
  pub hits: u64,
  pub misses: u64,
  /// hits / (hits + misses), or 0 before the first read.
  pub hit_rate: f64,
  /// Moving average of store and read latency.
  pub average_response_us: f64,
  pub memory_usage_bytes: u64,
  pub item_count: u64,
  pub widget_count: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_sweep_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetStats {
  pub source_count: usize,
  pub total_size_bytes: u64,
  pub created_at: u64,
  pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
  pub total_widgets: usize,
  pub total_sources: usize,
  pub total_size_bytes: u64,
  pub memory_usage_mb: f64,
  pub widgets: BTreeMap<String, WidgetStats>,
  pub settings: WarehouseSettings,
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
  pub expired: usize,
  pub evicted: usize,
  pub widgets_removed: usize,
}

/// Hit/miss counters and latency average.
#[derive(Debug)]
pub(crate) struct MetricsRecorder {
  enabled: bool,
  hits: AtomicU64,
  misses: AtomicU64,
  average_response_us: Mutex<f64>,
  last_sweep_at: Mutex<Option<u64>>,
}

impl MetricsRecorder {
  pub(crate) fn new(enabled: bool) -> Self {
    Self {
      enabled,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      average_response_us: Mutex::new(0.0),
      last_sweep_at: Mutex::new(None),
    }
  }

  pub(crate) fn record_read(&self, hit: bool, elapsed: Duration) {
    if !self.enabled {
      return;
    }
    if hit {
      self.hits.fetch_add(1, Ordering::Relaxed);
    } else {
      self.misses.fetch_add(1, Ordering::Relaxed);
    }
    self.record_latency(elapsed);
  }

  pub(crate) fn record_store(&self, elapsed: Duration) {
    if self.enabled {
      self.record_latency(elapsed);
    }
  }

  fn record_latency(&self, elapsed: Duration) {
    let sample = elapsed.as_secs_f64() * 1_000_000.0;
    let mut average = self
      .average_response_us
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    *average = if *average == 0.0 {
      sample
    } else {
      (*average + sample) / 2.0
    };
  }

  pub(crate) fn record_sweep(&self, at_ms: u64) {
    *self.last_sweep_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(at_ms);
  }

  pub(crate) fn reset(&self) {
    self.hits.store(0, Ordering::Relaxed);
    self.misses.store(0, Ordering::Relaxed);
    *self
      .average_response_us
      .lock()
      .unwrap_or_else(|e| e.into_inner()) = 0.0;
  }

  pub(crate) fn snapshot(
    &self,
    memory_usage_bytes: u64,
    item_count: u64,
    widget_count: usize,
  ) -> PerformanceMetrics {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total = hits + misses;
    PerformanceMetrics {
      hits,
      misses,
      hit_rate: if total == 0 {
        0.0
      } else {
        hits as f64 / total as f64
      },
      average_response_us: *self
        .average_response_us
        .lock()
        .unwrap_or_else(|e| e.into_inner()),
      memory_usage_bytes,
      item_count,
      widget_count,
      last_sweep_at: *self.last_sweep_at.lock().unwrap_or_else(|e| e.into_inner()),
    }
  }
}
