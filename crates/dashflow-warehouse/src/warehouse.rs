//! The data warehouse.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use dashflow_config::WarehouseSettings;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::entry::{CacheEntry, EntrySource, estimate_size};
use crate::error::WarehouseError;
use crate::metrics::{
  MetricsRecorder, PerformanceMetrics, StorageStats, SweepReport, WidgetStats,
};
use crate::sweeper::spawn_sweeper;

/// Cached values of one widget, keyed by source id.
pub type WidgetData = BTreeMap<String, serde_json::Value>;

/// Eviction keeps going until memory use is below this share of the budget.
const MEMORY_PRESSURE_RATIO: f64 = 0.8;

/// One widget's partition.
#[derive(Debug)]
struct WidgetStorage {
  sources: BTreeMap<String, CacheEntry>,
  merged: Option<MergedView>,
  created_at: u64,
  updated_at: u64,
  /// Set once the partition has been unlinked from the warehouse. Writers
  /// holding a stale handle must look the widget up again.
  removed: bool,
}

/// The assembled bag of a widget, valid until its earliest source expires.
#[derive(Debug)]
struct MergedView {
  data: WidgetData,
  expires_at: u64,
}

impl WidgetStorage {
  fn new(now: u64) -> Self {
    Self {
      sources: BTreeMap::new(),
      merged: None,
      created_at: now,
      updated_at: now,
      removed: false,
    }
  }

  fn size_bytes(&self) -> u64 {
    self.sources.values().map(|e| e.size_bytes).sum()
  }
}

type Partition = Arc<Mutex<WidgetStorage>>;

/// Per-widget, per-source cache with expiry, admission limits and
/// least-used eviction.
///
/// The widget map is only write-locked to add or unlink a widget. Each
/// widget has its own lock, so writes to different widgets never contend,
/// and a write invalidates only its own widget's merged view.
#[derive(Debug)]
pub struct DataWarehouse {
  widgets: RwLock<HashMap<String, Partition>>,
  settings: WarehouseSettings,
  default_ttl_ms: AtomicU64,
  clock: Arc<dyn Clock>,
  memory_bytes: AtomicU64,
  item_count: AtomicU64,
  metrics: MetricsRecorder,
  sweeper: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl DataWarehouse {
  pub fn new(settings: WarehouseSettings) -> Self {
    Self::with_clock(settings, Arc::new(SystemClock))
  }

  pub fn with_clock(settings: WarehouseSettings, clock: Arc<dyn Clock>) -> Self {
    Self {
      widgets: RwLock::new(HashMap::new()),
      default_ttl_ms: AtomicU64::new(settings.default_ttl_ms),
      metrics: MetricsRecorder::new(settings.enable_metrics),
      settings,
      clock,
      memory_bytes: AtomicU64::new(0),
      item_count: AtomicU64::new(0),
      sweeper: Mutex::new(None),
    }
  }

  /// Store a source value for a widget. `ttl_ms` overrides the default
  /// time-to-live for this entry.
  pub fn store(
    &self,
    widget_id: &str,
    source_id: &str,
    data: serde_json::Value,
    source_type: &str,
    ttl_ms: Option<u64>,
  ) -> Result<(), WarehouseError> {
    let started = Instant::now();
    let size_bytes = estimate_size(&data);
    let mut reclaimed = false;

    loop {
      let partition = self.partition_or_create(widget_id);
      let mut storage = lock(&partition);
      if storage.removed {
        continue;
      }

      let replaced = storage.sources.get(source_id).map(|e| e.size_bytes);
      if let Err(e) = self.admit(widget_id, source_id, size_bytes, replaced) {
        drop(storage);
        // Expired entries keep counting against the limits until a read or
        // a sweep drops them.
        if !reclaimed {
          reclaimed = true;
          let dropped = self.drop_all_expired(self.clock.now_ms());
          if dropped > 0 {
            debug!(widget_id, source_id, dropped, "warehouse_reclaimed_expired");
            continue;
          }
        }
        warn!(widget_id, source_id, size_bytes, error = %e, "warehouse_store_rejected");
        return Err(e);
      }

      let now = self.clock.now_ms();
      let ttl = ttl_ms.unwrap_or_else(|| self.default_ttl_ms.load(Ordering::Relaxed));
      let entry = CacheEntry {
        data,
        stored_at: now,
        expires_at: now.saturating_add(ttl),
        source: EntrySource {
          source_id: source_id.to_string(),
          source_type: source_type.to_string(),
          widget_id: widget_id.to_string(),
        },
        size_bytes,
        access_count: 0,
        last_accessed: now,
      };

      match storage.sources.insert(source_id.to_string(), entry) {
        Some(old) => {
          self.memory_bytes.fetch_sub(old.size_bytes, Ordering::SeqCst);
        }
        None => {
          self.item_count.fetch_add(1, Ordering::SeqCst);
        }
      }
      self.memory_bytes.fetch_add(size_bytes, Ordering::SeqCst);
      storage.merged = None;
      storage.updated_at = now;
      drop(storage);

      debug!(widget_id, source_id, size_bytes, "warehouse_stored");
      self.metrics.record_store(started.elapsed());
      return Ok(());
    }
  }

  fn admit(
    &self,
    widget_id: &str,
    source_id: &str,
    size_bytes: u64,
    replaced: Option<u64>,
  ) -> Result<(), WarehouseError> {
    let reject = |message: String| {
      Err(WarehouseError::CapacityExceeded {
        widget_id: widget_id.to_string(),
        source_id: source_id.to_string(),
        message,
      })
    };

    let current = self.memory_bytes.load(Ordering::SeqCst);
    let projected = current - replaced.unwrap_or(0).min(current) + size_bytes;
    if projected > self.settings.max_memory_bytes {
      return reject(format!(
        "{} bytes would exceed the {} byte memory budget",
        projected, self.settings.max_memory_bytes
      ));
    }

    if replaced.is_none() && self.item_count.load(Ordering::SeqCst) >= self.settings.max_items as u64
    {
      return reject(format!(
        "the cache already holds its maximum of {} items",
        self.settings.max_items
      ));
    }

    Ok(())
  }

  /// The widget's bag of unexpired source values, or `None` when it has
  /// none. Expired entries are dropped on the way.
  pub fn get(&self, widget_id: &str) -> Option<WidgetData> {
    let started = Instant::now();
    let result = self.read_bag(widget_id);
    self.metrics.record_read(result.is_some(), started.elapsed());
    result
  }

  fn read_bag(&self, widget_id: &str) -> Option<WidgetData> {
    let partition = self.partition(widget_id)?;
    let mut storage = lock(&partition);
    let now = self.clock.now_ms();

    if let Some(merged) = &storage.merged {
      if now <= merged.expires_at {
        let data = merged.data.clone();
        for entry in storage.sources.values_mut() {
          entry.touch(now);
        }
        return Some(data);
      }
    }

    self.drop_expired(&mut storage, now);
    if storage.sources.is_empty() {
      return None;
    }

    let mut data = WidgetData::new();
    let mut expires_at = u64::MAX;
    for (source_id, entry) in storage.sources.iter_mut() {
      entry.touch(now);
      expires_at = expires_at.min(entry.expires_at);
      data.insert(source_id.clone(), entry.data.clone());
    }
    storage.merged = Some(MergedView {
      data: data.clone(),
      expires_at,
    });

    Some(data)
  }

  /// One source value of a widget, if present and unexpired.
  pub fn get_one(&self, widget_id: &str, source_id: &str) -> Option<serde_json::Value> {
    let started = Instant::now();
    let result = self.partition(widget_id).and_then(|partition| {
      let mut storage = lock(&partition);
      let now = self.clock.now_ms();
      let expired = storage.sources.get(source_id)?.is_expired(now);
      if expired {
        self.remove_entry(&mut storage, source_id);
        return None;
      }
      let entry = storage.sources.get_mut(source_id)?;
      entry.touch(now);
      Some(entry.data.clone())
    });
    self.metrics.record_read(result.is_some(), started.elapsed());
    result
  }

  /// Drop every cached value of one widget.
  pub fn clear_widget(&self, widget_id: &str) {
    let removed = self
      .widgets
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .remove(widget_id);
    if let Some(partition) = removed {
      let mut storage = lock(&partition);
      self.unlink(&mut storage);
      debug!(widget_id, "warehouse_widget_cleared");
    }
  }

  /// Drop one source value of a widget.
  pub fn clear_source(&self, widget_id: &str, source_id: &str) {
    if let Some(partition) = self.partition(widget_id) {
      let mut storage = lock(&partition);
      self.remove_entry(&mut storage, source_id);
    }
  }

  /// Drop everything and reset the hit/miss counters.
  pub fn clear_all(&self) {
    let drained: Vec<Partition> = self
      .widgets
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .drain()
      .map(|(_, partition)| partition)
      .collect();
    for partition in drained {
      let mut storage = lock(&partition);
      self.unlink(&mut storage);
    }
    self.metrics.reset();
    info!("warehouse_cleared");
  }

  /// Time-to-live for entries stored from now on.
  pub fn set_default_ttl(&self, ttl_ms: u64) {
    self.default_ttl_ms.store(ttl_ms, Ordering::Relaxed);
  }

  pub fn default_ttl(&self) -> u64 {
    self.default_ttl_ms.load(Ordering::Relaxed)
  }

  pub fn storage_stats(&self) -> StorageStats {
    let mut widgets = BTreeMap::new();
    let mut total_sources = 0;
    let mut total_size_bytes = 0;

    for (widget_id, partition) in self.partitions() {
      let storage = lock(&partition);
      let size = storage.size_bytes();
      total_sources += storage.sources.len();
      total_size_bytes += size;
      widgets.insert(
        widget_id,
        WidgetStats {
          source_count: storage.sources.len(),
          total_size_bytes: size,
          created_at: storage.created_at,
          updated_at: storage.updated_at,
        },
      );
    }

    let mut settings = self.settings.clone();
    settings.default_ttl_ms = self.default_ttl();
    StorageStats {
      total_widgets: widgets.len(),
      total_sources,
      total_size_bytes,
      memory_usage_mb: total_size_bytes as f64 / (1024.0 * 1024.0),
      widgets,
      settings,
    }
  }

  pub fn performance_metrics(&self) -> PerformanceMetrics {
    self.metrics.snapshot(
      self.memory_bytes.load(Ordering::SeqCst),
      self.item_count.load(Ordering::SeqCst),
      self.widgets.read().unwrap_or_else(|e| e.into_inner()).len(),
    )
  }

  /// Remove expired entries and empty widgets, then evict least-used entries
  /// while the cache is over its memory threshold or item ceiling.
  pub fn sweep(&self) -> SweepReport {
    let now = self.clock.now_ms();
    let mut report = SweepReport::default();

    let mut empty = Vec::new();
    for (widget_id, partition) in self.partitions() {
      let mut storage = lock(&partition);
      report.expired += self.drop_expired(&mut storage, now);
      if storage.merged.as_ref().is_some_and(|m| now > m.expires_at) {
        storage.merged = None;
      }
      if storage.sources.is_empty() {
        empty.push(widget_id);
      }
    }

    if !empty.is_empty() {
      let mut widgets = self.widgets.write().unwrap_or_else(|e| e.into_inner());
      for widget_id in empty {
        let still_empty = widgets
          .get(&widget_id)
          .is_some_and(|partition| lock(partition).sources.is_empty());
        if still_empty {
          if let Some(partition) = widgets.remove(&widget_id) {
            lock(&partition).removed = true;
            report.widgets_removed += 1;
          }
        }
      }
    }

    report.evicted = self.evict_under_pressure();
    self.metrics.record_sweep(now);

    if report != SweepReport::default() {
      info!(
        expired = report.expired,
        evicted = report.evicted,
        widgets_removed = report.widgets_removed,
        "warehouse_swept"
      );
    }
    report
  }

  fn over_limits(&self) -> bool {
    let memory_threshold = self.settings.max_memory_bytes as f64 * MEMORY_PRESSURE_RATIO;
    self.memory_bytes.load(Ordering::SeqCst) as f64 > memory_threshold
      || self.item_count.load(Ordering::SeqCst) > self.settings.max_items as u64
  }

  fn evict_under_pressure(&self) -> usize {
    if !self.over_limits() {
      return 0;
    }

    // (access_count, last_accessed, widget, source), least used first.
    let mut candidates = Vec::new();
    for (widget_id, partition) in self.partitions() {
      let storage = lock(&partition);
      for (source_id, entry) in &storage.sources {
        candidates.push((
          entry.access_count,
          entry.last_accessed,
          widget_id.clone(),
          source_id.clone(),
        ));
      }
    }
    candidates.sort();

    let mut evicted = 0;
    for (access_count, _, widget_id, source_id) in candidates {
      if !self.over_limits() {
        break;
      }
      if let Some(partition) = self.partition(&widget_id) {
        let mut storage = lock(&partition);
        if self.remove_entry(&mut storage, &source_id) {
          debug!(%widget_id, %source_id, access_count, "warehouse_evicted");
          evicted += 1;
        }
      }
    }
    evicted
  }

  /// Run [`sweep`](Self::sweep) every `cleanup_interval_ms` until
  /// [`destroy`](Self::destroy) is called or the warehouse is dropped.
  /// Starting again replaces the running sweeper.
  ///
  /// Returns `false` without starting anything when called outside a tokio
  /// runtime.
  pub fn start_sweeper(self: &Arc<Self>) -> bool {
    let Ok(runtime) = Handle::try_current() else {
      debug!("warehouse_sweeper_no_runtime");
      return false;
    };
    let interval = Duration::from_millis(self.settings.cleanup_interval_ms.max(1));
    let token = CancellationToken::new();
    let handle = spawn_sweeper(&runtime, Arc::downgrade(self), interval, token.clone());

    let previous = self
      .sweeper
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .replace((handle, token));
    if let Some((_, previous)) = previous {
      previous.cancel();
    }
    true
  }

  pub fn sweeper_running(&self) -> bool {
    self
      .sweeper
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .as_ref()
      .is_some_and(|(handle, _)| !handle.is_finished())
  }

  /// Stop the sweeper and drop everything.
  pub fn destroy(&self) {
    self.stop_sweeper();
    self.clear_all();
  }

  fn stop_sweeper(&self) {
    let running = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some((_, token)) = running {
      token.cancel();
    }
  }

  fn partition(&self, widget_id: &str) -> Option<Partition> {
    self
      .widgets
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(widget_id)
      .cloned()
  }

  fn partition_or_create(&self, widget_id: &str) -> Partition {
    if let Some(partition) = self.partition(widget_id) {
      return partition;
    }
    let now = self.clock.now_ms();
    self
      .widgets
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .entry(widget_id.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(WidgetStorage::new(now))))
      .clone()
  }

  fn partitions(&self) -> Vec<(String, Partition)> {
    self
      .widgets
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .map(|(id, partition)| (id.clone(), partition.clone()))
      .collect()
  }

  fn drop_all_expired(&self, now: u64) -> usize {
    self
      .partitions()
      .into_iter()
      .map(|(_, partition)| self.drop_expired(&mut lock(&partition), now))
      .sum()
  }

  fn drop_expired(&self, storage: &mut WidgetStorage, now: u64) -> usize {
    let expired: Vec<String> = storage
      .sources
      .iter()
      .filter(|(_, entry)| entry.is_expired(now))
      .map(|(id, _)| id.clone())
      .collect();
    for source_id in &expired {
      self.remove_entry(storage, source_id);
    }
    expired.len()
  }

  fn remove_entry(&self, storage: &mut WidgetStorage, source_id: &str) -> bool {
    match storage.sources.remove(source_id) {
      Some(entry) => {
        self.memory_bytes.fetch_sub(entry.size_bytes, Ordering::SeqCst);
        self.item_count.fetch_sub(1, Ordering::SeqCst);
        storage.merged = None;
        true
      }
      None => false,
    }
  }

  fn unlink(&self, storage: &mut WidgetStorage) {
    let ids: Vec<String> = storage.sources.keys().cloned().collect();
    for source_id in &ids {
      self.remove_entry(storage, source_id);
    }
    storage.removed = true;
  }
}

impl Drop for DataWarehouse {
  fn drop(&mut self) {
    self.stop_sweeper();
  }
}

fn lock(partition: &Mutex<WidgetStorage>) -> MutexGuard<'_, WidgetStorage> {
  partition.lock().unwrap_or_else(|e| e.into_inner())
}
