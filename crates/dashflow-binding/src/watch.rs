//! Property watchers.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::error;

use crate::config::PropertyChange;

type Callback = Arc<dyn Fn(&PropertyChange) + Send + Sync>;

#[derive(Default)]
pub(crate) struct WatcherSet {
  next_id: AtomicU64,
  watchers: RwLock<HashMap<String, BTreeMap<u64, Callback>>>,
}

impl WatcherSet {
  pub(crate) fn add(self: &Arc<Self>, property_path: &str, callback: Callback) -> WatchHandle {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    self
      .watchers
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .entry(property_path.to_string())
      .or_default()
      .insert(id, callback);
    WatchHandle {
      id,
      property_path: property_path.to_string(),
      set: Arc::downgrade(self),
    }
  }

  fn remove(&self, property_path: &str, id: u64) -> bool {
    let mut watchers = self.watchers.write().unwrap_or_else(|e| e.into_inner());
    let Some(callbacks) = watchers.get_mut(property_path) else {
      return false;
    };
    let removed = callbacks.remove(&id).is_some();
    if callbacks.is_empty() {
      watchers.remove(property_path);
    }
    removed
  }

  pub(crate) fn count(&self) -> usize {
    self
      .watchers
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .values()
      .map(BTreeMap::len)
      .sum()
  }

  pub(crate) fn notify(&self, change: &PropertyChange) {
    let callbacks: Vec<Callback> = self
      .watchers
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(&change.property_path)
      .map(|callbacks| callbacks.values().cloned().collect())
      .unwrap_or_default();

    for callback in callbacks {
      if catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
        error!(
          widget_id = %change.widget_id,
          property_path = %change.property_path,
          "property_watcher_panicked"
        );
      }
    }
  }
}

/// Handle returned by
/// [`TriggerEngine::watch_property`](crate::TriggerEngine::watch_property).
#[derive(Debug)]
pub struct WatchHandle {
  id: u64,
  property_path: String,
  set: Weak<WatcherSet>,
}

impl WatchHandle {
  /// Stop watching. Returns false if the watcher was already gone.
  pub fn unwatch(self) -> bool {
    self
      .set
      .upgrade()
      .is_some_and(|set| set.remove(&self.property_path, self.id))
  }
}
