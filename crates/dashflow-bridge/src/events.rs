//! Data update listeners.
//!
//! The bridge calls every registered listener after a widget's data bag has
//! been refreshed and written to the cache.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use dashflow_pipeline::ComponentData;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A refreshed data bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdate {
  pub widget_id: String,
  pub data: ComponentData,
}

/// Receives refreshed data bags.
///
/// Any `Fn(&str, &ComponentData)` closure is a listener.
pub trait DataListener: Send + Sync {
  fn on_data_update(&self, widget_id: &str, data: &ComponentData);
}

impl<F> DataListener for F
where
  F: Fn(&str, &ComponentData) + Send + Sync,
{
  fn on_data_update(&self, widget_id: &str, data: &ComponentData) {
    self(widget_id, data)
  }
}

/// A listener that forwards updates to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
  sender: mpsc::UnboundedSender<DataUpdate>,
}

impl ChannelListener {
  pub fn new(sender: mpsc::UnboundedSender<DataUpdate>) -> Self {
    Self { sender }
  }
}

impl DataListener for ChannelListener {
  fn on_data_update(&self, widget_id: &str, data: &ComponentData) {
    // The receiver may have been dropped.
    let _ = self.sender.send(DataUpdate {
      widget_id: widget_id.to_string(),
      data: data.clone(),
    });
  }
}

#[derive(Default)]
pub(crate) struct ListenerSet {
  next_id: AtomicU64,
  listeners: RwLock<BTreeMap<u64, Arc<dyn DataListener>>>,
}

impl ListenerSet {
  pub(crate) fn add(self: &Arc<Self>, listener: Arc<dyn DataListener>) -> Subscription {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let count = {
      let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
      listeners.insert(id, listener);
      listeners.len()
    };
    debug!(listener_id = id, count, "listener_added");
    Subscription {
      id,
      set: Arc::downgrade(self),
    }
  }

  fn remove(&self, id: u64) -> bool {
    self
      .listeners
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .remove(&id)
      .is_some()
  }

  pub(crate) fn len(&self) -> usize {
    self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub(crate) fn clear(&self) {
    self.listeners.write().unwrap_or_else(|e| e.into_inner()).clear();
  }

  /// Call every listener. A panicking listener is logged and skipped.
  pub(crate) fn notify(&self, widget_id: &str, data: &ComponentData) {
    // Snapshot so listeners can subscribe or unsubscribe while being called.
    let listeners: Vec<(u64, Arc<dyn DataListener>)> = self
      .listeners
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .map(|(id, listener)| (*id, listener.clone()))
      .collect();

    for (id, listener) in listeners {
      let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_data_update(widget_id, data)));
      if let Err(panic) = outcome {
        error!(
          widget_id,
          listener_id = id,
          panic = %panic_message(panic.as_ref()),
          "listener_panicked"
        );
      }
    }
  }
}

/// Handle returned by [`DataBridge::on_data_update`](crate::DataBridge::on_data_update).
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
  id: u64,
  set: Weak<ListenerSet>,
}

impl Subscription {
  /// Remove the listener. Returns false if it was already gone.
  pub fn unsubscribe(self) -> bool {
    match self.set.upgrade() {
      Some(set) => {
        let removed = set.remove(self.id);
        debug!(listener_id = self.id, count = set.len(), "listener_removed");
        removed
      }
      None => false,
    }
  }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  fn set() -> Arc<ListenerSet> {
    Arc::new(ListenerSet::default())
  }

  #[test]
  fn test_closure_listener_called() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let set = set();
    let sink = seen.clone();
    let _sub = set.add(Arc::new(move |widget_id: &str, _: &ComponentData| {
      sink.lock().unwrap().push(widget_id.to_string());
    }));

    set.notify("w1", &ComponentData::new());
    set.notify("w2", &ComponentData::new());
    assert_eq!(*seen.lock().unwrap(), vec!["w1", "w2"]);
  }

  #[test]
  fn test_panicking_listener_isolated() {
    let calls = Arc::new(AtomicU64::new(0));
    let set = set();
    set.add(Arc::new(|_: &str, _: &ComponentData| panic!("boom")));
    let counter = calls.clone();
    set.add(Arc::new(move |_: &str, _: &ComponentData| {
      counter.fetch_add(1, Ordering::SeqCst);
    }));

    set.notify("w1", &ComponentData::new());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_unsubscribe() {
    let calls = Arc::new(AtomicU64::new(0));
    let set = set();
    let counter = calls.clone();
    let sub = set.add(Arc::new(move |_: &str, _: &ComponentData| {
      counter.fetch_add(1, Ordering::SeqCst);
    }));

    set.notify("w1", &ComponentData::new());
    assert!(sub.unsubscribe());
    set.notify("w1", &ComponentData::new());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(set.len(), 0);
  }

  #[tokio::test]
  async fn test_channel_listener() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let set = set();
    set.add(Arc::new(ChannelListener::new(tx)));

    set.notify("w1", &ComponentData::new());
    let update = rx.recv().await.unwrap();
    assert_eq!(update.widget_id, "w1");
    assert!(update.data.is_empty());
  }

  #[test]
  fn test_panic_message() {
    let panic = std::panic::catch_unwind(|| panic!("bad {}", 1)).unwrap_err();
    assert_eq!(panic_message(panic.as_ref()), "bad 1");
  }
}
