//! Socket sources.
//!
//! Live socket connections are owned by the host. The fetcher only asks a
//! [`SocketSource`] for the latest value seen on a socket.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use dashflow_config::SocketItem;

use crate::error::FetchError;

/// Supplies the latest value received on a socket.
#[async_trait]
pub trait SocketSource: Send + Sync {
  async fn latest(&self, item: &SocketItem) -> Result<serde_json::Value, FetchError>;
}

/// A socket source fed by the host: whatever was last published for a URL
/// is what the next fetch returns.
#[derive(Debug, Default)]
pub struct SnapshotSocketSource {
  latest: RwLock<HashMap<String, serde_json::Value>>,
}

impl SnapshotSocketSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a value received on `url`.
  pub fn publish(&self, url: impl Into<String>, value: serde_json::Value) {
    let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
    latest.insert(url.into(), value);
  }
}

#[async_trait]
impl SocketSource for SnapshotSocketSource {
  async fn latest(&self, item: &SocketItem) -> Result<serde_json::Value, FetchError> {
    let latest = self.latest.read().unwrap_or_else(|e| e.into_inner());
    Ok(
      latest
        .get(&item.url)
        .cloned()
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
    )
  }
}
