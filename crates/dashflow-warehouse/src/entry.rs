//! Cache entries.

use serde::{Deserialize, Serialize};

/// Where a cached value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySource {
  pub source_id: String,
  pub source_type: String,
  pub widget_id: String,
}

/// One cached source value. Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub data: serde_json::Value,
  pub stored_at: u64,
  pub expires_at: u64,
  pub source: EntrySource,
  pub size_bytes: u64,
  pub access_count: u64,
  pub last_accessed: u64,
}

impl CacheEntry {
  pub fn is_expired(&self, now_ms: u64) -> bool {
    now_ms > self.expires_at
  }

  pub(crate) fn touch(&mut self, now_ms: u64) {
    self.access_count += 1;
    self.last_accessed = now_ms;
  }
}

/// Rough size of a value: twice its serialized length.
///
/// Only used for admission and eviction decisions.
pub fn estimate_size(value: &serde_json::Value) -> u64 {
  serde_json::to_string(value)
    .map(|s| s.len() as u64 * 2)
    .unwrap_or(1024)
}
