//! Folding per-source results into one widget data bag.

use chrono::Utc;
use tracing::warn;

use crate::result::{ComponentData, DataSourceResult, EntryMetadata, SourceEntry};

/// Build the widget's data bag from its source results.
///
/// Every result with a non-empty id gets an entry; failed sources appear
/// with `data: {}` and `success: false`. A repeated id keeps the last
/// result.
pub fn integrate(results: &[DataSourceResult], widget_id: &str) -> ComponentData {
  let now = Utc::now();
  let mut bag = ComponentData::new();

  for result in results {
    if result.source_id.is_empty() {
      warn!(widget_id, "integrate_skipped_unnamed_source");
      continue;
    }

    let data = if result.success {
      result.data.clone()
    } else {
      serde_json::Value::Object(serde_json::Map::new())
    };

    bag.insert(
      result.source_id.clone(),
      SourceEntry {
        source_type: result.source_type.clone(),
        data,
        last_updated: now,
        metadata: EntryMetadata {
          widget_id: widget_id.to_string(),
          success: result.success,
          error: result.error.clone(),
        },
      },
    );
  }

  bag
}
