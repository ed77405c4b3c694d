//! Merging the processed items of a source into one value.

use std::sync::Arc;

use dashflow_config::MergeStrategy;
use dashflow_script::ScriptEngine;
use tracing::warn;

use crate::error::MergeError;

/// Whether a strategy can be applied: a known kind and, for `script`, a
/// non-empty body.
pub fn validate_strategy(strategy: &MergeStrategy) -> bool {
  strategy.is_well_formed()
}

#[derive(Clone)]
pub struct SourceMerger {
  script: Arc<dyn ScriptEngine>,
}

impl SourceMerger {
  pub fn new(script: Arc<dyn ScriptEngine>) -> Self {
    Self { script }
  }

  /// Merge `items` according to `strategy`. Never fails: any error yields
  /// an empty object.
  pub fn merge(&self, items: &[serde_json::Value], strategy: &MergeStrategy) -> serde_json::Value {
    self.try_merge(items, strategy).unwrap_or_else(|e| {
      warn!(strategy = strategy.kind(), error = %e, "merge_failed");
      empty_object()
    })
  }

  pub fn try_merge(
    &self,
    items: &[serde_json::Value],
    strategy: &MergeStrategy,
  ) -> Result<serde_json::Value, MergeError> {
    match items {
      [] => {
        warn!(strategy = strategy.kind(), "merge_no_items");
        return Ok(empty_object());
      }
      // A single item is returned as-is whatever the declared strategy.
      [only] => return Ok(only.clone()),
      _ => {}
    }

    if !validate_strategy(strategy) {
      return Err(MergeError::InvalidStrategy {
        kind: strategy.kind().to_string(),
        message: "script strategy requires a non-empty body".to_string(),
      });
    }

    match strategy {
      MergeStrategy::Object => Ok(merge_objects(items)),
      MergeStrategy::Array => Ok(concat_arrays(items)),
      MergeStrategy::Select { index } => {
        let chosen = items.get(*index).unwrap_or_else(|| {
          warn!(
            index,
            item_count = items.len(),
            "merge_select_out_of_range"
          );
          &items[0]
        });
        Ok(chosen.clone())
      }
      MergeStrategy::Script { body } => {
        let list = serde_json::Value::Array(items.to_vec());
        self
          .script
          .evaluate(body, &[("items", &list), ("list", &list)])
          .map_err(|e| MergeError::Script { source: e })
      }
    }
  }
}

fn empty_object() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}

/// Shallow-assign every object item into one object. Non-object items are
/// keyed `item_<index>`.
fn merge_objects(items: &[serde_json::Value]) -> serde_json::Value {
  let mut merged = serde_json::Map::new();
  for (index, item) in items.iter().enumerate() {
    match item {
      serde_json::Value::Object(map) => {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
      }
      other => {
        merged.insert(format!("item_{}", index), other.clone());
      }
    }
  }
  serde_json::Value::Object(merged)
}

/// Concatenate items, splicing in the elements of array items.
fn concat_arrays(items: &[serde_json::Value]) -> serde_json::Value {
  let mut out = Vec::new();
  for item in items {
    match item {
      serde_json::Value::Array(elements) => out.extend(elements.iter().cloned()),
      other => out.push(other.clone()),
    }
  }
  serde_json::Value::Array(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use dashflow_script::LuaScriptEngine;
  use serde_json::json;

  fn merger() -> SourceMerger {
    SourceMerger::new(Arc::new(LuaScriptEngine::default()))
  }

  #[test]
  fn test_empty_list_is_empty_object() {
    let m = merger();
    for strategy in [
      MergeStrategy::Object,
      MergeStrategy::Array,
      MergeStrategy::Select { index: 0 },
    ] {
      assert_eq!(m.merge(&[], &strategy), json!({}));
    }
  }

  #[test]
  fn test_single_item_returned_unchanged() {
    let m = merger();
    let item = json!([1, 2, 3]);
    assert_eq!(m.merge(&[item.clone()], &MergeStrategy::Array), item);
    assert_eq!(
      m.merge(&[item.clone()], &MergeStrategy::Select { index: 4 }),
      item
    );
  }

  #[test]
  fn test_object_merge_later_keys_win() {
    let items = [json!({ "a": 1, "b": 1 }), json!({ "b": 2 }), json!(7)];
    assert_eq!(
      merger().merge(&items, &MergeStrategy::Object),
      json!({ "a": 1, "b": 2, "item_2": 7 })
    );
  }

  #[test]
  fn test_array_merge_splices_arrays() {
    let items = [json!([1, 2]), json!(3), json!([4])];
    assert_eq!(
      merger().merge(&items, &MergeStrategy::Array),
      json!([1, 2, 3, 4])
    );
  }

  #[test]
  fn test_select_by_index() {
    let items = [json!("first"), json!("second")];
    let m = merger();
    assert_eq!(
      m.merge(&items, &MergeStrategy::Select { index: 1 }),
      json!("second")
    );
    assert_eq!(
      m.merge(&items, &MergeStrategy::Select { index: 9 }),
      json!("first")
    );
  }

  #[test]
  fn test_script_merge() {
    let items = [json!({ "v": 2 }), json!({ "v": 5 })];
    let strategy = MergeStrategy::Script {
      body: "return { total = items[1].v + list[2].v }".to_string(),
    };
    assert_eq!(merger().merge(&items, &strategy), json!({ "total": 7 }));
  }

  #[test]
  fn test_script_merge_error_yields_empty_object() {
    let items = [json!(1), json!(2)];
    let strategy = MergeStrategy::Script {
      body: "error('nope')".to_string(),
    };
    let m = merger();
    assert_eq!(m.merge(&items, &strategy), json!({}));
    assert!(matches!(
      m.try_merge(&items, &strategy),
      Err(MergeError::Script { .. })
    ));
  }

  #[test]
  fn test_blank_script_is_invalid() {
    let strategy = MergeStrategy::Script {
      body: " ".to_string(),
    };
    assert!(!validate_strategy(&strategy));
    assert!(matches!(
      merger().try_merge(&[json!(1), json!(2)], &strategy),
      Err(MergeError::InvalidStrategy { .. })
    ));
  }
}
