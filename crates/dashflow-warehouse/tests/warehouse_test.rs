use std::sync::Arc;
use std::time::Duration;

use dashflow_config::WarehouseSettings;
use dashflow_warehouse::{DataWarehouse, ManualClock, WarehouseError, estimate_size};
use serde_json::json;

fn warehouse_with(settings: WarehouseSettings) -> (Arc<DataWarehouse>, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(1_000_000));
  let warehouse = Arc::new(DataWarehouse::with_clock(settings, clock.clone()));
  (warehouse, clock)
}

fn small_settings() -> WarehouseSettings {
  WarehouseSettings {
    default_ttl_ms: 10_000,
    ..WarehouseSettings::default()
  }
}

#[test]
fn test_entries_expire_after_ttl() {
  let (wh, clock) = warehouse_with(small_settings());
  wh.store("w", "s", json!({ "v": 1 }), "http", Some(500)).unwrap();

  clock.advance(500);
  assert_eq!(wh.get_one("w", "s"), Some(json!({ "v": 1 })));

  clock.advance(1);
  assert_eq!(wh.get_one("w", "s"), None);
  assert!(wh.get("w").is_none());
  assert_eq!(wh.performance_metrics().memory_usage_bytes, 0);
}

#[test]
fn test_widgets_are_isolated() {
  let (wh, _) = warehouse_with(small_settings());
  wh.store("a", "shared", json!("for a"), "static", None).unwrap();
  wh.store("b", "shared", json!("for b"), "static", None).unwrap();

  assert_eq!(wh.get("a").unwrap()["shared"], json!("for a"));
  assert_eq!(wh.get("b").unwrap()["shared"], json!("for b"));

  wh.clear_widget("a");
  assert!(wh.get("a").is_none());
  assert_eq!(wh.get("b").unwrap()["shared"], json!("for b"));
}

#[test]
fn test_rewrite_is_visible_on_next_read() {
  let (wh, _) = warehouse_with(small_settings());
  wh.store("w", "s", json!(1), "static", None).unwrap();
  assert_eq!(wh.get("w").unwrap()["s"], json!(1));

  wh.store("w", "s", json!(2), "static", None).unwrap();
  assert_eq!(wh.get("w").unwrap()["s"], json!(2));
}

#[test]
fn test_memory_budget_rejects_store() {
  let value = json!({ "payload": "x".repeat(100) });
  let size = estimate_size(&value);
  let (wh, _) = warehouse_with(WarehouseSettings {
    max_memory_bytes: size * 2,
    ..small_settings()
  });

  wh.store("w", "a", value.clone(), "static", None).unwrap();
  wh.store("w", "b", value.clone(), "static", None).unwrap();
  let err = wh.store("w", "c", value.clone(), "static", None).unwrap_err();
  assert!(matches!(
    err,
    WarehouseError::CapacityExceeded { ref source_id, .. } if source_id == "c"
  ));

  // Replacing an existing entry of the same size still fits.
  wh.store("w", "a", value, "static", None).unwrap();
  assert_eq!(wh.performance_metrics().item_count, 2);
}

#[test]
fn test_item_ceiling_rejects_new_keys_only() {
  let (wh, _) = warehouse_with(WarehouseSettings {
    max_items: 2,
    ..small_settings()
  });

  wh.store("w1", "a", json!(1), "static", None).unwrap();
  wh.store("w2", "a", json!(2), "static", None).unwrap();
  assert!(wh.store("w3", "a", json!(3), "static", None).is_err());
  assert!(wh.get("w3").is_none());

  wh.store("w1", "a", json!(10), "static", None).unwrap();
  assert_eq!(wh.get_one("w1", "a"), Some(json!(10)));
}

#[test]
fn test_expired_entries_make_room_at_item_ceiling() {
  let (wh, clock) = warehouse_with(WarehouseSettings {
    max_items: 2,
    ..small_settings()
  });

  wh.store("w1", "a", json!(1), "static", Some(5)).unwrap();
  wh.store("w2", "a", json!(2), "static", Some(5)).unwrap();
  clock.advance(200);

  // Neither widget was read again, so only the store itself can notice.
  wh.store("w3", "a", json!(3), "static", None).unwrap();
  assert_eq!(wh.get_one("w3", "a"), Some(json!(3)));
  assert!(wh.get_one("w1", "a").is_none());
  assert_eq!(wh.performance_metrics().item_count, 1);
}

#[test]
fn test_expired_entries_make_room_in_memory_budget() {
  let value = json!({ "payload": "x".repeat(100) });
  let size = estimate_size(&value);
  let (wh, clock) = warehouse_with(WarehouseSettings {
    max_memory_bytes: size,
    ..small_settings()
  });

  wh.store("old", "s", value.clone(), "static", Some(5)).unwrap();
  clock.advance(6);
  wh.store("new", "s", value, "static", None).unwrap();
  assert_eq!(wh.performance_metrics().memory_usage_bytes, size);
}

#[test]
fn test_start_sweeper_outside_runtime() {
  let (wh, _) = warehouse_with(small_settings());
  assert!(!wh.start_sweeper());
  assert!(!wh.sweeper_running());
}

#[test]
fn test_sweep_removes_expired_and_empty_widgets() {
  let (wh, clock) = warehouse_with(small_settings());
  wh.store("short", "s", json!(1), "static", Some(100)).unwrap();
  wh.store("mixed", "short", json!(1), "static", Some(100)).unwrap();
  wh.store("mixed", "long", json!(2), "static", Some(60_000)).unwrap();

  clock.advance(200);
  let report = wh.sweep();
  assert_eq!(report.expired, 2);
  assert_eq!(report.widgets_removed, 1);
  assert_eq!(report.evicted, 0);

  let stats = wh.storage_stats();
  assert_eq!(stats.total_widgets, 1);
  assert_eq!(stats.total_sources, 1);
  assert!(stats.widgets.contains_key("mixed"));
  assert!(wh.performance_metrics().last_sweep_at.is_some());
}

#[test]
fn test_sweep_evicts_least_used_first() {
  let value = json!("0123456789");
  let size = estimate_size(&value);
  // Four entries fit; the pressure threshold is 80% of the budget.
  let (wh, clock) = warehouse_with(WarehouseSettings {
    max_memory_bytes: size * 4,
    ..small_settings()
  });

  for source in ["a", "b", "c", "d"] {
    wh.store("w", source, value.clone(), "static", None).unwrap();
  }
  clock.advance(1);
  wh.get_one("w", "a");
  wh.get_one("w", "b");
  wh.get_one("w", "d");
  wh.get_one("w", "a");

  let report = wh.sweep();
  assert_eq!(report.evicted, 1);
  assert!(wh.get_one("w", "c").is_none());
  assert!(wh.get_one("w", "a").is_some());
  assert!(wh.get_one("w", "b").is_some());
  assert!(wh.get_one("w", "d").is_some());
}

#[test]
fn test_hit_rate_tracks_reads() {
  let (wh, _) = warehouse_with(small_settings());
  wh.store("w", "s", json!(1), "static", None).unwrap();

  wh.get("w");
  wh.get("w");
  wh.get("w");
  wh.get("missing");

  let metrics = wh.performance_metrics();
  assert_eq!(metrics.hits, 3);
  assert_eq!(metrics.misses, 1);
  assert!((metrics.hit_rate - 0.75).abs() < f64::EPSILON);
  assert_eq!(metrics.widget_count, 1);
}

#[test]
fn test_concurrent_writers_on_distinct_widgets() {
  let (wh, _) = warehouse_with(small_settings());
  let handles: Vec<_> = (0..8)
    .map(|i| {
      let wh = wh.clone();
      std::thread::spawn(move || {
        for j in 0..50 {
          wh.store(&format!("w{}", i), &format!("s{}", j), json!(j), "static", None)
            .unwrap();
          wh.get(&format!("w{}", i));
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  let stats = wh.storage_stats();
  assert_eq!(stats.total_widgets, 8);
  assert_eq!(stats.total_sources, 400);
  assert_eq!(wh.performance_metrics().item_count, 400);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_runs_on_interval() {
  let (wh, clock) = warehouse_with(WarehouseSettings {
    cleanup_interval_ms: 1_000,
    ..small_settings()
  });
  wh.store("w", "s", json!(1), "static", Some(10)).unwrap();
  assert!(wh.start_sweeper());
  assert!(wh.sweeper_running());

  clock.advance(100);
  tokio::time::sleep(Duration::from_millis(1_500)).await;

  assert_eq!(wh.storage_stats().total_widgets, 0);
  assert!(wh.performance_metrics().last_sweep_at.is_some());

  wh.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_sweeper() {
  let (wh, clock) = warehouse_with(WarehouseSettings {
    cleanup_interval_ms: 1_000,
    ..small_settings()
  });
  wh.start_sweeper();
  wh.destroy();
  assert!(!wh.sweeper_running());

  wh.store("w", "s", json!(1), "static", Some(10)).unwrap();
  clock.advance(100);
  tokio::time::sleep(Duration::from_millis(5_000)).await;

  // No sweep ran, so the expired entry is still counted.
  assert_eq!(wh.storage_stats().total_sources, 1);
  assert!(wh.performance_metrics().last_sweep_at.is_none());
}
