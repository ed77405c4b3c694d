//! End-to-end pipeline runs.

use std::sync::Arc;

use dashflow_config::{DashflowSettings, FetchSettings, PipelineConfig};
use dashflow_pipeline::{
  DataItemFetcher, PipelineCoordinator, PipelineStage, SnapshotSocketSource,
};
use dashflow_script::LuaScriptEngine;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn coordinator() -> PipelineCoordinator {
  PipelineCoordinator::new(&DashflowSettings::default())
}

fn config(value: serde_json::Value) -> PipelineConfig {
  serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_json_item_filtered_by_path() {
  let config = config(json!({
    "widget_id": "profile",
    "data_sources": [{
      "source_id": "user",
      "data_items": [{
        "item": { "type": "json", "json_string": "{\"user\":{\"name\":\"A\",\"age\":3}}" },
        "processing": { "filter_path": "user" }
      }],
      "merge_strategy": "object"
    }]
  }));

  let result = coordinator().run(&config, false).await;

  assert!(result.success);
  let entry = &result.component_data["user"];
  assert_eq!(entry.data, json!({ "name": "A", "age": 3 }));
  assert_eq!(entry.source_type, "json");
  assert!(entry.metadata.success);
  assert!(result.trace.is_none());
}

#[tokio::test]
async fn test_failed_source_does_not_affect_others() {
  let config = config(json!({
    "widget_id": "w1",
    "data_sources": [
      {
        "source_id": "s1",
        "data_items": [{ "item": { "type": "http", "url": "http://127.0.0.1:1/down" } }]
      },
      {
        "source_id": "s2",
        "data_items": [{ "item": { "type": "static", "payload": { "v": 1 } } }]
      }
    ]
  }));

  let result = coordinator().run(&config, false).await;

  assert!(result.success);
  assert_eq!(result.component_data.len(), 2);

  let s1 = &result.component_data["s1"];
  assert_eq!(s1.data, json!({}));
  assert!(!s1.metadata.success);
  assert!(s1.metadata.error.is_some());

  let s2 = &result.component_data["s2"];
  assert_eq!(s2.data, json!({ "v": 1 }));
  assert!(s2.metadata.success);
}

#[tokio::test]
async fn test_partial_item_failure_keeps_source() {
  let config = config(json!({
    "widget_id": "w1",
    "data_sources": [{
      "source_id": "mixed",
      "data_items": [
        { "item": { "type": "json", "json_string": "{broken" } },
        { "item": { "type": "static", "payload": { "b": 2 } } }
      ],
      "merge_strategy": { "type": "object" }
    }]
  }));

  let result = coordinator().run(&config, false).await;
  let entry = &result.component_data["mixed"];
  assert!(entry.metadata.success);
  assert_eq!(entry.data, json!({ "b": 2 }));
}

#[tokio::test]
async fn test_multi_item_array_merge_with_transform() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/readings"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [3, 4] })))
    .mount(&server)
    .await;

  let config = config(json!({
    "widget_id": "chart",
    "data_sources": [{
      "source_id": "series",
      "data_items": [
        {
          "item": { "type": "http", "url": format!("{}/readings", server.uri()) },
          "processing": { "filter_path": "$.data" }
        },
        {
          "item": { "type": "static", "payload": [10] },
          "processing": { "transform_script": "return { data[1] * 2 }" }
        }
      ],
      "merge_strategy": "array"
    }]
  }));

  let result = coordinator().run(&config, false).await;
  assert_eq!(result.component_data["series"].data, json!([3, 4, 20]));
}

#[tokio::test]
async fn test_debug_trace_records_every_stage() {
  let config = config(json!({
    "widget_id": "w1",
    "data_sources": [{
      "source_id": "a",
      "data_items": [
        { "item": { "type": "static", "payload": { "x": 1 } } },
        { "item": { "type": "static", "payload": { "y": 2 } } }
      ]
    }]
  }));

  let result = coordinator().run(&config, true).await;
  let trace = result.trace.expect("debug run has a trace");

  assert_eq!(trace.raw_data["a_item_0"].data, json!({ "x": 1 }));
  assert_eq!(trace.processed_data["a_item_1"].data, json!({ "y": 2 }));
  assert_eq!(trace.merged_data["a"].data, json!({ "x": 1, "y": 2 }));
  let final_data = trace.final_data.expect("final snapshot");
  assert_eq!(final_data.data["a"]["data"], json!({ "x": 1, "y": 2 }));

  let stages: Vec<PipelineStage> = trace.stages.iter().map(|t| t.stage).collect();
  assert_eq!(
    stages,
    vec![
      PipelineStage::Idle,
      PipelineStage::Fetching,
      PipelineStage::Processing,
      PipelineStage::Merging,
      PipelineStage::Integrating,
      PipelineStage::Done,
    ]
  );
}

#[tokio::test]
async fn test_script_item_and_select_merge() {
  let config = config(json!({
    "widget_id": "w1",
    "data_sources": [{
      "source_id": "pick",
      "data_items": [
        { "item": { "type": "script", "script": "return context.n + 1", "context": { "n": 1 } } },
        { "item": { "type": "static", "payload": "second" } }
      ],
      "merge_strategy": { "type": "select", "index": 1 }
    }]
  }));

  let result = coordinator().run(&config, false).await;
  assert_eq!(result.component_data["pick"].data, json!("second"));
}

#[tokio::test]
async fn test_socket_source_supplies_latest_value() {
  let socket = Arc::new(SnapshotSocketSource::new());
  socket.publish("wss://feed/ticks", json!({ "price": 12.5 }));

  let script = Arc::new(LuaScriptEngine::default());
  let fetcher =
    DataItemFetcher::new(FetchSettings::default(), script.clone()).with_socket_source(socket);
  let coordinator = PipelineCoordinator::with_fetcher(fetcher, script);

  let config = config(json!({
    "widget_id": "ticker",
    "data_sources": [{
      "source_id": "ticks",
      "data_items": [{ "item": { "type": "websocket", "url": "wss://feed/ticks" } }]
    }]
  }));

  let result = coordinator.run(&config, false).await;
  let entry = &result.component_data["ticks"];
  assert_eq!(entry.source_type, "socket");
  assert_eq!(entry.data, json!({ "price": 12.5 }));
}

#[tokio::test]
async fn test_empty_config_yields_empty_bag() {
  let result = coordinator()
    .run(&PipelineConfig::new("w1", vec![]), false)
    .await;
  assert!(result.success);
  assert!(result.component_data.is_empty());
  assert!(!result.execution_id.is_empty());
}
