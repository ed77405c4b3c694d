use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One atomic fetch unit within a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataItemConfig {
  /// A literal payload, returned as-is.
  Static {
    #[serde(alias = "data")]
    payload: serde_json::Value,
  },
  /// JSON text parsed at fetch time.
  Json {
    #[serde(alias = "jsonString")]
    json_string: String,
  },
  Http(HttpItem),
  #[serde(alias = "websocket")]
  Socket(SocketItem),
  Script(ScriptItem),
}

impl DataItemConfig {
  /// The type tag, as it appears in serialized configuration.
  pub fn kind(&self) -> &'static str {
    match self {
      DataItemConfig::Static { .. } => "static",
      DataItemConfig::Json { .. } => "json",
      DataItemConfig::Http(_) => "http",
      DataItemConfig::Socket(_) => "socket",
      DataItemConfig::Script(_) => "script",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
  #[default]
  Get,
  Post,
  Put,
  Delete,
  Patch,
  Head,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpMethod::Get => "GET",
      HttpMethod::Post => "POST",
      HttpMethod::Put => "PUT",
      HttpMethod::Delete => "DELETE",
      HttpMethod::Patch => "PATCH",
      HttpMethod::Head => "HEAD",
    }
  }

  /// GET and HEAD carry their parameters in the query string, never a body.
  pub fn uses_query(&self) -> bool {
    matches!(self, HttpMethod::Get | HttpMethod::Head)
  }
}

/// A request parameter that can be switched off without removing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParam {
  pub key: String,
  pub value: serde_json::Value,
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

fn default_enabled() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpItem {
  /// Request URL. May contain `{{ param }}` placeholders resolved against
  /// the request parameters of the current run.
  pub url: String,
  #[serde(default)]
  pub method: HttpMethod,
  #[serde(default)]
  pub headers: HashMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub params: Vec<HttpParam>,
  /// Per-call timeout. Falls back to the fetch settings when absent.
  #[serde(default, alias = "timeout", skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketItem {
  pub url: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub protocols: Vec<String>,
  #[serde(
    default,
    alias = "reconnectInterval",
    skip_serializing_if = "Option::is_none"
  )]
  pub reconnect_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptItem {
  /// Snippet evaluated in the script sandbox; its return value is the
  /// fetched value.
  pub script: String,
  /// Values bound into the sandbox as `context`.
  #[serde(default)]
  pub context: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_static_item() {
    let item: DataItemConfig =
      serde_json::from_value(json!({ "type": "static", "payload": { "v": 1 } })).unwrap();
    assert_eq!(
      item,
      DataItemConfig::Static {
        payload: json!({ "v": 1 })
      }
    );
    assert_eq!(item.kind(), "static");
  }

  #[test]
  fn test_deserialize_http_item_defaults() {
    let item: DataItemConfig = serde_json::from_value(json!({
      "type": "http",
      "url": "https://example.com/api",
      "timeout": 500
    }))
    .unwrap();

    match item {
      DataItemConfig::Http(http) => {
        assert_eq!(http.method, HttpMethod::Get);
        assert!(http.headers.is_empty());
        assert_eq!(http.timeout_ms, Some(500));
      }
      other => panic!("expected http item, got {:?}", other),
    }
  }

  #[test]
  fn test_websocket_alias() {
    let item: DataItemConfig = serde_json::from_value(json!({
      "type": "websocket",
      "url": "wss://example.com/stream"
    }))
    .unwrap();
    assert_eq!(item.kind(), "socket");
  }

  #[test]
  fn test_param_enabled_by_default() {
    let param: HttpParam = serde_json::from_value(json!({ "key": "k", "value": 1 })).unwrap();
    assert!(param.enabled);
  }
}
