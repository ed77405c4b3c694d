//! Item fetching.

use std::sync::Arc;

use dashflow_config::{DataItemConfig, FetchSettings};
use dashflow_script::ScriptEngine;
use tracing::warn;

use crate::error::FetchError;
use crate::http::fetch_http;
use crate::socket::SocketSource;

/// Produces the raw value of one data item.
pub struct DataItemFetcher {
  client: reqwest::Client,
  settings: FetchSettings,
  script: Arc<dyn ScriptEngine>,
  socket: Option<Arc<dyn SocketSource>>,
}

impl DataItemFetcher {
  pub fn new(settings: FetchSettings, script: Arc<dyn ScriptEngine>) -> Self {
    Self {
      client: reqwest::Client::new(),
      settings,
      script,
      socket: None,
    }
  }

  /// Install the source consulted by socket items.
  pub fn with_socket_source(mut self, socket: Arc<dyn SocketSource>) -> Self {
    self.socket = Some(socket);
    self
  }

  /// Fetch an item. Never fails: any error is logged and yields `{}`.
  pub async fn fetch(
    &self,
    item: &DataItemConfig,
    params: &serde_json::Map<String, serde_json::Value>,
  ) -> serde_json::Value {
    match self.try_fetch(item, params).await {
      Ok(value) => value,
      Err(e) => {
        warn!(kind = item.kind(), error = %e, "fetch_failed");
        empty_object()
      }
    }
  }

  /// Fetch an item, reporting why it failed.
  pub async fn try_fetch(
    &self,
    item: &DataItemConfig,
    params: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<serde_json::Value, FetchError> {
    match item {
      DataItemConfig::Static { payload } => Ok(payload.clone()),
      DataItemConfig::Json { json_string } => {
        serde_json::from_str(json_string).map_err(|e| FetchError::Parse {
          message: e.to_string(),
        })
      }
      DataItemConfig::Http(http) => {
        fetch_http(&self.client, http, params, self.settings.default_timeout_ms).await
      }
      DataItemConfig::Socket(socket) => match &self.socket {
        Some(source) => source.latest(socket).await,
        None => {
          warn!(url = %socket.url, "socket_source_not_installed");
          Ok(empty_object())
        }
      },
      DataItemConfig::Script(script) => {
        let context = serde_json::Value::Object(script.context.clone());
        self
          .script
          .evaluate(&script.script, &[("context", &context)])
          .map_err(|e| FetchError::Script { source: e })
      }
    }
  }
}

fn empty_object() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}
