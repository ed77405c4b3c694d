//! HTTP data items.
//!
//! The URL, header values and string bodies are minijinja templates rendered
//! against the run's request parameters:
//!
//! ```json
//! { "type": "http", "url": "https://api.example.com/devices/{{ deviceId }}" }
//! ```
//!
//! Plain strings render unchanged.

use std::time::Duration;

use dashflow_config::{HttpItem, HttpParam};
use minijinja::Environment;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FetchError;

type Params = serde_json::Map<String, serde_json::Value>;

pub(crate) async fn fetch_http(
  client: &reqwest::Client,
  item: &HttpItem,
  params: &Params,
  default_timeout_ms: u64,
) -> Result<serde_json::Value, FetchError> {
  let env = Environment::new();
  let context = minijinja::Value::from_serialize(params);

  let url = render(&env, "url", &item.url, &context)?;
  let parsed = reqwest::Url::parse(&url).map_err(|e| FetchError::Http {
    url: url.clone(),
    message: e.to_string(),
  })?;
  if !matches!(parsed.scheme(), "http" | "https") {
    return Err(FetchError::Unsupported {
      message: format!("url scheme '{}'", parsed.scheme()),
    });
  }

  let headers = build_headers(&env, item, &context, &url)?;
  let method = reqwest::Method::from_bytes(item.method.as_str().as_bytes()).map_err(|e| {
    FetchError::Http {
      url: url.clone(),
      message: e.to_string(),
    }
  })?;

  let mut request = client.request(method, parsed).headers(headers);

  if item.method.uses_query() {
    let mut query = query_pairs(&item.params);
    if let Some(serde_json::Value::Object(body)) = &item.body {
      query.extend(body.iter().map(|(k, v)| (k.clone(), param_string(v))));
    }
    request = request.query(&query);
  } else {
    let query = query_pairs(&item.params);
    if !query.is_empty() {
      request = request.query(&query);
    }
    match &item.body {
      Some(serde_json::Value::String(body)) => {
        request = request.body(render(&env, "body", body, &context)?);
      }
      Some(body) => request = request.json(body),
      None => {}
    }
  }

  let timeout_ms = item.timeout_ms.unwrap_or(default_timeout_ms);
  let cancel = CancellationToken::new();
  let timer = {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
      cancel.cancel();
    })
  };

  let outcome = tokio::select! {
    result = send(request, &url) => result,
    _ = cancel.cancelled() => Err(FetchError::Timeout {
      url: url.clone(),
      timeout_ms,
    }),
  };
  timer.abort();

  outcome
}

async fn send(
  request: reqwest::RequestBuilder,
  url: &str,
) -> Result<serde_json::Value, FetchError> {
  let response = request.send().await.map_err(|e| FetchError::Http {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  let status = response.status();
  if !status.is_success() {
    return Err(FetchError::Status {
      url: url.to_string(),
      status: status.as_u16(),
    });
  }

  let text = response.text().await.map_err(|e| FetchError::Http {
    url: url.to_string(),
    message: e.to_string(),
  })?;
  debug!(url, status = status.as_u16(), bytes = text.len(), "http_response");

  Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

fn build_headers(
  env: &Environment,
  item: &HttpItem,
  context: &minijinja::Value,
  url: &str,
) -> Result<HeaderMap, FetchError> {
  let mut headers = HeaderMap::new();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

  for (name, value) in &item.headers {
    let rendered = render(env, &format!("header '{}'", name), value, context)?;
    let invalid = |message: String| FetchError::Http {
      url: url.to_string(),
      message,
    };
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| invalid(format!("invalid header name '{}': {}", name, e)))?;
    let value = HeaderValue::from_str(&rendered)
      .map_err(|e| invalid(format!("invalid value for header '{}': {}", name, e)))?;
    headers.insert(name, value);
  }

  Ok(headers)
}

fn render(
  env: &Environment,
  field: &str,
  template: &str,
  context: &minijinja::Value,
) -> Result<String, FetchError> {
  env
    .render_str(template, context.clone())
    .map_err(|e| FetchError::Template {
      field: field.to_string(),
      message: e.to_string(),
    })
}

fn query_pairs(params: &[HttpParam]) -> Vec<(String, String)> {
  params
    .iter()
    .filter(|p| p.enabled)
    .map(|p| (p.key.clone(), param_string(&p.value)))
    .collect()
}

/// Strings go on the wire as-is; everything else as its JSON text.
fn param_string(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use dashflow_config::HttpMethod;
  use serde_json::json;

  #[test]
  fn test_disabled_params_dropped() {
    let params = vec![
      HttpParam {
        key: "a".to_string(),
        value: json!("x"),
        enabled: true,
      },
      HttpParam {
        key: "b".to_string(),
        value: json!(2),
        enabled: false,
      },
      HttpParam {
        key: "c".to_string(),
        value: json!(true),
        enabled: true,
      },
    ];
    assert_eq!(
      query_pairs(&params),
      vec![
        ("a".to_string(), "x".to_string()),
        ("c".to_string(), "true".to_string()),
      ]
    );
  }

  #[test]
  fn test_render_plain_and_template() {
    let env = Environment::new();
    let ctx = minijinja::Value::from_serialize(json!({ "deviceId": "d-7" }));
    assert_eq!(
      render(&env, "url", "http://x/api", &ctx).unwrap(),
      "http://x/api"
    );
    assert_eq!(
      render(&env, "url", "http://x/{{ deviceId }}", &ctx).unwrap(),
      "http://x/d-7"
    );
    assert!(matches!(
      render(&env, "url", "http://x/{{ ", &ctx),
      Err(FetchError::Template { .. })
    ));
  }

  #[test]
  fn test_caller_header_overrides_content_type() {
    let env = Environment::new();
    let ctx = minijinja::Value::from_serialize(json!({ "token": "abc" }));
    let item = HttpItem {
      url: "http://localhost".to_string(),
      method: HttpMethod::Get,
      headers: [
        ("Content-Type".to_string(), "text/plain".to_string()),
        ("Authorization".to_string(), "Bearer {{ token }}".to_string()),
      ]
      .into_iter()
      .collect(),
      body: None,
      params: vec![],
      timeout_ms: None,
    };

    let headers = build_headers(&env, &item, &ctx, "http://localhost").unwrap();
    assert_eq!(headers[CONTENT_TYPE], "text/plain");
    assert_eq!(headers["authorization"], "Bearer abc");
  }
}
