use serde::{Deserialize, Serialize};

/// How one fetched value is filtered and transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
  /// Path into the fetched value, e.g. `$.user.tags[0]`. Empty or `$` means
  /// no filtering.
  #[serde(default = "root_path", alias = "filterPath")]
  pub filter_path: String,
  /// Snippet evaluated with the filtered value bound as `data`.
  #[serde(
    default,
    alias = "transformScript",
    alias = "customScript",
    skip_serializing_if = "Option::is_none"
  )]
  pub transform_script: Option<String>,
  /// Substituted when the fetched value is empty or the path misses.
  #[serde(default = "empty_object", alias = "defaultValue")]
  pub default_value: serde_json::Value,
}

fn root_path() -> String {
  "$".to_string()
}

fn empty_object() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}

impl Default for ProcessingConfig {
  fn default() -> Self {
    Self {
      filter_path: root_path(),
      transform_script: None,
      default_value: empty_object(),
    }
  }
}

impl ProcessingConfig {
  pub fn with_filter(filter_path: impl Into<String>) -> Self {
    Self {
      filter_path: filter_path.into(),
      ..Self::default()
    }
  }

  /// Whether the filter path selects the whole value.
  pub fn is_root_filter(&self) -> bool {
    let path = self.filter_path.trim();
    path.is_empty() || path == "$"
  }
}
