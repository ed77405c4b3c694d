//! Pipeline stage errors.
//!
//! None of these escape a pipeline run. They are recorded on the item or
//! source that failed and replaced by a fallback value.

use dashflow_script::ScriptError;

/// Errors that can occur while fetching one data item.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  /// The request could not be built or sent.
  #[error("http request to '{url}' failed: {message}")]
  Http { url: String, message: String },

  /// The server answered with a non-success status.
  #[error("http request to '{url}' returned status {status}")]
  Status { url: String, status: u16 },

  /// The request did not complete within its timeout.
  #[error("http request to '{url}' timed out after {timeout_ms}ms")]
  Timeout { url: String, timeout_ms: u64 },

  /// The item cannot be fetched by this fetcher.
  #[error("unsupported data item: {message}")]
  Unsupported { message: String },

  /// JSON text could not be parsed.
  #[error("failed to parse json: {message}")]
  Parse { message: String },

  /// A script item failed.
  #[error("script item failed")]
  Script {
    #[source]
    source: ScriptError,
  },

  /// A URL, header or body template could not be rendered.
  #[error("failed to render {field} template: {message}")]
  Template { field: String, message: String },
}

/// Errors that can occur while filtering or transforming a fetched value.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
  /// The filter path is malformed.
  #[error("invalid filter path '{path}': {message}")]
  InvalidPath { path: String, message: String },

  /// The filter path does not exist in the value.
  #[error("filter path '{path}' not found")]
  PathNotFound { path: String },

  /// The transform script failed.
  #[error("transform script failed")]
  Transform {
    #[source]
    source: ScriptError,
  },
}

/// Errors that can occur while merging the items of a source.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
  /// The strategy is not well-formed.
  #[error("invalid merge strategy '{kind}': {message}")]
  InvalidStrategy { kind: String, message: String },

  /// The script strategy failed.
  #[error("merge script failed")]
  Script {
    #[source]
    source: ScriptError,
  },
}
