//! Binding errors.

use dashflow_script::ScriptError;

/// Errors that can occur when driving widgets through the trigger engine.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
  #[error("widget '{widget_id}' is not registered")]
  WidgetNotFound { widget_id: String },

  #[error("invalid configuration for widget '{widget_id}': {message}")]
  InvalidConfig { widget_id: String, message: String },

  #[error("execution of widget '{widget_id}' failed: {message}")]
  Execution { widget_id: String, message: String },
}

/// Why a value transform could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
  #[error("{transform} cannot be applied to {value}")]
  Unsupported { transform: String, value: String },

  #[error("template failed: {message}")]
  Template { message: String },

  #[error("script failed")]
  Script {
    #[source]
    source: ScriptError,
  },
}
