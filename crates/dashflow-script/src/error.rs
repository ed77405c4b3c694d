//! Script errors.

/// Errors that can occur while evaluating a sandboxed script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
  /// The source could not be parsed.
  #[error("script failed to compile: {message}")]
  Compile { message: String },

  /// The script raised an error or hit the memory limit.
  #[error("script failed: {message}")]
  Runtime { message: String },

  /// The script ran past its deadline.
  #[error("script exceeded its {timeout_ms}ms deadline")]
  Timeout { timeout_ms: u64 },

  /// A binding or the returned value could not be converted.
  #[error("failed to convert script value: {message}")]
  Conversion { message: String },
}
