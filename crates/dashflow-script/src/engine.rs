//! Script engine trait and the Lua sandbox behind it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashflow_config::ScriptSettings;
use mlua::{HookTriggers, Lua, LuaOptions, LuaSerdeExt, StdLib, VmState};
use tracing::debug;

use crate::error::ScriptError;

/// Instructions executed between deadline checks.
const HOOK_INSTRUCTION_INTERVAL: u32 = 1000;

/// Base library functions that can reach the filesystem or stdout, or
/// compile code.
const BLOCKED_GLOBALS: &[&str] = &[
  "print",
  "require",
  "load",
  "loadstring",
  "dofile",
  "loadfile",
  "collectgarbage",
];

/// Evaluates snippets against JSON bindings.
///
/// Implementations must not let a snippet reach the host beyond the values
/// it is given.
pub trait ScriptEngine: Send + Sync {
  /// Evaluate `source` with each binding exposed as a global, returning the
  /// snippet's return value.
  fn evaluate(
    &self,
    source: &str,
    bindings: &[(&str, &serde_json::Value)],
  ) -> Result<serde_json::Value, ScriptError>;
}

/// Lua 5.4 sandbox.
///
/// Every evaluation gets a fresh interpreter with only the `table`,
/// `string`, `math` and `utf8` libraries loaded, bounded by a deadline and a
/// memory limit.
#[derive(Debug, Clone)]
pub struct LuaScriptEngine {
  settings: ScriptSettings,
}

impl LuaScriptEngine {
  pub fn new(settings: ScriptSettings) -> Self {
    Self { settings }
  }

  /// Create a shareable engine handle.
  pub fn shared(settings: ScriptSettings) -> Arc<dyn ScriptEngine> {
    Arc::new(Self::new(settings))
  }

  fn sandbox(&self) -> Result<Lua, ScriptError> {
    let lua = Lua::new_with(
      StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
      LuaOptions::default(),
    )
    .map_err(runtime_error)?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
      globals.set(*name, mlua::Value::Nil).map_err(runtime_error)?;
    }

    lua
      .set_memory_limit(self.settings.memory_limit_bytes)
      .map_err(runtime_error)?;

    Ok(lua)
  }
}

impl Default for LuaScriptEngine {
  fn default() -> Self {
    Self::new(ScriptSettings::default())
  }
}

impl ScriptEngine for LuaScriptEngine {
  fn evaluate(
    &self,
    source: &str,
    bindings: &[(&str, &serde_json::Value)],
  ) -> Result<serde_json::Value, ScriptError> {
    let lua = self.sandbox()?;

    let globals = lua.globals();
    for (name, value) in bindings {
      let lua_value = lua.to_value(value).map_err(|e| ScriptError::Conversion {
        message: format!("binding '{}': {}", name, e),
      })?;
      globals.set(*name, lua_value).map_err(runtime_error)?;
    }

    let timeout_ms = self.settings.timeout_ms;
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let timed_out = Arc::new(AtomicBool::new(false));
    let hook_flag = timed_out.clone();
    lua.set_hook(
      HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_INTERVAL),
      move |_lua, _debug| {
        if Instant::now() >= deadline {
          hook_flag.store(true, Ordering::SeqCst);
          return Err(mlua::Error::runtime("script deadline exceeded"));
        }
        Ok(VmState::Continue)
      },
    );

    let chunk = lua.load(source).set_name("snippet");
    let result = chunk.eval::<mlua::Value>();

    if timed_out.load(Ordering::SeqCst) {
      debug!(timeout_ms, "script_timed_out");
      return Err(ScriptError::Timeout { timeout_ms });
    }

    let value = result.map_err(|e| match e {
      mlua::Error::SyntaxError { message, .. } => ScriptError::Compile { message },
      other => runtime_error(other),
    })?;

    lua
      .from_value::<serde_json::Value>(value)
      .map_err(|e| ScriptError::Conversion {
        message: e.to_string(),
      })
  }
}

fn runtime_error(e: mlua::Error) -> ScriptError {
  ScriptError::Runtime {
    message: e.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn engine() -> LuaScriptEngine {
    LuaScriptEngine::default()
  }

  #[test]
  fn test_returns_bound_value() {
    let data = json!({ "name": "alice", "age": 30 });
    let result = engine()
      .evaluate("return data.name", &[("data", &data)])
      .unwrap();
    assert_eq!(result, json!("alice"));
  }

  #[test]
  fn test_builds_table_result() {
    let data = json!([1, 2, 3]);
    let result = engine()
      .evaluate(
        "local total = 0\nfor _, v in ipairs(data) do total = total + v end\nreturn { total = total, count = #data }",
        &[("data", &data)],
      )
      .unwrap();
    assert_eq!(result, json!({ "total": 6, "count": 3 }));
  }

  #[test]
  fn test_nil_return_is_null() {
    let result = engine().evaluate("return nil", &[]).unwrap();
    assert_eq!(result, serde_json::Value::Null);
  }

  #[test]
  fn test_syntax_error_is_compile_error() {
    let result = engine().evaluate("return (", &[]);
    assert!(matches!(result, Err(ScriptError::Compile { .. })));
  }

  #[test]
  fn test_raised_error_is_runtime_error() {
    let result = engine().evaluate("error('boom')", &[]);
    match result {
      Err(ScriptError::Runtime { message }) => assert!(message.contains("boom")),
      other => panic!("expected runtime error, got {:?}", other),
    }
  }

  #[test]
  fn test_os_and_io_unavailable() {
    for source in ["return os.time()", "return io.open('/etc/passwd')"] {
      let result = engine().evaluate(source, &[]);
      assert!(
        matches!(result, Err(ScriptError::Runtime { .. })),
        "{} should fail, got {:?}",
        source,
        result
      );
    }
  }

  #[test]
  fn test_load_and_require_removed() {
    let result = engine()
      .evaluate(
        "return load == nil and require == nil and dofile == nil and print == nil",
        &[],
      )
      .unwrap();
    assert_eq!(result, json!(true));
  }

  #[test]
  fn test_print_is_not_callable() {
    let result = engine().evaluate("print('to stdout') return 1", &[]);
    assert!(matches!(result, Err(ScriptError::Runtime { .. })));
  }

  #[test]
  fn test_infinite_loop_times_out() {
    let engine = LuaScriptEngine::new(ScriptSettings {
      timeout_ms: 50,
      ..ScriptSettings::default()
    });
    let result = engine.evaluate("while true do end", &[]);
    assert_eq!(result, Err(ScriptError::Timeout { timeout_ms: 50 }));
  }

  #[test]
  fn test_memory_limit_enforced() {
    let engine = LuaScriptEngine::new(ScriptSettings {
      memory_limit_bytes: 512 * 1024,
      ..ScriptSettings::default()
    });
    let result = engine.evaluate("return string.rep('x', 4 * 1024 * 1024)", &[]);
    assert!(matches!(result, Err(ScriptError::Runtime { .. })));
  }

  #[test]
  fn test_function_result_not_convertible() {
    let result = engine().evaluate("return function() end", &[]);
    assert!(matches!(result, Err(ScriptError::Conversion { .. })));
  }

  #[test]
  fn test_interpreters_do_not_share_state() {
    let engine = engine();
    engine.evaluate("leaked = 42", &[]).unwrap();
    let result = engine.evaluate("return leaked", &[]).unwrap();
    assert_eq!(result, serde_json::Value::Null);
  }
}
