//! Dashflow Script
//!
//! A narrow, sandboxed escape hatch for user-supplied snippets: item
//! transforms (`data` bound), script merge strategies (`items`/`list`
//! bound), script data items (`context` bound) and binding transforms
//! (`value` bound).
//!
//! Snippets are Lua chunks whose `return` value becomes the result:
//!
//! ```ignore
//! use dashflow_script::{LuaScriptEngine, ScriptEngine};
//!
//! let engine = LuaScriptEngine::default();
//! let doubled = engine.evaluate("return data * 2", &[("data", &json!(21))])?;
//! ```

mod engine;
mod error;

pub use engine::{LuaScriptEngine, ScriptEngine};
pub use error::ScriptError;
