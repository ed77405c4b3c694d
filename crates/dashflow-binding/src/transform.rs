//! Binding value transforms.

use std::sync::Arc;

use dashflow_config::ValueTransform;
use dashflow_script::ScriptEngine;
use minijinja::{Environment, context};
use serde_json::Value;

use crate::error::TransformError;

/// Applies [`ValueTransform`]s, delegating `script` to the sandbox.
#[derive(Clone)]
pub struct TransformRunner {
  script: Arc<dyn ScriptEngine>,
}

impl TransformRunner {
  pub fn new(script: Arc<dyn ScriptEngine>) -> Self {
    Self { script }
  }

  pub fn apply(&self, transform: &ValueTransform, value: &Value) -> Result<Value, TransformError> {
    match transform {
      ValueTransform::Join { separator } => Ok(match value {
        Value::Array(items) => Value::String(
          items
            .iter()
            .map(plain_string)
            .collect::<Vec<_>>()
            .join(separator),
        ),
        other => other.clone(),
      }),
      ValueTransform::Uppercase => Ok(map_string(value, str::to_uppercase)),
      ValueTransform::Lowercase => Ok(map_string(value, str::to_lowercase)),
      ValueTransform::ParseInt { fallback } => Ok(Value::from(parse_int(value).unwrap_or(*fallback))),
      ValueTransform::Clamp { min, max } => clamp(value, *min, *max),
      ValueTransform::Template { source } => Environment::new()
        .render_str(source, context! { value => minijinja::Value::from_serialize(value) })
        .map(Value::String)
        .map_err(|e| TransformError::Template {
          message: e.to_string(),
        }),
      ValueTransform::Script { source } => self
        .script
        .evaluate(source, &[("value", value)])
        .map_err(|e| TransformError::Script { source: e }),
    }
  }
}

fn plain_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn map_string(value: &Value, f: impl Fn(&str) -> String) -> Value {
  match value {
    Value::String(s) => Value::String(f(s)),
    other => other.clone(),
  }
}

fn parse_int(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    }
    _ => None,
  }
}

fn clamp(value: &Value, min: f64, max: f64) -> Result<Value, TransformError> {
  let number = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
  .ok_or_else(|| TransformError::Unsupported {
    transform: "clamp".to_string(),
    value: value.to_string(),
  })?;

  let clamped = number.max(min).min(max);
  if clamped.fract() == 0.0 && clamped.abs() < i64::MAX as f64 {
    Ok(Value::from(clamped as i64))
  } else {
    Ok(Value::from(clamped))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use dashflow_script::LuaScriptEngine;
  use serde_json::json;

  fn runner() -> TransformRunner {
    TransformRunner::new(LuaScriptEngine::shared(Default::default()))
  }

  fn apply(transform: ValueTransform, value: Value) -> Result<Value, TransformError> {
    runner().apply(&transform, &value)
  }

  #[test]
  fn test_join() {
    let join = ValueTransform::Join {
      separator: ",".to_string(),
    };
    assert_eq!(apply(join.clone(), json!(["t", "h", 3])).unwrap(), json!("t,h,3"));
    assert_eq!(apply(join, json!("already")).unwrap(), json!("already"));
  }

  #[test]
  fn test_case() {
    assert_eq!(apply(ValueTransform::Uppercase, json!("abc")).unwrap(), json!("ABC"));
    assert_eq!(apply(ValueTransform::Lowercase, json!("AbC")).unwrap(), json!("abc"));
    assert_eq!(apply(ValueTransform::Uppercase, json!(5)).unwrap(), json!(5));
  }

  #[test]
  fn test_parse_int() {
    let parse = ValueTransform::ParseInt { fallback: 30 };
    assert_eq!(apply(parse.clone(), json!("45")).unwrap(), json!(45));
    assert_eq!(apply(parse.clone(), json!("12.9")).unwrap(), json!(12));
    assert_eq!(apply(parse.clone(), json!(7.5)).unwrap(), json!(7));
    assert_eq!(apply(parse.clone(), json!("soon")).unwrap(), json!(30));
    assert_eq!(apply(parse, json!(null)).unwrap(), json!(30));
  }

  #[test]
  fn test_clamp() {
    let clamp = ValueTransform::Clamp {
      min: 1.0,
      max: 100.0,
    };
    assert_eq!(apply(clamp.clone(), json!(250)).unwrap(), json!(100));
    assert_eq!(apply(clamp.clone(), json!(0)).unwrap(), json!(1));
    assert_eq!(apply(clamp.clone(), json!(2.5)).unwrap(), json!(2.5));
    assert!(matches!(
      apply(clamp, json!("many")),
      Err(TransformError::Unsupported { .. })
    ));
  }

  #[test]
  fn test_template() {
    let template = ValueTransform::Template {
      source: "{{ value.start }}..{{ value.end }}".to_string(),
    };
    assert_eq!(
      apply(template, json!({ "start": "a", "end": "b" })).unwrap(),
      json!("a..b")
    );
  }

  #[test]
  fn test_script() {
    let script = ValueTransform::Script {
      source: "return value * 2".to_string(),
    };
    assert_eq!(apply(script, json!(21)).unwrap(), json!(42));

    let broken = ValueTransform::Script {
      source: "error('nope')".to_string(),
    };
    assert!(matches!(
      apply(broken, json!(1)),
      Err(TransformError::Script { .. })
    ));
  }
}
