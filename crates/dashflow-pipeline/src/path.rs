//! Filter paths.
//!
//! A small path language for picking a value out of a fetched document:
//!
//! ```text
//! $                    the whole value
//! $.user.name          object keys
//! $.items[0].id        array indices
//! user.tags[1]         the leading `$` is optional
//! ```

use crate::error::ProcessError;

/// Longest path accepted, in segments.
pub const MAX_PATH_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
  Key(String),
  Index(usize),
}

/// Parse a filter path into segments. The root path parses to no segments.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, ProcessError> {
  let invalid = |message: &str| ProcessError::InvalidPath {
    path: path.to_string(),
    message: message.to_string(),
  };

  let trimmed = path.trim();
  let mut rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
  let mut segments = Vec::new();

  while !rest.is_empty() {
    if let Some(after) = rest.strip_prefix('[') {
      let end = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
      let index = after[..end]
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid("array index must be a non-negative integer"))?;
      segments.push(PathSegment::Index(index));
      rest = &after[end + 1..];
    } else {
      let body = rest.strip_prefix('.').unwrap_or(rest);
      let end = body.find(['.', '[']).unwrap_or(body.len());
      let key = &body[..end];
      if key.is_empty() {
        return Err(invalid("empty key"));
      }
      segments.push(PathSegment::Key(key.to_string()));
      rest = &body[end..];
    }

    if segments.len() > MAX_PATH_DEPTH {
      return Err(invalid("path is too deep"));
    }
  }

  Ok(segments)
}

/// Walk `segments` into `value`. Returns `None` for a missing key, an
/// out-of-range index, or a segment applied to the wrong kind of value.
pub fn select<'a>(
  value: &'a serde_json::Value,
  segments: &[PathSegment],
) -> Option<&'a serde_json::Value> {
  segments
    .iter()
    .try_fold(value, |current, segment| match segment {
      PathSegment::Key(key) => current.as_object()?.get(key),
      PathSegment::Index(index) => current.as_array()?.get(*index),
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_root() {
    assert!(parse_path("$").unwrap().is_empty());
    assert!(parse_path("").unwrap().is_empty());
  }

  #[test]
  fn test_parse_keys_and_indices() {
    assert_eq!(
      parse_path("$.items[2].name").unwrap(),
      vec![
        PathSegment::Key("items".to_string()),
        PathSegment::Index(2),
        PathSegment::Key("name".to_string()),
      ]
    );
    assert_eq!(
      parse_path("user.tags[0]").unwrap(),
      vec![
        PathSegment::Key("user".to_string()),
        PathSegment::Key("tags".to_string()),
        PathSegment::Index(0),
      ]
    );
  }

  #[test]
  fn test_parse_rejects_malformed() {
    assert!(parse_path("$.items[").is_err());
    assert!(parse_path("$.items[-1]").is_err());
    assert!(parse_path("$.a..b").is_err());
  }

  #[test]
  fn test_parse_rejects_deep_paths() {
    let deep = format!("${}", ".k".repeat(MAX_PATH_DEPTH + 1));
    assert!(matches!(
      parse_path(&deep),
      Err(ProcessError::InvalidPath { .. })
    ));

    let limit = format!("${}", ".k".repeat(MAX_PATH_DEPTH));
    assert_eq!(parse_path(&limit).unwrap().len(), MAX_PATH_DEPTH);
  }

  #[test]
  fn test_select() {
    let value = json!({ "user": { "name": "alice", "tags": ["a", "b"] } });
    let segments = parse_path("$.user.tags[1]").unwrap();
    assert_eq!(select(&value, &segments), Some(&json!("b")));

    let missing = parse_path("$.user.tags[5]").unwrap();
    assert_eq!(select(&value, &missing), None);

    let wrong_kind = parse_path("$.user.name.first").unwrap();
    assert_eq!(select(&value, &wrong_kind), None);
  }
}
