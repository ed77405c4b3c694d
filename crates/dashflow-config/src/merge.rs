use serde::{Deserialize, Serialize};

/// Policy for combining the processed items of one source into one value.
///
/// Serialized as an internally tagged object (`{"type": "select", "index": 1}`).
/// The bare strings `"object"` and `"array"` are accepted as shorthand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "StrategyRepr")]
pub enum MergeStrategy {
  /// Shallow-assign every item's keys into one object.
  #[default]
  Object,
  /// Concatenate items, splicing items that are themselves arrays.
  Array,
  /// Pick the item at `index`.
  Select { index: usize },
  /// Evaluate `body` with the item list bound as `items` and `list`.
  Script { body: String },
}

impl MergeStrategy {
  pub fn kind(&self) -> &'static str {
    match self {
      MergeStrategy::Object => "object",
      MergeStrategy::Array => "array",
      MergeStrategy::Select { .. } => "select",
      MergeStrategy::Script { .. } => "script",
    }
  }

  /// A strategy is well-formed when it is one of the known kinds and, for
  /// `script`, carries a non-empty body.
  pub fn is_well_formed(&self) -> bool {
    match self {
      MergeStrategy::Script { body } => !body.trim().is_empty(),
      _ => true,
    }
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
  Name(String),
  Tagged(TaggedStrategy),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedStrategy {
  Object,
  Array,
  Select {
    index: usize,
  },
  Script {
    #[serde(alias = "script")]
    body: String,
  },
}

impl TryFrom<StrategyRepr> for MergeStrategy {
  type Error = String;

  fn try_from(repr: StrategyRepr) -> Result<Self, Self::Error> {
    match repr {
      StrategyRepr::Name(name) => match name.as_str() {
        "object" => Ok(MergeStrategy::Object),
        "array" => Ok(MergeStrategy::Array),
        other => Err(format!(
          "merge strategy '{}' must be given as an object with its parameters",
          other
        )),
      },
      StrategyRepr::Tagged(tagged) => Ok(match tagged {
        TaggedStrategy::Object => MergeStrategy::Object,
        TaggedStrategy::Array => MergeStrategy::Array,
        TaggedStrategy::Select { index } => MergeStrategy::Select { index },
        TaggedStrategy::Script { body } => MergeStrategy::Script { body },
      }),
    }
  }
}
