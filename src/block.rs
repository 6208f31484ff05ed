use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::input::Input;

pub const PROCEDURES_CALL: &str = "procedures_call";
pub const PROCEDURES_CALL_RETURN: &str = "procedures_call_return";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Integer(i32),
  Float(f64),
  String(String),
}

impl Value {
  pub fn to_i32(&self) -> i32 {
    match self {
      Value::Bool(bool) => *bool as i32,
      Value::Integer(integer) => *integer,
      Value::Float(float) => *float as i32,
      Value::String(string) => string.trim().parse::<f64>().unwrap_or(0.) as i32,
    }
  }

  pub fn to_f64(&self) -> f64 {
    match self {
      Value::Bool(bool) => *bool as i32 as f64,
      Value::Integer(integer) => *integer as f64,
      Value::Float(float) if float.is_nan() => 0.,
      Value::Float(float) => *float,
      Value::String(string) => string.trim().parse::<f64>().unwrap_or(0.),
    }
  }

  /// Scratch truthiness: `""`, `"0"` and any casing of `"false"` are false.
  pub fn to_bool(&self) -> bool {
    match self {
      Value::Bool(bool) => *bool,
      Value::Integer(integer) => *integer != 0,
      Value::Float(float) => *float != 0. && !float.is_nan(),
      Value::String(string) => {
        !(string.is_empty() || string == "0" || string.eq_ignore_ascii_case("false"))
      }
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(bool) => write!(f, "{bool}"),
      Value::Integer(integer) => write!(f, "{integer}"),
      Value::Float(float) => write!(f, "{float}"),
      Value::String(string) => f.write_str(string),
    }
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Float(value)
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Integer(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub value: Value,
  pub id: Option<String>,
}

impl<'de> Deserialize<'de> for Field {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum T {
      Pair(Value, Option<String>),
      Single((Value,)),
    }
    Ok(match T::deserialize(de)? {
      T::Pair(value, id) => Self { value, id },
      T::Single((value,)) => Self { value, id: None },
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Mutation {
  #[serde(default)]
  pub proccode: Option<String>,
  #[serde(default)]
  pub warp: Option<Value>,
}

impl Mutation {
  pub fn is_warp(&self) -> bool {
    self.warp.as_ref().is_some_and(Value::to_bool)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
  pub opcode: String,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub parent: Option<String>,
  #[serde(default)]
  pub inputs: HashMap<String, Input>,
  #[serde(default)]
  pub fields: HashMap<String, Field>,
  #[serde(default)]
  pub shadow: bool,
  #[serde(default)]
  pub top_level: bool,
  #[serde(default)]
  pub mutation: Option<Mutation>,
}

impl Block {
  pub fn new(opcode: impl Into<String>) -> Self {
    Self {
      opcode: opcode.into(),
      ..Default::default()
    }
  }

  pub fn with_next(mut self, next: impl Into<String>) -> Self {
    self.next = Some(next.into());
    self
  }

  pub fn with_proccode(mut self, proccode: impl Into<String>) -> Self {
    self.mutation.get_or_insert_with(Mutation::default).proccode = Some(proccode.into());
    self
  }

  /// Both the command and the reporter flavour of a custom block call.
  pub fn is_procedure_call(&self) -> bool {
    self.opcode == PROCEDURES_CALL || self.opcode == PROCEDURES_CALL_RETURN
  }

  pub fn proccode(&self) -> Option<&str> {
    self.mutation.as_ref()?.proccode.as_deref()
  }
}

/// The block graph of one target, keyed by block id.
#[derive(Debug, Default)]
pub struct Blocks {
  blocks: HashMap<String, Block>,
}

impl Blocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_block(&self, id: &str) -> Option<&Block> {
    self.blocks.get(id)
  }

  pub fn get_next_block(&self, id: &str) -> Option<&str> {
    self.blocks.get(id)?.next.as_deref()
  }

  pub fn create_block(&mut self, id: impl Into<String>, block: Block) {
    self.blocks.insert(id.into(), block);
  }

  pub fn top_blocks(&self) -> impl Iterator<Item = &str> {
    self
      .blocks
      .iter()
      .filter(|(_, block)| block.top_level)
      .map(|(id, _)| id.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Block)> {
    self.blocks.iter().map(|(id, block)| (id.as_str(), block))
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }
}

impl<'de> Deserialize<'de> for Blocks {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    // Loose variable and list reporters are stored as bare arrays next to real blocks.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum T {
      Block(Block),
      Primitive(Vec<serde_json::Value>),
    }
    let raw: HashMap<String, T> = Deserialize::deserialize(de)?;
    let blocks = raw
      .into_iter()
      .filter_map(|(id, entry)| match entry {
        T::Block(block) => Some((id, block)),
        T::Primitive(_) => None,
      })
      .collect();
    Ok(Self { blocks })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn deserializes_procedure_call_with_mutation() {
    let block: Block = serde_json::from_value(json!({
      "opcode": "procedures_call",
      "next": "b",
      "parent": null,
      "inputs": {},
      "fields": {},
      "shadow": false,
      "topLevel": false,
      "mutation": {
        "tagName": "mutation",
        "children": [],
        "proccode": "jump %s",
        "argumentids": "[\"arg\"]",
        "warp": "true"
      }
    }))
    .unwrap();
    assert!(block.is_procedure_call());
    assert_eq!(block.proccode(), Some("jump %s"));
    assert!(block.mutation.unwrap().is_warp());
  }

  #[test]
  fn reporter_call_counts_as_procedure_call() {
    let block = Block::new(PROCEDURES_CALL_RETURN).with_proccode("sum");
    assert!(block.is_procedure_call());
    assert!(!Block::new("motion_movesteps").is_procedure_call());
    assert_eq!(Block::new("motion_movesteps").proccode(), None);
  }

  #[test]
  fn blocks_skip_loose_primitives() {
    let blocks: Blocks = serde_json::from_value(json!({
      "hat": { "opcode": "event_whenflagclicked", "next": "say", "topLevel": true },
      "say": {
        "opcode": "looks_say",
        "parent": "hat",
        "inputs": { "MESSAGE": [1, [10, "Hello!"]] },
        "fields": { "STYLE": ["normal", null] }
      },
      "loose": [12, "score", "var-id", 100, 200]
    }))
    .unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks.get_next_block("hat"), Some("say"));
    assert_eq!(blocks.get_next_block("say"), None);
    assert_eq!(blocks.get_next_block("missing"), None);
    assert_eq!(blocks.top_blocks().collect::<Vec<_>>(), vec!["hat"]);
    let say = blocks.get_block("say").unwrap();
    assert_eq!(say.inputs["MESSAGE"], Input::Value(Value::from("Hello!")));
    assert_eq!(say.fields["STYLE"].value, Value::from("normal"));
    assert_eq!(say.fields["STYLE"].id, None);
  }

  #[test]
  fn value_truthiness() {
    assert!(!Value::from("").to_bool());
    assert!(!Value::from("0").to_bool());
    assert!(!Value::from("FALSE").to_bool());
    assert!(Value::from("no").to_bool());
    assert!(!Value::Float(f64::NAN).to_bool());
    assert_eq!(Value::from(" 12.5 ").to_f64(), 12.5);
    assert_eq!(Value::from("abc").to_i32(), 0);
  }
}
