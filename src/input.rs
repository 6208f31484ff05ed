use serde::de::{Error, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fmt::Formatter;

use crate::block::Value;

/// What sits in a block's input slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
  Block(String),
  Value(Value),
  Broadcast(Reference),
  Variable(Reference),
  List(Reference),
  Empty,
}

/// A named reference to a broadcast, variable or list.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
  pub name: String,
  pub id: String,
}

impl Input {
  pub fn block_id(&self) -> Option<&str> {
    match self {
      Input::Block(id) => Some(id),
      _ => None,
    }
  }
}

impl<'de> Deserialize<'de> for Input {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct SeqVisitor;
    impl<'de> Visitor<'de> for SeqVisitor {
      type Value = Input;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "an input array of shadow type, payload and obscured shadow")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum T {
          String(String),
          Values(Vec<Value>),
        }
        let _shadow = seq
          .next_element::<i32>()?
          .ok_or_else(|| A::Error::invalid_length(0, &self))?;
        let input = match seq.next_element::<Option<T>>()? {
          Some(Some(T::String(id))) => Input::Block(id),
          Some(Some(T::Values(values))) => primitive(values).map_err(A::Error::custom)?,
          Some(None) | None => Input::Empty,
        };
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(input)
      }
    }
    de.deserialize_seq(SeqVisitor)
  }
}

fn primitive(mut values: Vec<Value>) -> Result<Input, String> {
  if values.len() < 2 {
    return Err(format!("primitive input needs at least 2 elements, got {}", values.len()));
  }
  let code = values[0].to_i32();
  match code {
    4..=10 => Ok(Input::Value(values.swap_remove(1))),
    11..=13 => {
      if values.len() < 3 {
        return Err(format!("reference input {code} is missing its id"));
      }
      let reference = Reference {
        name: values[1].to_string(),
        id: values[2].to_string(),
      };
      Ok(match code {
        11 => Input::Broadcast(reference),
        12 => Input::Variable(reference),
        _ => Input::List(reference),
      })
    }
    _ => Err(format!("unknown primitive input code {code}")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn input(value: serde_json::Value) -> Result<Input, serde_json::Error> {
    serde_json::from_value(value)
  }

  #[test]
  fn block_and_substack_inputs() {
    assert_eq!(input(json!([2, "inner"])).unwrap(), Input::Block("inner".into()));
    assert_eq!(
      input(json!([3, "reporter", [4, "10"]])).unwrap().block_id(),
      Some("reporter")
    );
    assert_eq!(input(json!([1, null])).unwrap(), Input::Empty);
  }

  #[test]
  fn literal_and_reference_inputs() {
    assert_eq!(input(json!([1, [4, "10"]])).unwrap(), Input::Value(Value::from("10")));
    assert_eq!(
      input(json!([3, [12, "score", "var-1"], [10, ""]])).unwrap(),
      Input::Variable(Reference {
        name: "score".into(),
        id: "var-1".into()
      })
    );
    assert!(matches!(
      input(json!([1, [11, "go", "msg-1"]])).unwrap(),
      Input::Broadcast(_)
    ));
    assert!(matches!(
      input(json!([1, [13, "items", "list-1"]])).unwrap(),
      Input::List(_)
    ));
  }

  #[test]
  fn malformed_inputs_are_errors() {
    assert!(input(json!([1, [99, "?"]])).is_err());
    assert!(input(json!([1, [12, "name"]])).is_err());
    assert!(input(json!([])).is_err());
  }
}
