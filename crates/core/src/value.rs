//! Tagged data values.
//!
//! The closed set of scalar and container types a rockspec or manifest may
//! contain once evaluated. Executable content never reaches this type; the
//! evaluator in `dist-lua` rejects it at conversion time.

use std::fmt;

use crate::ordmap::OrderedMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Bool(bool),
  Int(i64),
  Num(f64),
  Str(String),
  List(Vec<Value>),
  Table(OrderedMap<Value>),
}

impl Value {
  pub fn table() -> Value {
    Value::Table(OrderedMap::new())
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_table(&self) -> Option<&OrderedMap<Value>> {
    match self {
      Value::Table(t) => Some(t),
      _ => None,
    }
  }

  /// Field of a table value, if this is a table and the field exists.
  pub fn field(&self, key: &str) -> Option<&Value> {
    self.as_table().and_then(|t| t.get(key))
  }

  /// Human-readable type name for error messages.
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Bool(_) => "boolean",
      Value::Int(_) | Value::Num(_) => "number",
      Value::Str(_) => "string",
      Value::List(_) => "list",
      Value::Table(_) => "table",
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Value {
    Value::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Value {
    Value::Str(s)
  }
}

impl From<Vec<String>> for Value {
  fn from(items: Vec<String>) -> Value {
    Value::List(items.into_iter().map(Value::Str).collect())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(n) => write!(f, "{}", n),
      Value::Num(n) => write!(f, "{}", n),
      Value::Str(s) => write!(f, "{:?}", s),
      Value::List(_) => write!(f, "<list>"),
      Value::Table(_) => write!(f, "<table>"),
    }
  }
}
