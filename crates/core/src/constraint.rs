//! Version constraints and package references.
//!
//! A constraint is a set of `(operator, version)` clauses combined with AND.
//! Dependency strings and CLI targets use the textual form
//! `"name"`, `"name OP version"` or `"name version"` (exact match), with
//! additional comma-separated clauses ANDed: `"lua >= 5.1, < 5.4"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{Version, VersionError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintError {
  #[error("empty package reference")]
  EmptyRef,

  #[error("missing version after operator '{0}'")]
  MissingVersion(String),

  #[error(transparent)]
  Version(#[from] VersionError),
}

/// Constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  /// `~>`: at least the version, below its last non-zero component incremented.
  Pessimistic,
}

impl Op {
  fn parse(s: &str) -> Option<Op> {
    match s {
      "==" => Some(Op::Eq),
      "~=" => Some(Op::Ne),
      "<" => Some(Op::Lt),
      "<=" => Some(Op::Le),
      ">" => Some(Op::Gt),
      ">=" => Some(Op::Ge),
      "~>" => Some(Op::Pessimistic),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Op::Eq => "==",
      Op::Ne => "~=",
      Op::Lt => "<",
      Op::Le => "<=",
      Op::Gt => ">",
      Op::Ge => ">=",
      Op::Pessimistic => "~>",
    }
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// An AND-combined set of version clauses. The empty set matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraint {
  clauses: Vec<(Op, Version)>,
}

impl Constraint {
  /// A constraint satisfied by every version.
  pub fn any() -> Constraint {
    Constraint { clauses: Vec::new() }
  }

  /// Parse a comma-separated clause list: `">= 5.1, < 5.4"`. A clause with
  /// no operator is an exact match.
  pub fn parse(text: &str) -> Result<Constraint, ConstraintError> {
    let mut clauses = Vec::new();
    for part in text.split(',') {
      let part = part.trim();
      if part.is_empty() {
        continue;
      }
      clauses.push(parse_clause(part)?);
    }
    Ok(Constraint { clauses })
  }

  pub fn clauses(&self) -> &[(Op, Version)] {
    &self.clauses
  }

  pub fn is_any(&self) -> bool {
    self.clauses.is_empty()
  }

  /// True iff every clause holds for `version`.
  pub fn satisfied_by(&self, version: &Version) -> bool {
    self.clauses.iter().all(|(op, bound)| match op {
      Op::Eq => version == bound,
      Op::Ne => version != bound,
      Op::Lt => version < bound,
      Op::Le => version <= bound,
      Op::Gt => version > bound,
      Op::Ge => version >= bound,
      Op::Pessimistic => version >= bound && *version < bound.pessimistic_upper(),
    })
  }
}

fn parse_clause(part: &str) -> Result<(Op, Version), ConstraintError> {
  // Longest operators first so `<=` is not read as `<`.
  for op_text in ["==", "~=", "<=", ">=", "~>", "<", ">"] {
    if let Some(rest) = part.strip_prefix(op_text) {
      let rest = rest.trim();
      if rest.is_empty() {
        return Err(ConstraintError::MissingVersion(op_text.to_string()));
      }
      let op = Op::parse(op_text).unwrap_or(Op::Eq);
      return Ok((op, rest.parse()?));
    }
  }
  // Bare version: exact match.
  Ok((Op::Eq, part.parse()?))
}

impl fmt::Display for Constraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = self
      .clauses
      .iter()
      .map(|(op, v)| format!("{} {}", op, v))
      .collect::<Vec<_>>()
      .join(", ");
    write!(f, "{}", rendered)
  }
}

/// A named package plus the constraint its versions must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
  pub name: String,
  pub constraint: Constraint,
}

impl PackageRef {
  pub fn new(name: impl Into<String>, constraint: Constraint) -> PackageRef {
    PackageRef {
      name: name.into(),
      constraint,
    }
  }

  /// A reference matching any version of `name`.
  pub fn any(name: impl Into<String>) -> PackageRef {
    PackageRef::new(name, Constraint::any())
  }
}

impl FromStr for PackageRef {
  type Err = ConstraintError;

  /// Parse `"name"`, `"name OP version"`, `"name version"` or
  /// `"name OP version, OP version…"`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let text = s.trim();
    if text.is_empty() {
      return Err(ConstraintError::EmptyRef);
    }
    match text.split_once(char::is_whitespace) {
      Some((name, rest)) => Ok(PackageRef::new(name, Constraint::parse(rest)?)),
      None => Ok(PackageRef::any(text)),
    }
  }
}

impl fmt::Display for PackageRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.constraint.is_any() {
      write!(f, "{}", self.name)
    } else {
      write!(f, "{} {}", self.name, self.constraint)
    }
  }
}
