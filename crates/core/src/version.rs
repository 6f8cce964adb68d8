//! Package version parsing and ordering.
//!
//! Versions have the form `MAJOR[.MINOR[.PATCH[.…]]][-REV]`, optionally
//! followed by `_HEX`, the dependency hash a packed binary package carries.
//! Ordering is component-wise numeric with missing tail components treated
//! as zero, then by revision. The hash tag never participates in ordering
//! or equality; the original string is retained for display.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
  #[error("empty version string")]
  Empty,

  #[error("invalid version component '{0}'")]
  InvalidComponent(String),

  #[error("invalid version revision '{0}'")]
  InvalidRevision(String),
}

/// A parsed package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
  components: Vec<u64>,
  revision: u64,
  /// Dependency-hash tag (`_HEX` suffix), kept for display only.
  hash_tag: Option<String>,
  raw: String,
}

impl Version {
  /// Numeric components as parsed, in order.
  pub fn components(&self) -> &[u64] {
    &self.components
  }

  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn hash_tag(&self) -> Option<&str> {
    self.hash_tag.as_deref()
  }

  /// Component at `idx`, with missing tail components reading as zero.
  pub fn component(&self, idx: usize) -> u64 {
    self.components.get(idx).copied().unwrap_or(0)
  }

  /// Canonical string: trailing zero components trimmed (at least one kept),
  /// `-REV` appended when the revision is non-zero. `1.0` and `1.0.0`
  /// canonicalize identically; the hash tag is excluded.
  pub fn canonical(&self) -> String {
    let mut end = self.components.len();
    while end > 1 && self.components[end - 1] == 0 {
      end -= 1;
    }
    let mut out = self.components[..end]
      .iter()
      .map(|c| c.to_string())
      .collect::<Vec<_>>()
      .join(".");
    if self.revision != 0 {
      out.push('-');
      out.push_str(&self.revision.to_string());
    }
    out
  }

  /// The upper bound a pessimistic (`~>`) constraint excludes: this version
  /// with its last non-zero component incremented and later components
  /// zeroed, revision dropped.
  pub fn pessimistic_upper(&self) -> Version {
    let mut components = self.components.clone();
    let bump = components
      .iter()
      .rposition(|&c| c != 0)
      .unwrap_or(components.len().saturating_sub(1));
    components[bump] += 1;
    for c in components.iter_mut().skip(bump + 1) {
      *c = 0;
    }
    let raw = components.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(".");
    Version {
      components,
      revision: 0,
      hash_tag: None,
      raw,
    }
  }

  /// This version with the hash tag removed from its display string.
  pub fn without_hash_tag(&self) -> Version {
    match self.hash_tag {
      Some(_) => {
        let mut v = self.clone();
        v.hash_tag = None;
        v.raw = v.raw.rsplit_once('_').map(|(head, _)| head.to_string()).unwrap_or(v.raw);
        v
      }
      None => self.clone(),
    }
  }

  /// This version with a dependency-hash tag appended to its display string.
  pub fn with_hash_tag(&self, tag: &str) -> Version {
    let base = self.without_hash_tag();
    Version {
      raw: format!("{}_{}", base.raw, tag),
      hash_tag: Some(tag.to_string()),
      ..base
    }
  }
}

impl FromStr for Version {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let raw = s.trim();
    if raw.is_empty() {
      return Err(VersionError::Empty);
    }

    // Split off a trailing `_HEX` hash tag before anything else.
    let (body, hash_tag) = match raw.rsplit_once('_') {
      Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_hexdigit()) => {
        (head, Some(tail.to_string()))
      }
      _ => (raw, None),
    };

    let (numbers, revision) = match body.split_once('-') {
      Some((head, rev)) => {
        let revision = rev
          .parse::<u64>()
          .map_err(|_| VersionError::InvalidRevision(rev.to_string()))?;
        (head, revision)
      }
      None => (body, 0),
    };

    let mut components = Vec::new();
    for part in numbers.split('.') {
      let n = part
        .parse::<u64>()
        .map_err(|_| VersionError::InvalidComponent(part.to_string()))?;
      components.push(n);
    }

    Ok(Version {
      components,
      revision,
      hash_tag,
      raw: raw.to_string(),
    })
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.raw)
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Version {}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    let len = self.components.len().max(other.components.len());
    for i in 0..len {
      match self.component(i).cmp(&other.component(i)) {
        Ordering::Equal => {}
        ord => return ord,
      }
    }
    self.revision.cmp(&other.revision)
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl std::hash::Hash for Version {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    // Consistent with Eq: trailing zeros are insignificant.
    let mut end = self.components.len();
    while end > 0 && self.components[end - 1] == 0 {
      end -= 1;
    }
    self.components[..end].hash(state);
    self.revision.hash(state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(s: &str) -> Version {
    s.parse().unwrap()
  }

  #[test]
  fn parses_components_and_revision() {
    let version = v("1.8.0-1");
    assert_eq!(version.components(), &[1, 8, 0]);
    assert_eq!(version.revision(), 1);
    assert_eq!(version.to_string(), "1.8.0-1");
  }

  #[test]
  fn parses_hash_tag() {
    let version = v("1.8.0-1_a1b2c3d4e5");
    assert_eq!(version.hash_tag(), Some("a1b2c3d4e5"));
    assert_eq!(version.revision(), 1);
    // Hash tag is ignored by ordering and equality.
    assert_eq!(version, v("1.8.0-1"));
    assert_eq!(version.without_hash_tag().to_string(), "1.8.0-1");
  }

  #[test]
  fn rejects_malformed() {
    assert!(matches!("".parse::<Version>(), Err(VersionError::Empty)));
    assert!(matches!("1.x".parse::<Version>(), Err(VersionError::InvalidComponent(_))));
    assert!(matches!(
      "1.0-beta".parse::<Version>(),
      Err(VersionError::InvalidRevision(_))
    ));
  }

  #[test]
  fn missing_tail_components_read_as_zero() {
    assert_eq!(v("1.0"), v("1.0.0"));
    assert_eq!(v("5.3"), v("5.3.0.0"));
    assert!(v("1.0.1") > v("1.0"));
  }

  #[test]
  fn revision_compares_last() {
    assert!(v("1.0-1") > v("1.0"));
    assert!(v("1.0-2") > v("1.0-1"));
    assert!(v("1.0.1") > v("1.0-9"));
  }

  #[test]
  fn total_order_on_fixture_set() {
    // Exactly one of <, =, > holds for every pair, and < is transitive.
    let versions = ["0.9", "1.0", "1.0-1", "1.0.1", "1.2", "2.0", "10.0"]
      .iter()
      .map(|s| v(s))
      .collect::<Vec<_>>();
    for a in &versions {
      for b in &versions {
        let lt = a < b;
        let eq = a == b;
        let gt = a > b;
        assert_eq!(u8::from(lt) + u8::from(eq) + u8::from(gt), 1);
        for c in &versions {
          if a < b && b < c {
            assert!(a < c);
          }
        }
      }
    }
  }

  #[test]
  fn numeric_not_lexicographic() {
    assert!(v("10.0") > v("9.0"));
    assert!(v("1.10") > v("1.9"));
  }

  #[test]
  fn canonical_trims_trailing_zeros() {
    assert_eq!(v("1.0.0").canonical(), "1");
    assert_eq!(v("1.2.0").canonical(), "1.2");
    assert_eq!(v("1.2.0-1").canonical(), "1.2-1");
    assert_eq!(v("0.0").canonical(), "0");
    assert_eq!(v("1.8.0-1_abc123").canonical(), "1.8-1");
  }

  #[test]
  fn pessimistic_upper_increments_last_nonzero() {
    assert_eq!(v("5.3").pessimistic_upper(), v("5.4"));
    assert_eq!(v("1.2.0").pessimistic_upper(), v("1.3.0"));
    assert_eq!(v("1.2.3").pessimistic_upper(), v("1.2.4"));
    // Revision is dropped from the bound.
    assert_eq!(v("2.0-1").pessimistic_upper(), v("3.0"));
  }

  #[test]
  fn with_hash_tag_round_trip() {
    let tagged = v("1.8.0-1").with_hash_tag("deadbeef00");
    assert_eq!(tagged.to_string(), "1.8.0-1_deadbeef00");
    assert_eq!(tagged.hash_tag(), Some("deadbeef00"));
    assert_eq!(tagged, v("1.8.0-1"));
    // Re-tagging replaces, never stacks.
    let retagged = tagged.with_hash_tag("cafe000000");
    assert_eq!(retagged.to_string(), "1.8.0-1_cafe000000");
  }
}
