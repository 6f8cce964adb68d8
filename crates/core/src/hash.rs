//! Content hashing.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::consts::HASH_PREFIX_LEN;

/// A stable truncated hash over the JSON-serialized form of a value.
///
/// The digest is a 10-character lowercase-hex prefix of the SHA-256 of the
/// serialized struct; identical inputs always produce identical output.
/// Used for the dependency hash embedded in packed version strings.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<String, serde_json::Error> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(full[..HASH_PREFIX_LEN].to_string())
  }
}

impl<T: Serialize> Hashable for T {}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Serialize)]
  struct DepInput {
    platform: Vec<String>,
    deps: Vec<(String, String)>,
  }

  fn input() -> DepInput {
    DepInput {
      platform: vec!["linux".to_string(), "unix".to_string()],
      deps: vec![("lua".to_string(), "5.3.4".to_string())],
    }
  }

  #[test]
  fn hash_is_deterministic() {
    let a = input().compute_hash().unwrap();
    let b = input().compute_hash().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), HASH_PREFIX_LEN);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn hash_depends_on_every_input() {
    let base = input().compute_hash().unwrap();

    let mut other_platform = input();
    other_platform.platform = vec!["windows".to_string()];
    assert_ne!(base, other_platform.compute_hash().unwrap());

    let mut other_deps = input();
    other_deps.deps[0].1 = "5.2.4".to_string();
    assert_ne!(base, other_deps.compute_hash().unwrap());
  }
}
