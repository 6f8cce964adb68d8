//! Insertion-ordered string-keyed map.
//!
//! Downstream stages (downloader, installer, static bundler) rely on the
//! deterministic order the resolver emits; this container preserves it while
//! keeping O(1) average lookup. Re-inserting an existing key replaces the
//! value but keeps the original position.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OrderedMap<V> {
  keys: Vec<String>,
  map: HashMap<String, V>,
}

impl<V> Default for OrderedMap<V> {
  fn default() -> OrderedMap<V> {
    OrderedMap::new()
  }
}

impl<V> OrderedMap<V> {
  pub fn new() -> OrderedMap<V> {
    OrderedMap {
      keys: Vec::new(),
      map: HashMap::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.map.contains_key(key)
  }

  pub fn get(&self, key: &str) -> Option<&V> {
    self.map.get(key)
  }

  pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
    self.map.get_mut(key)
  }

  /// Insert, returning the previous value if the key was present. The key
  /// keeps its original position on replacement.
  pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
    let key = key.into();
    let prev = self.map.insert(key.clone(), value);
    if prev.is_none() {
      self.keys.push(key);
    }
    prev
  }

  /// Remove a key, preserving the order of the remaining entries.
  pub fn remove(&mut self, key: &str) -> Option<V> {
    let removed = self.map.remove(key)?;
    self.keys.retain(|k| k != key);
    Some(removed)
  }

  /// Keys in insertion order.
  pub fn keys(&self) -> impl Iterator<Item = &String> {
    self.keys.iter()
  }

  /// Entries in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
    self.keys.iter().map(move |k| (k, &self.map[k]))
  }

  /// Values in insertion order.
  pub fn values(&self) -> impl Iterator<Item = &V> {
    self.keys.iter().map(move |k| &self.map[k])
  }
}

impl<V: PartialEq> PartialEq for OrderedMap<V> {
  fn eq(&self, other: &Self) -> bool {
    self.keys == other.keys && self.keys.iter().all(|k| self.map.get(k) == other.map.get(k))
  }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
  fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
    let mut out = OrderedMap::new();
    for (k, v) in iter {
      out.insert(k, v);
    }
    out
  }
}
