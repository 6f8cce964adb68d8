//! The package index merged from upstream repositories.
//!
//! A manifest maps package names to the versions a repository offers, with
//! per-version dependency lists, optional platform filters, and, for
//! packages found in local directories, the path the source lives at.
//!
//! Version keys collapse on `Version::canonical()`, so `1.0` and `1.0.0`
//! are one entry. Merging is first-wins: an entry already present is never
//! overwritten by a later source.

use std::path::PathBuf;

use thiserror::Error;

use crate::ordmap::OrderedMap;
use crate::value::Value;
use crate::version::{Version, VersionError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ManifestError {
  #[error("manifest is not a table")]
  NotATable,

  #[error("manifest field '{0}' has the wrong type")]
  BadField(String),

  #[error("package '{name}': {source}")]
  BadVersion {
    name: String,
    #[source]
    source: VersionError,
  },
}

/// One (package, version) row of the index.
#[derive(Debug, Clone, PartialEq)]
pub struct PkgEntry {
  pub version: Version,
  pub dependencies: Vec<String>,
  pub supported_platforms: Vec<String>,
  /// Directory the package source lives at, for local repositories.
  pub local_url: Option<PathBuf>,
}

impl PkgEntry {
  pub fn new(version: Version) -> PkgEntry {
    PkgEntry {
      version,
      dependencies: Vec::new(),
      supported_platforms: Vec::new(),
      local_url: None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
  /// Repositories packages may be fetched from, one entry per contributing
  /// source, in contribution order.
  pub repo_path: Vec<String>,
  /// name → canonical version string → entry.
  pub packages: OrderedMap<OrderedMap<PkgEntry>>,
}

impl Manifest {
  pub fn new() -> Manifest {
    Manifest::default()
  }

  /// Insert an entry unless the (name, canonical version) slot is taken.
  /// Returns whether the entry was inserted.
  pub fn add_entry(&mut self, name: &str, entry: PkgEntry) -> bool {
    let key = entry.version.canonical();
    if !self.packages.contains_key(name) {
      self.packages.insert(name, OrderedMap::new());
    }
    match self.packages.get_mut(name) {
      Some(versions) if !versions.contains_key(&key) => {
        versions.insert(key, entry);
        true
      }
      _ => false,
    }
  }

  /// Merge `other` in with first-wins precedence, accumulating its
  /// repository paths.
  pub fn merge(&mut self, other: Manifest) {
    for repo in other.repo_path {
      if !self.repo_path.contains(&repo) {
        self.repo_path.push(repo);
      }
    }
    for (name, versions) in other.packages.iter() {
      for (_, entry) in versions.iter() {
        self.add_entry(name, entry.clone());
      }
    }
  }

  /// All known versions of `name`, unordered.
  pub fn versions_of(&self, name: &str) -> Vec<&PkgEntry> {
    match self.packages.get(name) {
      Some(versions) => versions.values().collect(),
      None => Vec::new(),
    }
  }

  pub fn lookup(&self, name: &str, version: &Version) -> Option<&PkgEntry> {
    self.packages.get(name).and_then(|versions| versions.get(&version.canonical()))
  }

  /// Parse the evaluated manifest file form:
  /// `{ repo_path = {…}, packages = { name = { [ver] = { … } } } }`.
  pub fn from_value(value: &Value) -> Result<Manifest, ManifestError> {
    let table = value.as_table().ok_or(ManifestError::NotATable)?;
    let mut manifest = Manifest::new();

    if let Some(repos) = table.get("repo_path") {
      manifest.repo_path = str_list(repos, "repo_path")?;
    }

    if let Some(packages) = table.get("packages") {
      let packages = packages
        .as_table()
        .ok_or_else(|| ManifestError::BadField("packages".to_string()))?;
      for (name, versions) in packages.iter() {
        let versions = versions
          .as_table()
          .ok_or_else(|| ManifestError::BadField(format!("packages.{}", name)))?;
        for (version_str, info) in versions.iter() {
          let version: Version = version_str.parse().map_err(|source| ManifestError::BadVersion {
            name: name.clone(),
            source,
          })?;
          let mut entry = PkgEntry::new(version);
          if let Some(info) = info.as_table() {
            if let Some(deps) = info.get("dependencies") {
              entry.dependencies = str_list(deps, "dependencies")?;
            }
            if let Some(platforms) = info.get("supported_platforms") {
              entry.supported_platforms = str_list(platforms, "supported_platforms")?;
            }
            if let Some(local) = info.get("local_url") {
              let path = local
                .as_str()
                .ok_or_else(|| ManifestError::BadField("local_url".to_string()))?;
              entry.local_url = Some(PathBuf::from(path));
            }
          }
          manifest.add_entry(name, entry);
        }
      }
    }

    Ok(manifest)
  }

  /// Render to the on-disk manifest form (used for the debug dump).
  pub fn to_value(&self) -> Value {
    let mut top = OrderedMap::new();
    top.insert("repo_path", Value::from(self.repo_path.clone()));

    let mut packages = OrderedMap::new();
    for (name, versions) in self.packages.iter() {
      let mut out_versions = OrderedMap::new();
      for (key, entry) in versions.iter() {
        let mut info = OrderedMap::new();
        if !entry.dependencies.is_empty() {
          info.insert("dependencies", Value::from(entry.dependencies.clone()));
        }
        if !entry.supported_platforms.is_empty() {
          info.insert("supported_platforms", Value::from(entry.supported_platforms.clone()));
        }
        if let Some(local) = &entry.local_url {
          info.insert("local_url", Value::from(local.display().to_string()));
        }
        out_versions.insert(key.clone(), Value::Table(info));
      }
      packages.insert(name.clone(), Value::Table(out_versions));
    }
    top.insert("packages", Value::Table(packages));
    Value::Table(top)
  }
}

fn str_list(value: &Value, field: &str) -> Result<Vec<String>, ManifestError> {
  let items = value
    .as_list()
    .ok_or_else(|| ManifestError::BadField(field.to_string()))?;
  items
    .iter()
    .map(|item| {
      item
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ManifestError::BadField(field.to_string()))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(version: &str, deps: &[&str]) -> PkgEntry {
    let mut e = PkgEntry::new(version.parse().unwrap());
    e.dependencies = deps.iter().map(|s| s.to_string()).collect();
    e
  }

  #[test]
  fn first_entry_wins() {
    let mut m = Manifest::new();
    assert!(m.add_entry("xml", entry("1.0", &["lua >= 5.1"])));
    assert!(!m.add_entry("xml", entry("1.0", &["lua >= 5.3"])));
    let kept = m.lookup("xml", &"1.0".parse().unwrap()).unwrap();
    assert_eq!(kept.dependencies, ["lua >= 5.1"]);
  }

  #[test]
  fn version_keys_collapse_on_canonical_form() {
    let mut m = Manifest::new();
    assert!(m.add_entry("xml", entry("1.0", &["lua >= 5.1"])));
    // 1.0.0 canonicalizes to the same key as 1.0.
    assert!(!m.add_entry("xml", entry("1.0.0", &["lua >= 5.3"])));
    assert_eq!(m.versions_of("xml").len(), 1);
  }

  #[test]
  fn merge_keeps_earlier_sources() {
    let mut a = Manifest::new();
    a.repo_path.push("git://a.example".to_string());
    a.add_entry("xml", entry("1.0", &["lua >= 5.1"]));

    let mut b = Manifest::new();
    b.repo_path.push("git://b.example".to_string());
    b.add_entry("xml", entry("1.0", &["lua >= 5.3"]));
    b.add_entry("xml", entry("2.0", &[]));
    b.add_entry("json", entry("0.5", &[]));

    a.merge(b);
    assert_eq!(a.repo_path, ["git://a.example", "git://b.example"]);
    // Existing (name, version) keeps A's entry; new material lands.
    assert_eq!(
      a.lookup("xml", &"1.0".parse().unwrap()).unwrap().dependencies,
      ["lua >= 5.1"]
    );
    assert!(a.lookup("xml", &"2.0".parse().unwrap()).is_some());
    assert!(a.lookup("json", &"0.5".parse().unwrap()).is_some());
  }

  #[test]
  fn value_round_trip() {
    let mut m = Manifest::new();
    m.repo_path.push("git://github.com/LuaDist2".to_string());
    m.add_entry("xml", entry("1.8.0-1", &["lua >= 5.1"]));
    let mut local = entry("0.1", &[]);
    local.local_url = Some(PathBuf::from("/srv/rocks/scratch"));
    m.add_entry("scratch", local);

    let again = Manifest::from_value(&m.to_value()).unwrap();
    assert_eq!(again, m);
  }

  #[test]
  fn bad_version_key_is_rejected() {
    let mut versions = OrderedMap::new();
    versions.insert("one.two", Value::table());
    let mut packages = OrderedMap::new();
    packages.insert("xml", Value::Table(versions));
    let mut top = OrderedMap::new();
    top.insert("packages", Value::Table(packages));

    let err = Manifest::from_value(&Value::Table(top)).unwrap_err();
    assert!(matches!(err, ManifestError::BadVersion { .. }));
  }
}
