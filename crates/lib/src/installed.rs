//! The persisted installed set.
//!
//! An ordered collection of installed packages, written as a pretty-printed
//! Lua table at `<root>/<deploy-manifest>` after every successful
//! per-package install, so a killed operation keeps its completed packages.
//! Saves are atomic (write temp, rename). Order reflects install order and
//! survives load/save round trips.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use dist_core::package::PackageError;
use dist_core::{OrderedMap, Package, PackageRef, Value};

#[derive(Debug, Error)]
pub enum InstalledError {
  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse installed manifest '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: dist_lua::LuaError,
  },

  #[error("installed manifest '{path}' is not a list of package records")]
  NotAList { path: PathBuf },

  #[error("bad package record in '{path}': {source}")]
  BadRecord {
    path: PathBuf,
    #[source]
    source: PackageError,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("package '{0}' is already installed")]
  AlreadyInstalled(String),
}

#[derive(Debug, Clone, Default)]
pub struct InstalledSet {
  packages: OrderedMap<Package>,
}

impl InstalledSet {
  pub fn new() -> InstalledSet {
    InstalledSet::default()
  }

  /// Load from disk. A missing file is an empty set.
  pub fn load(path: &Path) -> Result<InstalledSet, InstalledError> {
    match fs::metadata(path) {
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(InstalledSet::new()),
      Err(source) => {
        return Err(InstalledError::Read {
          path: path.to_path_buf(),
          source,
        })
      }
      Ok(_) => {}
    }

    let value = dist_lua::eval_file(path).map_err(|source| InstalledError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    let records = value.as_list().ok_or_else(|| InstalledError::NotAList {
      path: path.to_path_buf(),
    })?;

    let mut set = InstalledSet::new();
    for record in records {
      let pkg = Package::from_value(record).map_err(|source| InstalledError::BadRecord {
        path: path.to_path_buf(),
        source,
      })?;
      set.packages.insert(pkg.name.clone(), pkg);
    }
    debug!(count = set.len(), path = %path.display(), "loaded installed set");
    Ok(set)
  }

  /// Persist atomically. Provisional packages are never written.
  pub fn save(&self, path: &Path) -> Result<(), InstalledError> {
    let records: Vec<Value> = self
      .packages
      .values()
      .filter(|pkg| !pkg.is_provisional)
      .map(Package::to_value)
      .collect();
    let text = dist_lua::to_lua_module(&Value::List(records));

    let write_err = |source| InstalledError::Write {
      path: path.to_path_buf(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_err)?;
    }
    let temp = path.with_extension("tmp");
    fs::write(&temp, text).map_err(write_err)?;
    fs::rename(&temp, path).map_err(write_err)?;
    debug!(count = self.len(), path = %path.display(), "saved installed set");
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.packages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty()
  }

  /// Installed packages in install order.
  pub fn packages(&self) -> impl Iterator<Item = &Package> {
    self.packages.values()
  }

  pub fn find(&self, name: &str) -> Option<&Package> {
    self.packages.get(name)
  }

  pub fn find_mut(&mut self, name: &str) -> Option<&mut Package> {
    self.packages.get_mut(name)
  }

  /// The installed package matching a reference, if any.
  pub fn find_match(&self, r: &PackageRef) -> Option<&Package> {
    self.packages.get(&r.name).filter(|pkg| pkg.matches(r))
  }

  /// Record a package. At most one version per name may be installed.
  pub fn add(&mut self, pkg: Package) -> Result<(), InstalledError> {
    if self.packages.contains_key(&pkg.name) {
      return Err(InstalledError::AlreadyInstalled(pkg.name));
    }
    self.packages.insert(pkg.name.clone(), pkg);
    Ok(())
  }

  pub fn remove(&mut self, name: &str) -> Option<Package> {
    self.packages.remove(name)
  }

  /// Working copy for the resolver: name → package.
  pub fn working_set(&self) -> OrderedMap<Package> {
    let mut map = OrderedMap::new();
    for pkg in self.packages.values() {
      map.insert(pkg.name.clone(), pkg.clone());
    }
    map
  }

  /// Whether `file` (relative to the deploy root) is listed by an installed
  /// package other than `except`.
  pub fn file_shared(&self, file: &str, except: &str) -> bool {
    self
      .packages
      .values()
      .any(|pkg| pkg.name != except && pkg.files.iter().any(|f| f == file))
  }
}
