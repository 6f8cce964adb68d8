//! The package value: a named, versioned unit.
//!
//! Packages come out of the resolver or out of the persisted installed set.
//! Identity is the (name, parsed version) pair; everything else is carried
//! state the install pipeline fills in.

use std::fmt;

use thiserror::Error;

use crate::constraint::PackageRef;
use crate::ordmap::OrderedMap;
use crate::rockspec::{Rockspec, RockspecError};
use crate::value::Value;
use crate::version::{Version, VersionError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PackageError {
  #[error("package record is not a table")]
  NotATable,

  #[error("package record is missing field '{0}'")]
  MissingField(&'static str),

  #[error("package record field '{0}' has the wrong type")]
  BadField(&'static str),

  #[error(transparent)]
  Version(#[from] VersionError),

  #[error(transparent)]
  Rockspec(#[from] RockspecError),
}

#[derive(Debug, Clone)]
pub struct Package {
  pub name: String,
  pub version: Version,
  /// Attached once install begins (or loaded from the installed set).
  pub spec: Option<Rockspec>,
  /// Installed files, relative to the deploy root.
  pub files: Vec<String>,
  /// `"name version"` entries for the runtime dependencies this package was
  /// built against. Filled by the installer's second pass.
  pub bin_dependencies: Vec<String>,
  pub built_on_platform: Option<String>,
  /// Seeded only to drive a fallback resolver attempt; never installed and
  /// never persisted.
  pub is_provisional: bool,
}

impl Package {
  pub fn new(name: impl Into<String>, version: Version) -> Package {
    Package {
      name: name.into(),
      version,
      spec: None,
      files: Vec::new(),
      bin_dependencies: Vec::new(),
      built_on_platform: None,
      is_provisional: false,
    }
  }

  pub fn provisional(name: impl Into<String>, version: Version) -> Package {
    Package {
      is_provisional: true,
      ..Package::new(name, version)
    }
  }

  /// True when the ref names this package and every constraint holds.
  pub fn matches(&self, r: &PackageRef) -> bool {
    self.name == r.name && r.constraint.satisfied_by(&self.version)
  }

  /// Staging/export directory name: `<name> <version>`.
  pub fn dir_name(&self) -> String {
    format!("{} {}", self.name, self.version)
  }

  /// Runtime dependency strings from the attached spec.
  pub fn dependencies(&self) -> &[String] {
    self.spec.as_ref().map(|s| s.dependencies.as_slice()).unwrap_or(&[])
  }

  /// Parse from a persisted installed-set record.
  pub fn from_value(value: &Value) -> Result<Package, PackageError> {
    let table = value.as_table().ok_or(PackageError::NotATable)?;

    let name = table
      .get("name")
      .ok_or(PackageError::MissingField("name"))?
      .as_str()
      .ok_or(PackageError::BadField("name"))?
      .to_string();
    let version: Version = table
      .get("version")
      .ok_or(PackageError::MissingField("version"))?
      .as_str()
      .ok_or(PackageError::BadField("version"))?
      .parse()?;

    let mut pkg = Package::new(name, version);
    if let Some(files) = table.get("files") {
      pkg.files = value_str_list(files, "files")?;
    }
    if let Some(deps) = table.get("bin_dependencies") {
      pkg.bin_dependencies = value_str_list(deps, "bin_dependencies")?;
    }
    if let Some(platform) = table.get("built_on_platform") {
      pkg.built_on_platform = Some(
        platform
          .as_str()
          .ok_or(PackageError::BadField("built_on_platform"))?
          .to_string(),
      );
    }
    if let Some(spec) = table.get("spec") {
      pkg.spec = Some(Rockspec::from_value(spec)?);
    }
    Ok(pkg)
  }

  /// Render to the persisted installed-set record. Provisional packages are
  /// never written; callers filter them out before persisting.
  pub fn to_value(&self) -> Value {
    let mut table = OrderedMap::new();
    table.insert("name", Value::from(self.name.clone()));
    table.insert("version", Value::from(self.version.to_string()));
    if !self.files.is_empty() {
      table.insert("files", Value::from(self.files.clone()));
    }
    if !self.bin_dependencies.is_empty() {
      table.insert("bin_dependencies", Value::from(self.bin_dependencies.clone()));
    }
    if let Some(platform) = &self.built_on_platform {
      table.insert("built_on_platform", Value::from(platform.clone()));
    }
    if let Some(spec) = &self.spec {
      table.insert("spec", spec.to_value());
    }
    Value::Table(table)
  }
}

/// Identity is the (name, parsed version) pair; carried state does not
/// participate.
impl PartialEq for Package {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.version == other.version
  }
}

impl Eq for Package {}

fn value_str_list(value: &Value, field: &'static str) -> Result<Vec<String>, PackageError> {
  let items = value.as_list().ok_or(PackageError::BadField(field))?;
  items
    .iter()
    .map(|item| {
      item
        .as_str()
        .map(str::to_string)
        .ok_or(PackageError::BadField(field))
    })
    .collect()
}

impl fmt::Display for Package {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.name, self.version)
  }
}
