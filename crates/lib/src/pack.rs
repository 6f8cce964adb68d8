//! Re-exporting installed packages.
//!
//! `pack` copies an installed package's files out of the deploy root into a
//! redistributable directory and writes a binary rockspec whose version
//! string carries a hash over the exact versions of the package's runtime
//! dependencies on the active platform. Two machines with identical
//! dependency sets produce identically named exports.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use dist_core::hash::Hashable;
use dist_core::{Config, Package, PackageRef, Version};

use crate::installed::InstalledSet;

#[derive(Debug, Error)]
pub enum PackError {
  #[error("package matching '{0}' is not installed")]
  NotInstalled(String),

  #[error("installed package has no recorded spec")]
  NoSpec,

  #[error("installed file '{file}' is missing from the deploy root")]
  MissingFile { file: String },

  #[error("failed to compute dependency hash: {0}")]
  Hash(#[from] serde_json::Error),

  #[error("io error at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> PackError + '_ {
  move |source| PackError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Input of the dependency hash: the platform tag set and each runtime
/// dependency's canonical version, in installed order.
#[derive(Serialize)]
struct DepHashInput {
  platform: Vec<String>,
  deps: Vec<(String, String)>,
}

/// Stable hex hash over the exact dependency versions on `platform`.
/// A pure function of its inputs: identical platform and dependency sets
/// yield identical hex output.
pub fn dep_hash(platform: &[String], deps: &[(String, Version)]) -> Result<String, PackError> {
  let input = DepHashInput {
    platform: platform.to_vec(),
    deps: deps
      .iter()
      .map(|(name, version)| (name.clone(), version.canonical()))
      .collect(),
  };
  Ok(input.compute_hash()?)
}

/// The installed packages satisfying `pkg`'s runtime dependencies, in
/// installed-set order. Prefers the recorded `bin_dependencies`; falls back
/// to resolving the spec's dependency list against the installed set.
pub fn runtime_deps(pkg: &Package, installed: &InstalledSet) -> Result<Vec<(String, Version)>, PackError> {
  if !pkg.bin_dependencies.is_empty() {
    let mut deps = Vec::new();
    for text in &pkg.bin_dependencies {
      let r: PackageRef = text.parse().map_err(|_| PackError::NotInstalled(text.clone()))?;
      match installed.find(&r.name) {
        Some(dep) => deps.push((dep.name.clone(), dep.version.clone())),
        None => return Err(PackError::NotInstalled(text.clone())),
      }
    }
    return Ok(deps);
  }

  let mut deps = Vec::new();
  for text in pkg.dependencies() {
    let r: PackageRef = match text.parse() {
      Ok(r) => r,
      Err(_) => continue,
    };
    if let Some(dep) = installed.find_match(&r) {
      deps.push((dep.name.clone(), dep.version.clone()));
    }
  }
  Ok(deps)
}

/// Export one installed package into `<destination>/<name> <version>_<hash>/`.
/// Returns the export directory.
pub fn pack_package(
  cfg: &Config,
  installed: &InstalledSet,
  target: &PackageRef,
  destination: &Path,
) -> Result<PathBuf, PackError> {
  let pkg = installed
    .find_match(target)
    .ok_or_else(|| PackError::NotInstalled(target.to_string()))?;
  let spec = pkg.spec.as_ref().ok_or(PackError::NoSpec)?;

  let deps = runtime_deps(pkg, installed)?;
  let hash = dep_hash(&cfg.platform, &deps)?;
  let tagged = pkg.version.with_hash_tag(&hash);

  let out_dir = destination.join(format!("{} {}", pkg.name, tagged));
  fs::create_dir_all(&out_dir).map_err(io_at(&out_dir))?;

  for file in &pkg.files {
    let from = cfg.root_dir.join(file);
    if !from.is_file() {
      return Err(PackError::MissingFile { file: file.clone() });
    }
    let to = out_dir.join(file);
    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    fs::copy(&from, &to).map_err(io_at(&from))?;
  }

  let mut exported = spec.clone();
  exported.version = tagged.to_string();
  exported.files = Some(pkg.files.clone());
  exported.dependencies = deps
    .iter()
    .map(|(name, version)| format!("{} ~> {}.{}", name, version.component(0), version.component(1)))
    .collect();
  exported.description.built_on = pkg
    .built_on_platform
    .clone()
    .or_else(|| Some(dist_platform::platform_string()));

  let rockspec_path = out_dir.join(format!("{}-{}.rockspec", pkg.name, tagged));
  let text = dist_lua::to_lua_module(&exported.to_value());
  fs::write(&rockspec_path, text).map_err(io_at(&rockspec_path))?;

  info!(package = %pkg, export = %out_dir.display(), "packed");
  Ok(out_dir)
}
