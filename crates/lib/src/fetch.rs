//! Package source acquisition.
//!
//! Sources with a `local_url` are used in place; everything else is cloned
//! from the configured repositories in order, shallow, at the tag matching
//! the package version. The staging directory `<dest>/<name> <version>` is
//! reused when it already holds the expected rockspec, so an interrupted
//! operation does not refetch completed clones.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use dist_core::{Manifest, Package};

use crate::git::{self, GitError};

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("package '{0}' is not in the manifest")]
  NotInManifest(String),

  #[error("no repository provides '{package}' (tried {tried})")]
  AllReposFailed { package: String, tried: usize },

  #[error("failed to create staging directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Stage the sources for `packages`, in order, under `dest`. Returns each
/// package paired with its source directory.
pub fn fetch_packages(
  manifest: &Manifest,
  packages: &[Package],
  dest: &Path,
) -> Result<Vec<(Package, PathBuf)>, FetchError> {
  let mut out = Vec::with_capacity(packages.len());
  for pkg in packages {
    let dir = fetch_package(manifest, pkg, dest)?;
    out.push((pkg.clone(), dir));
  }
  Ok(out)
}

/// Stage one package and return its source directory.
pub fn fetch_package(manifest: &Manifest, pkg: &Package, dest: &Path) -> Result<PathBuf, FetchError> {
  let entry = manifest
    .lookup(&pkg.name, &pkg.version)
    .ok_or_else(|| FetchError::NotInManifest(pkg.dir_name()))?;

  // Local packages are built from where they live; nothing is copied.
  if let Some(local) = &entry.local_url {
    debug!(package = %pkg, dir = %local.display(), "using local source");
    return Ok(local.clone());
  }

  let staging = dest.join(pkg.dir_name());
  if staging_is_valid(&staging, pkg) {
    info!(package = %pkg, dir = %staging.display(), "reusing staged source");
    return Ok(staging);
  }

  fs::create_dir_all(dest).map_err(|source| FetchError::CreateDir {
    path: dest.to_path_buf(),
    source,
  })?;

  let tag = pkg.version.to_string();
  for repo in &manifest.repo_path {
    let url = format!("{}/{}.git", repo.trim_end_matches('/'), pkg.name);
    match git::shallow_clone(&url, &staging, Some(&tag)) {
      Ok(()) => {
        if staging_is_valid(&staging, pkg) {
          info!(package = %pkg, url = %url, "fetched");
          return Ok(staging);
        }
        warn!(package = %pkg, url = %url, "clone is missing the expected rockspec");
        discard(&staging);
      }
      Err(e) => {
        log_clone_failure(pkg, &url, &e);
        discard(&staging);
      }
    }
  }

  Err(FetchError::AllReposFailed {
    package: pkg.dir_name(),
    tried: manifest.repo_path.len(),
  })
}

/// Shallow validity check for an existing staging directory: it must hold
/// the package's rockspec.
fn staging_is_valid(staging: &Path, pkg: &Package) -> bool {
  staging
    .join(format!("{}-{}.rockspec", pkg.name, pkg.version))
    .is_file()
}

fn discard(staging: &Path) {
  if staging.exists() {
    let _ = fs::remove_dir_all(staging);
  }
}

fn log_clone_failure(pkg: &Package, url: &str, e: &GitError) {
  debug!(package = %pkg, url, error = %e, "repository candidate failed");
}

#[cfg(test)]
mod tests {
  use super::*;
  use dist_core::PkgEntry;
  use tempfile::TempDir;

  fn manifest_with(name: &str, version: &str, local: Option<&Path>) -> Manifest {
    let mut m = Manifest::new();
    let mut entry = PkgEntry::new(version.parse().unwrap());
    entry.local_url = local.map(Path::to_path_buf);
    m.add_entry(name, entry);
    m
  }

  #[test]
  fn local_url_short_circuits() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("xml");
    fs::create_dir_all(&local).unwrap();

    let m = manifest_with("xml", "1.8.0-1", Some(&local));
    let pkg = Package::new("xml", "1.8.0-1".parse().unwrap());
    let dir = fetch_package(&m, &pkg, temp.path()).unwrap();
    assert_eq!(dir, local);
  }

  #[test]
  fn staged_directory_is_reused() {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("xml 1.8.0-1");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("xml-1.8.0-1.rockspec"), "package = \"xml\"\nversion = \"1.8.0-1\"\n").unwrap();

    let m = manifest_with("xml", "1.8.0-1", None);
    let pkg = Package::new("xml", "1.8.0-1".parse().unwrap());
    let dir = fetch_package(&m, &pkg, temp.path()).unwrap();
    assert_eq!(dir, staging);
  }

  #[test]
  fn unknown_package_is_rejected() {
    let temp = TempDir::new().unwrap();
    let m = Manifest::new();
    let pkg = Package::new("ghost", "1.0".parse().unwrap());
    let err = fetch_package(&m, &pkg, temp.path()).unwrap_err();
    assert!(matches!(err, FetchError::NotInManifest(_)));
  }

  #[test]
  fn no_repositories_means_all_failed() {
    let temp = TempDir::new().unwrap();
    // In the manifest but no local_url and no repo_path entries to try.
    let m = manifest_with("xml", "1.8.0-1", None);
    let pkg = Package::new("xml", "1.8.0-1".parse().unwrap());
    let err = fetch_package(&m, &pkg, temp.path()).unwrap_err();
    assert!(matches!(err, FetchError::AllReposFailed { tried: 0, .. }));
  }

  #[test]
  fn order_is_preserved_across_packages() {
    let temp = TempDir::new().unwrap();
    let mut m = Manifest::new();
    let mut pkgs = Vec::new();
    for name in ["c-first", "a-second", "b-third"] {
      let dir = temp.path().join(name);
      fs::create_dir_all(&dir).unwrap();
      let mut entry = PkgEntry::new("1.0".parse().unwrap());
      entry.local_url = Some(dir);
      m.add_entry(name, entry);
      pkgs.push(Package::new(name, "1.0".parse().unwrap()));
    }

    let fetched = fetch_packages(&m, &pkgs, temp.path()).unwrap();
    let names: Vec<&str> = fetched.iter().map(|(p, _)| p.name.as_str()).collect();
    assert_eq!(names, ["c-first", "a-second", "b-third"]);
  }
}
