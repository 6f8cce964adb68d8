//! Manifest retrieval and merging.
//!
//! Each configured URL contributes one manifest: remote URLs are shallow
//! git clones holding an index file, local directories are scanned for
//! rockspecs directly. Contributions merge with first-wins precedence:
//! a (package, version) entry present in an earlier source is never
//! overwritten by a later one. Any per-URL failure fails the whole
//! retrieval.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use dist_core::manifest::ManifestError;
use dist_core::rockspec::RockspecError;
use dist_core::{Config, Manifest, PkgEntry, Rockspec, VersionError};

use crate::git::{self, GitError};

#[derive(Debug, Error)]
pub enum ManifestStoreError {
  #[error("local repositories are disabled ('{0}')")]
  LocalReposDisabled(String),

  #[error("'{0}' is not a directory")]
  NotADirectory(PathBuf),

  #[error(transparent)]
  Clone(#[from] GitError),

  #[error("failed to load manifest '{path}': {source}")]
  Load {
    path: PathBuf,
    #[source]
    source: dist_lua::LuaError,
  },

  #[error("invalid manifest from '{url}': {source}")]
  Parse {
    url: String,
    #[source]
    source: ManifestError,
  },

  #[error("invalid rockspec '{path}': {source}")]
  BadRockspec {
    path: PathBuf,
    #[source]
    source: RockspecError,
  },

  #[error("invalid version in rockspec '{path}': {source}")]
  BadRockspecVersion {
    path: PathBuf,
    #[source]
    source: VersionError,
  },

  #[error("io error under '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Retrieve and merge the manifests behind `urls`, in listed order.
pub fn download_manifest(cfg: &Config, urls: &[String]) -> Result<Manifest, ManifestStoreError> {
  let mut merged = Manifest::new();

  for (idx, url) in urls.iter().enumerate() {
    let contribution = if git::is_remote_url(url) {
      load_remote(cfg, url, idx)?
    } else if cfg.include_local_repos {
      load_local_dir(Path::new(url))?
    } else {
      return Err(ManifestStoreError::LocalReposDisabled(url.clone()));
    };
    debug!(url = %url, packages = contribution.packages.len(), "merging manifest");
    merged.merge(contribution);
  }

  info!(
    sources = urls.len(),
    packages = merged.packages.len(),
    "manifest ready"
  );

  if cfg.debug {
    let dump = cfg.temp_dir.join(".manifest.debug");
    let text = dist_lua::to_lua_module(&merged.to_value());
    if let Err(e) = fs::create_dir_all(&cfg.temp_dir).and_then(|_| fs::write(&dump, text)) {
      warn!(path = %dump.display(), error = %e, "could not write manifest debug dump");
    }
  }

  Ok(merged)
}

/// Clone a remote manifest repository at its default branch tip and load
/// the index file inside.
fn load_remote(cfg: &Config, url: &str, idx: usize) -> Result<Manifest, ManifestStoreError> {
  let staging = cfg.temp_dir.join(format!("manifest_{}", idx));
  if staging.exists() {
    fs::remove_dir_all(&staging).map_err(|source| ManifestStoreError::Io {
      path: staging.clone(),
      source,
    })?;
  }
  git::shallow_clone(url, &staging, None)?;

  let path = staging.join(&cfg.manifest_filename);
  let value = dist_lua::eval_file(&path).map_err(|source| ManifestStoreError::Load {
    path: path.clone(),
    source,
  })?;
  let mut manifest = Manifest::from_value(&value).map_err(|source| ManifestStoreError::Parse {
    url: url.to_string(),
    source,
  })?;
  if manifest.repo_path.is_empty() {
    manifest.repo_path.push(url.to_string());
  }
  Ok(manifest)
}

/// Synthesize a manifest from a local directory: every first-level
/// subdirectory holding `.rockspec` files contributes its packages, each
/// entry carrying the containing directory as `local_url`.
fn load_local_dir(dir: &Path) -> Result<Manifest, ManifestStoreError> {
  if !dir.is_dir() {
    return Err(ManifestStoreError::NotADirectory(dir.to_path_buf()));
  }

  let mut manifest = Manifest::new();
  manifest.repo_path.push(dir.display().to_string());

  let mut subdirs: Vec<PathBuf> = Vec::new();
  for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| ManifestStoreError::Io {
      path: dir.to_path_buf(),
      source: e.into(),
    })?;
    if entry.file_type().is_dir() {
      subdirs.push(entry.into_path());
    }
  }

  for subdir in subdirs {
    for rockspec_path in rockspecs_in(&subdir)? {
      let value = dist_lua::eval_file(&rockspec_path).map_err(|source| ManifestStoreError::Load {
        path: rockspec_path.clone(),
        source,
      })?;
      let spec = Rockspec::from_value(&value).map_err(|source| ManifestStoreError::BadRockspec {
        path: rockspec_path.clone(),
        source,
      })?;
      let version = spec
        .version
        .parse()
        .map_err(|source| ManifestStoreError::BadRockspecVersion {
          path: rockspec_path.clone(),
          source,
        })?;

      let mut pkg = PkgEntry::new(version);
      pkg.dependencies = spec.dependencies.clone();
      pkg.supported_platforms = spec.supported_platforms.clone();
      pkg.local_url = Some(subdir.clone());
      debug!(package = %spec.package, version = %spec.version, dir = %subdir.display(), "local package");
      manifest.add_entry(&spec.package, pkg);
    }
  }

  Ok(manifest)
}

/// `.rockspec` files directly inside `dir`, sorted by name.
pub fn rockspecs_in(dir: &Path) -> Result<Vec<PathBuf>, ManifestStoreError> {
  let mut found = Vec::new();
  for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| ManifestStoreError::Io {
      path: dir.to_path_buf(),
      source: e.into(),
    })?;
    let is_rockspec = entry.file_type().is_file()
      && entry
        .path()
        .extension()
        .map(|ext| ext == "rockspec")
        .unwrap_or(false);
    if is_rockspec {
      found.push(entry.into_path());
    }
  }
  Ok(found)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn write_rockspec(dir: &Path, name: &str, version: &str, deps: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    let deps = deps
      .iter()
      .map(|d| format!("{:?}", d))
      .collect::<Vec<_>>()
      .join(", ");
    let text = format!(
      "package = \"{}\"\nversion = \"{}\"\ndependencies = {{ {} }}\n",
      name, version, deps
    );
    fs::write(dir.join(format!("{}-{}.rockspec", name, version)), text).unwrap();
  }

  fn local_cfg(temp: &TempDir) -> Config {
    let mut cfg = Config::default();
    cfg.set_root_dir(temp.path().join("root"));
    cfg.include_local_repos = true;
    cfg
  }

  #[test]
  fn local_dir_synthesizes_manifest() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    write_rockspec(&repo.join("xml"), "xml", "1.8.0-1", &["lua >= 5.1"]);
    write_rockspec(&repo.join("json"), "json", "0.5", &[]);

    let cfg = local_cfg(&temp);
    let manifest = download_manifest(&cfg, &[repo.display().to_string()]).unwrap();

    assert_eq!(manifest.repo_path, [repo.display().to_string()]);
    let entry = manifest.lookup("xml", &"1.8.0-1".parse().unwrap()).unwrap();
    assert_eq!(entry.dependencies, ["lua >= 5.1"]);
    assert_eq!(entry.local_url.as_deref(), Some(repo.join("xml").as_path()));
    assert!(manifest.lookup("json", &"0.5".parse().unwrap()).is_some());
  }

  #[test]
  fn local_repos_disabled_fails() {
    let temp = TempDir::new().unwrap();
    let mut cfg = local_cfg(&temp);
    cfg.include_local_repos = false;
    let err = download_manifest(&cfg, &[temp.path().display().to_string()]).unwrap_err();
    assert!(matches!(err, ManifestStoreError::LocalReposDisabled(_)));
  }

  #[test]
  fn earlier_url_wins_on_merge() {
    let temp = TempDir::new().unwrap();
    let repo_a = temp.path().join("a");
    let repo_b = temp.path().join("b");
    write_rockspec(&repo_a.join("xml"), "xml", "1.0", &["lua >= 5.1"]);
    write_rockspec(&repo_b.join("xml"), "xml", "1.0", &["lua >= 5.3"]);
    write_rockspec(&repo_b.join("xml2"), "xml", "2.0", &[]);

    let cfg = local_cfg(&temp);
    let manifest = download_manifest(
      &cfg,
      &[repo_a.display().to_string(), repo_b.display().to_string()],
    )
    .unwrap();

    // A's entry survives; B only contributes what A lacked.
    let entry = manifest.lookup("xml", &"1.0".parse().unwrap()).unwrap();
    assert_eq!(entry.dependencies, ["lua >= 5.1"]);
    assert_eq!(entry.local_url.as_deref(), Some(repo_a.join("xml").as_path()));
    assert!(manifest.lookup("xml", &"2.0".parse().unwrap()).is_some());
    assert_eq!(manifest.repo_path.len(), 2);
  }

  #[test]
  fn missing_local_dir_fails_whole_retrieval() {
    let temp = TempDir::new().unwrap();
    let good = temp.path().join("good");
    write_rockspec(&good.join("xml"), "xml", "1.0", &[]);

    let cfg = local_cfg(&temp);
    let missing = temp.path().join("missing");
    let err = download_manifest(
      &cfg,
      &[good.display().to_string(), missing.display().to_string()],
    )
    .unwrap_err();
    assert!(matches!(err, ManifestStoreError::NotADirectory(_)));
  }

  #[test]
  fn debug_mode_dumps_merged_manifest() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    write_rockspec(&repo.join("xml"), "xml", "1.0", &[]);

    let mut cfg = local_cfg(&temp);
    cfg.debug = true;
    download_manifest(&cfg, &[repo.display().to_string()]).unwrap();

    let dump = cfg.temp_dir.join(".manifest.debug");
    let text = fs::read_to_string(dump).unwrap();
    assert!(text.contains("packages"));
    assert!(text.contains("xml"));
  }

  #[test]
  fn bad_rockspec_fails_retrieval() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    let dir = repo.join("broken");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("broken-1.0.rockspec"), "package = \"broken\"\n").unwrap();

    let cfg = local_cfg(&temp);
    let err = download_manifest(&cfg, &[repo.display().to_string()]).unwrap_err();
    assert!(matches!(err, ManifestStoreError::BadRockspec { .. }));
  }
}
