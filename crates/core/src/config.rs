//! Tool configuration.
//!
//! Every option the tool recognizes, with built-in defaults. Environment
//! variables (`DIST_ROOT`, `DIST_TEMP`) override defaults; CLI flags
//! override both. Once an operation starts the configuration is read-only.

use std::path::PathBuf;

use crate::consts::{DEPLOY_MANIFEST, MANIFEST_FILENAME};
use crate::ordmap::OrderedMap;

#[derive(Debug, Clone)]
pub struct Config {
  /// The deploy root packages install into.
  pub root_dir: PathBuf,
  /// Staging area for clones and build directories.
  pub temp_dir: PathBuf,
  /// Manifest repositories, in precedence order.
  pub manifest_repos: Vec<String>,
  /// Index file name inside a remote manifest repository.
  pub manifest_filename: String,
  /// Installed-set file name under the deploy root.
  pub deploy_manifest: String,
  /// Active platform tags, most specific first. Empty means detect.
  pub platform: Vec<String>,
  pub cache_command: String,
  pub cache_debug_options: String,
  pub build_command: String,
  pub build_debug_options: String,
  pub cmake: String,
  pub include_local_repos: bool,
  /// Retain staging directories and dump the merged manifest.
  pub debug: bool,
  /// Emit a markdown activity report per operation.
  pub report: bool,
  /// Caller-supplied build variables, above config defaults and below
  /// nothing: rockspec variables never override these.
  pub variables: OrderedMap<String>,
}

impl Default for Config {
  fn default() -> Config {
    let root_dir = PathBuf::from("_dist");
    Config {
      temp_dir: root_dir.join("tmp"),
      root_dir,
      manifest_repos: vec!["https://github.com/LuaDist2/manifest.git".to_string()],
      manifest_filename: MANIFEST_FILENAME.to_string(),
      deploy_manifest: DEPLOY_MANIFEST.to_string(),
      platform: Vec::new(),
      cache_command: "cmake -C cache.cmake".to_string(),
      cache_debug_options: "-DCMAKE_VERBOSE_MAKEFILE=ON -DCMAKE_BUILD_TYPE=Debug".to_string(),
      build_command: "cmake --build .".to_string(),
      build_debug_options: "--config Debug".to_string(),
      cmake: "cmake".to_string(),
      include_local_repos: false,
      debug: false,
      report: false,
      variables: OrderedMap::new(),
    }
  }
}

impl Config {
  /// Defaults with environment overrides applied.
  pub fn from_env() -> Config {
    let mut cfg = Config::default();
    if let Ok(root) = std::env::var("DIST_ROOT") {
      if !root.is_empty() {
        cfg.set_root_dir(PathBuf::from(root));
      }
    }
    if let Ok(temp) = std::env::var("DIST_TEMP") {
      if !temp.is_empty() {
        cfg.temp_dir = PathBuf::from(temp);
      }
    }
    cfg
  }

  /// Point at a different deploy root, keeping the temp dir inside it
  /// unless it was set independently.
  pub fn set_root_dir(&mut self, root: PathBuf) {
    let default_temp = self.root_dir.join("tmp");
    if self.temp_dir == default_temp {
      self.temp_dir = root.join("tmp");
    }
    self.root_dir = root;
  }

  /// Path of the persisted installed set.
  pub fn deploy_manifest_path(&self) -> PathBuf {
    self.root_dir.join(&self.deploy_manifest)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_consistent() {
    let cfg = Config::default();
    assert_eq!(cfg.temp_dir, cfg.root_dir.join("tmp"));
    assert!(!cfg.include_local_repos);
    assert!(!cfg.debug);
    assert_eq!(cfg.deploy_manifest_path(), cfg.root_dir.join("dist.manifest"));
  }

  #[test]
  fn set_root_dir_moves_default_temp() {
    let mut cfg = Config::default();
    cfg.set_root_dir(PathBuf::from("/opt/dist"));
    assert_eq!(cfg.temp_dir, PathBuf::from("/opt/dist/tmp"));

    // An explicitly placed temp dir stays put.
    let mut cfg = Config::default();
    cfg.temp_dir = PathBuf::from("/var/tmp/dist");
    cfg.set_root_dir(PathBuf::from("/opt/dist"));
    assert_eq!(cfg.temp_dir, PathBuf::from("/var/tmp/dist"));
  }
}
