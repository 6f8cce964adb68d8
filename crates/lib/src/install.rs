//! The per-package install pipeline.
//!
//! Loads the rockspec, then either copies a prebuilt binary package into
//! the deploy root or drives a native build: variable accumulation, cache
//! script, configure, build, install, and capture of the install manifest
//! the build emits. Staging directories are deleted on success unless debug
//! mode retains them; on failure they stay for inspection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use dist_core::rockspec::RockspecError;
use dist_core::{Config, OrderedMap, Package, Rockspec, SpecKind};

use crate::cmake::{self, CmakeError};
use crate::process;

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("missing rockspec '{0}'")]
  MissingRockspec(PathBuf),

  #[error("unloadable rockspec '{path}': {source}")]
  LoadRockspec {
    path: PathBuf,
    #[source]
    source: dist_lua::LuaError,
  },

  #[error("invalid rockspec '{path}': {source}")]
  BadRockspec {
    path: PathBuf,
    #[source]
    source: RockspecError,
  },

  #[error("invalid version in rockspec '{path}': {source}")]
  BadVersion {
    path: PathBuf,
    #[source]
    source: dist_core::VersionError,
  },

  #[error("cannot generate build file: {0}")]
  Generate(#[from] CmakeError),

  #[error("configure step failed:\n{output}")]
  Configure { output: String },

  #[error("build step failed:\n{output}")]
  Build { output: String },

  #[error("install step failed:\n{output}")]
  InstallStep { output: String },

  #[error("install manifest '{path}' is unreadable: {source}")]
  ManifestUnreadable {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("io error at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> InstallError + '_ {
  move |source| InstallError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Install one package from its staged source directory, attaching the
/// loaded spec and the recorded file list to `pkg`.
pub fn install_package(cfg: &Config, pkg: &mut Package, src_dir: &Path) -> Result<(), InstallError> {
  let spec = load_rockspec_for(pkg, src_dir)?;

  fs::create_dir_all(&cfg.root_dir).map_err(io_at(&cfg.root_dir))?;
  let root = cfg.root_dir.canonicalize().map_err(io_at(&cfg.root_dir))?;

  match spec.kind() {
    SpecKind::Binary(files) => install_binary(cfg, pkg, &spec, src_dir, &root, files)?,
    SpecKind::Source(_) => install_from_source(cfg, pkg, &spec, src_dir, &root)?,
  }
  pkg.spec = Some(spec);

  info!(package = %pkg, files = pkg.files.len(), "installed");
  Ok(())
}

/// Load `<dir>/<name>-<version>.rockspec` for a package.
pub fn load_rockspec_for(pkg: &Package, src_dir: &Path) -> Result<Rockspec, InstallError> {
  let path = src_dir.join(format!("{}-{}.rockspec", pkg.name, pkg.version));
  if !path.is_file() {
    return Err(InstallError::MissingRockspec(path));
  }
  load_rockspec_file(&path)
}

/// Load a rockspec from an explicit path.
pub fn load_rockspec_file(path: &Path) -> Result<Rockspec, InstallError> {
  let value = dist_lua::eval_file(path).map_err(|source| InstallError::LoadRockspec {
    path: path.to_path_buf(),
    source,
  })?;
  Rockspec::from_value(&value).map_err(|source| InstallError::BadRockspec {
    path: path.to_path_buf(),
    source,
  })
}

/// Prebuilt package: copy every file to its relative path under the deploy
/// root. The dep-hash suffix is stripped from the recorded version and the
/// build platform is taken from the spec.
fn install_binary(
  cfg: &Config,
  pkg: &mut Package,
  spec: &Rockspec,
  src_dir: &Path,
  root: &Path,
  files: &[String],
) -> Result<(), InstallError> {
  debug!(package = %pkg, "binary package, copying files");

  for file in files {
    let from = src_dir.join(file);
    let to = root.join(file);
    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    fs::copy(&from, &to).map_err(io_at(&from))?;
  }

  pkg.files = files.to_vec();
  pkg.version = pkg.version.without_hash_tag();
  pkg.built_on_platform = spec.description.built_on.clone();

  cleanup_staging(cfg, src_dir);
  Ok(())
}

fn install_from_source(
  cfg: &Config,
  pkg: &mut Package,
  spec: &Rockspec,
  src_dir: &Path,
  root: &Path,
) -> Result<(), InstallError> {
  let variables = build_variables(cfg, spec, root);

  // The package's own CMakeLists wins when it declares a cmake build;
  // otherwise one is generated. Generation failure with no user-provided
  // file is fatal.
  let own_cmakelists = src_dir.join("CMakeLists.txt");
  let uses_own = spec.build.build_type == dist_core::BuildType::Cmake && own_cmakelists.is_file();
  if !uses_own {
    let generated = cmake::generate_cmakelists(spec, false)?;
    fs::write(&own_cmakelists, generated).map_err(io_at(&own_cmakelists))?;
  }

  let build_dir = cfg.temp_dir.join(format!("{}-build", pkg.name));
  fs::create_dir_all(&build_dir).map_err(io_at(&build_dir))?;
  cmake::write_cache_script(&build_dir.join("cache.cmake"), &variables).map_err(io_at(&build_dir))?;

  let src_abs = src_dir.canonicalize().map_err(io_at(src_dir))?;

  let configure = step_command(&cfg.cache_command, &cfg.cache_debug_options, cfg.debug);
  let configure = format!("{} \"{}\"", configure, src_abs.display());
  let out = process::run_command(&configure, &build_dir).map_err(io_at(&build_dir))?;
  if !out.success {
    return Err(InstallError::Configure { output: out.output });
  }

  let build = step_command(&cfg.build_command, &cfg.build_debug_options, cfg.debug);
  let out = process::run_command(&build, &build_dir).map_err(io_at(&build_dir))?;
  if !out.success {
    return Err(InstallError::Build { output: out.output });
  }

  let install = format!("{} --build . --target install", cfg.cmake);
  let out = process::run_command(&install, &build_dir).map_err(io_at(&build_dir))?;
  if !out.success {
    return Err(InstallError::InstallStep { output: out.output });
  }

  pkg.files = read_install_manifest(&build_dir.join("install_manifest.txt"), root)?;
  pkg.built_on_platform = Some(dist_platform::platform_string());

  cleanup_staging(cfg, src_dir);
  cleanup_staging(cfg, &build_dir);
  Ok(())
}

/// Accumulate build variables: config defaults and caller overrides first,
/// then rockspec variables for keys not already set, then the forced
/// install prefix and search paths.
fn build_variables(cfg: &Config, spec: &Rockspec, root: &Path) -> OrderedMap<String> {
  let mut variables = OrderedMap::new();
  for (key, value) in cfg.variables.iter() {
    variables.insert(key.clone(), value.clone());
  }
  for (key, value) in spec.build.variables.iter() {
    if !variables.contains_key(key) {
      variables.insert(key.clone(), value.clone());
    }
  }

  let root_str = root.display().to_string();
  variables.insert("CMAKE_INSTALL_PREFIX", root_str.clone());
  extend_path_var(&mut variables, "CMAKE_INCLUDE_PATH", &format!("{}/include", root_str));
  extend_path_var(&mut variables, "CMAKE_LIBRARY_PATH", &format!("{}/lib", root_str));
  extend_path_var(&mut variables, "CMAKE_PROGRAM_PATH", &format!("{}/bin", root_str));
  variables
}

fn extend_path_var(variables: &mut OrderedMap<String>, key: &str, entry: &str) {
  match variables.get_mut(key) {
    Some(existing) if !existing.is_empty() => {
      existing.push(';');
      existing.push_str(entry);
    }
    _ => {
      variables.insert(key, entry.to_string());
    }
  }
}

fn step_command(base: &str, debug_options: &str, debug: bool) -> String {
  if debug && !debug_options.is_empty() {
    format!("{} {}", base, debug_options)
  } else {
    base.to_string()
  }
}

/// Read the install manifest the build emitted: absolute paths, one per
/// line, converted to paths relative to the deploy root.
fn read_install_manifest(path: &Path, root: &Path) -> Result<Vec<String>, InstallError> {
  let text = fs::read_to_string(path).map_err(|source| InstallError::ManifestUnreadable {
    path: path.to_path_buf(),
    source,
  })?;

  let mut files = Vec::new();
  for line in text.lines() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    match Path::new(line).strip_prefix(root) {
      Ok(relative) => files.push(relative.to_string_lossy().replace('\\', "/")),
      Err(_) => {
        warn!(file = line, root = %root.display(), "installed file outside deploy root, not recorded");
      }
    }
  }
  Ok(files)
}

/// Delete a staging directory under the temp root. Directories outside the
/// temp root (local repositories, `make` working directories) are left
/// alone here; `make` cleans its own directory.
fn cleanup_staging(cfg: &Config, dir: &Path) {
  if !dir.starts_with(&cfg.temp_dir) {
    debug!(dir = %dir.display(), "source outside the temp root, keeping");
    return;
  }
  cleanup(cfg, dir);
}

/// Delete a directory unless debug mode retains it.
pub fn cleanup(cfg: &Config, dir: &Path) {
  if cfg.debug {
    debug!(dir = %dir.display(), "debug mode, keeping directory");
    return;
  }
  if let Err(e) = fs::remove_dir_all(dir) {
    if e.kind() != io::ErrorKind::NotFound {
      warn!(dir = %dir.display(), error = %e, "could not remove directory");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn cfg_at(temp: &TempDir) -> Config {
    let mut cfg = Config::default();
    cfg.set_root_dir(temp.path().join("root"));
    cfg
  }

  fn stage_binary_package(temp: &TempDir) -> (Package, PathBuf) {
    // Under the temp root, like a fetched clone, so cleanup applies.
    let src = temp.path().join("root/tmp").join("xml 1.8.0-1_abcdef1234");
    fs::create_dir_all(src.join("lib/lua")).unwrap();
    fs::write(src.join("lib/lua/xml.lua"), "return {}\n").unwrap();
    fs::write(
      src.join("xml-1.8.0-1_abcdef1234.rockspec"),
      r#"
        package = "xml"
        version = "1.8.0-1_abcdef1234"
        description = { built_on = "x86_64-linux" }
        files = { "lib/lua/xml.lua" }
      "#,
    )
    .unwrap();
    let pkg = Package::new("xml", "1.8.0-1_abcdef1234".parse().unwrap());
    (pkg, src)
  }

  #[test]
  fn binary_package_copies_and_strips_hash() {
    let temp = TempDir::new().unwrap();
    let cfg = cfg_at(&temp);
    let (mut pkg, src) = stage_binary_package(&temp);

    install_package(&cfg, &mut pkg, &src).unwrap();

    assert_eq!(pkg.version.to_string(), "1.8.0-1");
    assert_eq!(pkg.files, ["lib/lua/xml.lua"]);
    assert_eq!(pkg.built_on_platform.as_deref(), Some("x86_64-linux"));
    assert!(cfg.root_dir.join("lib/lua/xml.lua").is_file());
    // Staging is removed on success.
    assert!(!src.exists());
  }

  #[test]
  fn debug_mode_keeps_staging() {
    let temp = TempDir::new().unwrap();
    let mut cfg = cfg_at(&temp);
    cfg.debug = true;
    let (mut pkg, src) = stage_binary_package(&temp);

    install_package(&cfg, &mut pkg, &src).unwrap();
    assert!(src.exists());
  }

  #[test]
  fn missing_rockspec_is_reported() {
    let temp = TempDir::new().unwrap();
    let cfg = cfg_at(&temp);
    let src = temp.path().join("empty");
    fs::create_dir_all(&src).unwrap();

    let mut pkg = Package::new("ghost", "1.0".parse().unwrap());
    let err = install_package(&cfg, &mut pkg, &src).unwrap_err();
    assert!(matches!(err, InstallError::MissingRockspec(_)));
  }

  #[test]
  fn variables_merge_with_caller_precedence() {
    let temp = TempDir::new().unwrap();
    let mut cfg = cfg_at(&temp);
    cfg.variables.insert("LUA_INCLUDE_DIR", "/custom/include".to_string());

    let value = dist_lua::eval_string(
      r#"
        package = "x"
        version = "1.0"
        build = {
          type = "builtin",
          variables = { LUA_INCLUDE_DIR = "/spec/include", EXTRA = "from-spec" },
        }
      "#,
      "spec",
    )
    .unwrap();
    let spec = Rockspec::from_value(&value).unwrap();

    let vars = build_variables(&cfg, &spec, Path::new("/deploy"));
    // Caller override wins; new rockspec keys land.
    assert_eq!(vars.get("LUA_INCLUDE_DIR").map(String::as_str), Some("/custom/include"));
    assert_eq!(vars.get("EXTRA").map(String::as_str), Some("from-spec"));
    assert_eq!(vars.get("CMAKE_INSTALL_PREFIX").map(String::as_str), Some("/deploy"));
    assert_eq!(vars.get("CMAKE_INCLUDE_PATH").map(String::as_str), Some("/deploy/include"));
  }

  #[test]
  fn search_paths_extend_existing_values() {
    let temp = TempDir::new().unwrap();
    let mut cfg = cfg_at(&temp);
    cfg.variables.insert("CMAKE_INCLUDE_PATH", "/opt/include".to_string());

    let spec = Rockspec {
      package: "x".to_string(),
      version: "1.0".to_string(),
      ..Default::default()
    };
    let vars = build_variables(&cfg, &spec, Path::new("/deploy"));
    assert_eq!(
      vars.get("CMAKE_INCLUDE_PATH").map(String::as_str),
      Some("/opt/include;/deploy/include")
    );
  }

  #[test]
  fn install_manifest_paths_become_relative() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    fs::create_dir_all(&root).unwrap();
    let manifest = temp.path().join("install_manifest.txt");
    fs::write(
      &manifest,
      format!(
        "{}/lib/lua/xml.lua\n{}/bin/tool\n/elsewhere/outside\n",
        root.display(),
        root.display()
      ),
    )
    .unwrap();

    let files = read_install_manifest(&manifest, &root).unwrap();
    assert_eq!(files, ["lib/lua/xml.lua", "bin/tool"]);
  }

  #[test]
  fn unreadable_install_manifest_errors() {
    let temp = TempDir::new().unwrap();
    let err = read_install_manifest(&temp.path().join("nope.txt"), temp.path()).unwrap_err();
    assert!(matches!(err, InstallError::ManifestUnreadable { .. }));
  }
}
