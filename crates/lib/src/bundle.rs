//! Static bundling.
//!
//! Assembles a build tree that links every package in the resolved set into
//! one statically linked executable: each package's sources land in a
//! subdirectory with a static-library build file, a top-level
//! `CMakeLists.txt` ties them together, and a generated C shim registers
//! every module in the interpreter's preload table. Nothing is installed;
//! the output is a build tree the user configures and builds.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use dist_core::consts::LUA_PACKAGE;
use dist_core::rockspec::ModuleSpec;
use dist_core::{BuildType, Package, Rockspec};

use crate::cmake;
use crate::install::InstallError;

#[derive(Debug, Error)]
pub enum BundleError {
  /// Sub-step 7a: a package's build file could not be produced.
  #[error("cannot generate build file for '{package}': {reason}")]
  Generate { package: String, reason: String },

  /// Sub-step 7b: the top-level build description could not be written.
  #[error("cannot write bundle CMakeLists.txt: {0}")]
  WriteMain(#[source] io::Error),

  /// Sub-step 7c: the preload shim or variable template could not be
  /// written.
  #[error("cannot write bundle config '{path}': {source}")]
  WriteConfig {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot stage '{package}' into the bundle: {source}")]
  Stage {
    package: String,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Spec(#[from] InstallError),
}

/// One bundled package: its identity, loaded spec, and staged sources.
pub struct BundleInput {
  pub package: Package,
  pub spec: Rockspec,
  pub src_dir: PathBuf,
}

/// Assemble the bundle tree under `dest` from the ordered resolved set.
pub fn bundle_static(inputs: &[BundleInput], dest: &Path) -> Result<(), BundleError> {
  fs::create_dir_all(dest).map_err(BundleError::WriteMain)?;

  let mut subdirs = Vec::new();
  let mut c_targets = Vec::new();
  let mut preload_modules = Vec::new();

  for input in inputs {
    // The interpreter itself is linked through its own build, not preloaded.
    let is_interpreter = input.package.name == LUA_PACKAGE;

    stage_sources(input, dest)?;

    let own_cmake = input.spec.build.build_type == BuildType::Cmake && input.src_dir.join("CMakeLists.txt").is_file();
    if !own_cmake {
      let generated = cmake::generate_cmakelists(&input.spec, true).map_err(|e| BundleError::Generate {
        package: input.package.name.clone(),
        reason: e.to_string(),
      })?;
      let path = dest.join(&input.package.name).join("CMakeLists.txt");
      fs::write(&path, generated).map_err(|source| BundleError::Stage {
        package: input.package.name.clone(),
        source,
      })?;
    }
    subdirs.push(input.package.name.clone());

    if is_interpreter {
      continue;
    }
    for (module, sources) in input.spec.build.modules.iter() {
      if is_c_module(sources) {
        c_targets.push(module.replace('.', "_"));
        preload_modules.push(module.clone());
      }
    }
  }

  write_main_cmakelists(dest, &subdirs, &c_targets)?;
  write_config_template(dest)?;
  write_preload_shim(dest, &preload_modules)?;

  info!(packages = inputs.len(), dest = %dest.display(), "bundle assembled");
  Ok(())
}

fn is_c_module(sources: &ModuleSpec) -> bool {
  !sources.sources().iter().all(|s| s.ends_with(".lua"))
}

/// Copy a package's staged sources into `<dest>/<name>/`.
fn stage_sources(input: &BundleInput, dest: &Path) -> Result<(), BundleError> {
  let target = dest.join(&input.package.name);
  let stage_err = |source| BundleError::Stage {
    package: input.package.name.clone(),
    source,
  };

  for entry in walkdir::WalkDir::new(&input.src_dir).min_depth(1) {
    let entry = entry.map_err(|e| stage_err(e.into()))?;
    let relative = match entry.path().strip_prefix(&input.src_dir) {
      Ok(r) => r.to_path_buf(),
      Err(_) => continue,
    };
    // skip VCS metadata
    if relative.starts_with(".git") {
      continue;
    }
    let to = target.join(&relative);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&to).map_err(stage_err)?;
    } else {
      if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(stage_err)?;
      }
      fs::copy(entry.path(), &to).map_err(stage_err)?;
    }
  }
  debug!(package = %input.package, dir = %target.display(), "staged into bundle");
  Ok(())
}

fn write_main_cmakelists(dest: &Path, subdirs: &[String], c_targets: &[String]) -> Result<(), BundleError> {
  let mut out = String::new();
  out.push_str("cmake_minimum_required(VERSION 3.5)\n");
  out.push_str("project(dist_bundle C)\n\n");
  out.push_str("include(dist.cmake)\n\n");
  for subdir in subdirs {
    out.push_str(&format!("add_subdirectory(\"{}\")\n", subdir));
  }
  out.push('\n');
  out.push_str("add_executable(dist_main dist_preload.c)\n");
  if !c_targets.is_empty() {
    out.push_str(&format!("target_link_libraries(dist_main {})\n", c_targets.join(" ")));
  }
  out.push_str("target_link_libraries(dist_main liblua)\n");

  fs::write(dest.join("CMakeLists.txt"), out).map_err(BundleError::WriteMain)
}

/// Shared variable template every subdirectory build includes.
fn write_config_template(dest: &Path) -> Result<(), BundleError> {
  let path = dest.join("dist.cmake");
  let mut out = String::new();
  out.push_str("# Common settings for statically bundled packages.\n");
  out.push_str("set(BUILD_SHARED_LIBS OFF)\n");
  out.push_str("set(CMAKE_POSITION_INDEPENDENT_CODE ON)\n");
  out.push_str("include_directories(${CMAKE_SOURCE_DIR}/lua/src)\n");
  fs::write(&path, out).map_err(|source| BundleError::WriteConfig { path, source })
}

/// The C shim: declares `luaopen_` entry points (module dots become
/// underscores) and registers each under its dotted name in
/// `package.preload`, then runs the interpreter's standard entry.
fn write_preload_shim(dest: &Path, modules: &[String]) -> Result<(), BundleError> {
  let mut out = String::new();
  out.push_str("#include <lua.h>\n");
  out.push_str("#include <lualib.h>\n");
  out.push_str("#include <lauxlib.h>\n\n");

  for module in modules {
    out.push_str(&format!("int luaopen_{}(lua_State *L);\n", module.replace('.', "_")));
  }
  out.push('\n');

  out.push_str("static void dist_register_preloads(lua_State *L) {\n");
  out.push_str("  luaL_getsubtable(L, LUA_REGISTRYINDEX, \"_PRELOAD\");\n");
  for module in modules {
    out.push_str(&format!(
      "  lua_pushcfunction(L, luaopen_{});\n  lua_setfield(L, -2, \"{}\");\n",
      module.replace('.', "_"),
      module
    ));
  }
  out.push_str("  lua_pop(L, 1);\n");
  out.push_str("}\n\n");

  out.push_str("int main(int argc, char **argv) {\n");
  out.push_str("  lua_State *L = luaL_newstate();\n");
  out.push_str("  luaL_openlibs(L);\n");
  out.push_str("  dist_register_preloads(L);\n");
  out.push_str("  int status = 0;\n");
  out.push_str("  if (argc > 1) {\n");
  out.push_str("    status = luaL_dofile(L, argv[1]);\n");
  out.push_str("    if (status != LUA_OK) {\n");
  out.push_str("      fprintf(stderr, \"%s\\n\", lua_tostring(L, -1));\n");
  out.push_str("    }\n");
  out.push_str("  }\n");
  out.push_str("  lua_close(L);\n");
  out.push_str("  return status;\n");
  out.push_str("}\n");

  let out = format!("#include <stdio.h>\n{}", out);
  let path = dest.join("dist_preload.c");
  fs::write(&path, out).map_err(|source| BundleError::WriteConfig { path, source })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn input(temp: &TempDir, name: &str, version: &str, spec_text: &str) -> BundleInput {
    let src_dir = temp.path().join("stage").join(name);
    fs::create_dir_all(src_dir.join("src")).unwrap();
    fs::write(src_dir.join("src/module.c"), "/* c source */\n").unwrap();

    let value = dist_lua::eval_string(spec_text, "spec").unwrap();
    BundleInput {
      package: Package::new(name, version.parse().unwrap()),
      spec: Rockspec::from_value(&value).unwrap(),
      src_dir,
    }
  }

  fn socket_input(temp: &TempDir) -> BundleInput {
    input(
      temp,
      "socket",
      "3.0-1",
      r#"
        package = "socket"
        version = "3.0-1"
        build = { type = "builtin", modules = { ["socket.core"] = { "src/module.c" } } }
      "#,
    )
  }

  #[test]
  fn bundle_tree_has_all_parts() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("bundle");
    bundle_static(&[socket_input(&temp)], &dest).unwrap();

    assert!(dest.join("CMakeLists.txt").is_file());
    assert!(dest.join("dist.cmake").is_file());
    assert!(dest.join("dist_preload.c").is_file());
    assert!(dest.join("socket/CMakeLists.txt").is_file());
    assert!(dest.join("socket/src/module.c").is_file());
  }

  #[test]
  fn main_cmakelists_links_static_targets() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("bundle");
    bundle_static(&[socket_input(&temp)], &dest).unwrap();

    let main = fs::read_to_string(dest.join("CMakeLists.txt")).unwrap();
    assert!(main.contains("add_subdirectory(\"socket\")"));
    assert!(main.contains("add_executable(dist_main dist_preload.c)"));
    assert!(main.contains("target_link_libraries(dist_main socket_core)"));
  }

  #[test]
  fn preload_shim_registers_dotted_names() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("bundle");
    bundle_static(&[socket_input(&temp)], &dest).unwrap();

    let shim = fs::read_to_string(dest.join("dist_preload.c")).unwrap();
    assert!(shim.contains("int luaopen_socket_core(lua_State *L);"));
    assert!(shim.contains("lua_pushcfunction(L, luaopen_socket_core);"));
    assert!(shim.contains("lua_setfield(L, -2, \"socket.core\");"));
  }

  #[test]
  fn pure_lua_packages_are_not_preloaded() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("bundle");
    let xml = input(
      &temp,
      "xml",
      "1.8.0-1",
      r#"
        package = "xml"
        version = "1.8.0-1"
        build = { type = "builtin", modules = { xml = "xml.lua" } }
      "#,
    );
    bundle_static(&[xml], &dest).unwrap();

    let shim = fs::read_to_string(dest.join("dist_preload.c")).unwrap();
    assert!(!shim.contains("luaopen_xml"));
  }

  #[test]
  fn git_metadata_is_not_staged() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("bundle");
    let socket = socket_input(&temp);
    fs::create_dir_all(socket.src_dir.join(".git")).unwrap();
    fs::write(socket.src_dir.join(".git/HEAD"), "ref: refs/heads/master\n").unwrap();

    bundle_static(&[socket], &dest).unwrap();
    assert!(!dest.join("socket/.git").exists());
  }
}
