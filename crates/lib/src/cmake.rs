//! Rockspec to CMake translation.
//!
//! Packages with `build.type == "cmake"` ship their own `CMakeLists.txt`;
//! everything else gets one generated here. Builtin builds install pure-Lua
//! modules as files and compile C modules as loadable libraries; the static
//! variant used by the bundler compiles C modules as static archives
//! instead, for linking into one executable.

use std::io;
use std::path::Path;

use thiserror::Error;

use dist_core::rockspec::ModuleSpec;
use dist_core::{BuildType, OrderedMap, Rockspec};

#[derive(Debug, Error)]
pub enum CmakeError {
  #[error("package '{package}' declares build type 'cmake' but ships no CMakeLists.txt")]
  MissingCmakeLists { package: String },

  #[error("module '{module}' of '{package}' has no sources")]
  EmptyModule { package: String, module: String },
}

/// Destination variables the generated file defines, relative to the
/// install prefix.
const DEST_VARS: &[(&str, &str, &str)] = &[
  ("INSTALL_LMOD", "lib/lua", "Directory for Lua modules"),
  ("INSTALL_CMOD", "lib/lua", "Directory for binary Lua modules"),
  ("INSTALL_BIN", "bin", "Directory for executables"),
  ("INSTALL_INC", "include", "Directory for headers"),
  ("INSTALL_CONF", "etc", "Directory for configuration"),
];

/// Generate a `CMakeLists.txt` for a rockspec without one of its own.
///
/// `static_libs` switches C modules from `MODULE` (loadable) to `STATIC`
/// archives and drops install rules; the static bundler links the archives
/// itself.
pub fn generate_cmakelists(spec: &Rockspec, static_libs: bool) -> Result<String, CmakeError> {
  if spec.build.build_type == BuildType::Cmake {
    // A spec that insists on its own build must provide it.
    return Err(CmakeError::MissingCmakeLists {
      package: spec.package.clone(),
    });
  }

  let mut out = String::new();
  out.push_str("cmake_minimum_required(VERSION 3.5)\n");
  out.push_str(&format!("project({} C)\n\n", cmake_identifier(&spec.package)));

  for (name, default, doc) in DEST_VARS {
    out.push_str(&format!("set({} {} CACHE PATH \"{}\")\n", name, default, doc));
  }
  out.push('\n');

  if spec.build.build_type == BuildType::Builtin {
    for (module, sources) in spec.build.modules.iter() {
      emit_module(&mut out, &spec.package, module, sources, static_libs)?;
    }
  }

  if !static_libs {
    for (kind, files) in spec.build.install.iter() {
      emit_install_rule(&mut out, kind, files);
    }
  }

  Ok(out)
}

fn emit_module(
  out: &mut String,
  package: &str,
  module: &str,
  sources: &ModuleSpec,
  static_libs: bool,
) -> Result<(), CmakeError> {
  let sources = sources.sources();
  if sources.is_empty() {
    return Err(CmakeError::EmptyModule {
      package: package.to_string(),
      module: module.to_string(),
    });
  }

  let pure_lua = sources.iter().all(|s| s.ends_with(".lua"));
  if pure_lua {
    if static_libs {
      // Lua-only modules have no object code to link; the bundle carries
      // them alongside the executable.
      return Ok(());
    }
    let (subdir, leaf) = split_module(module);
    for source in sources {
      out.push_str(&format!(
        "install(FILES {} DESTINATION ${{INSTALL_LMOD}}{} RENAME {}.lua)\n",
        source, subdir, leaf
      ));
    }
    return Ok(());
  }

  let target = cmake_identifier(module);
  let kind = if static_libs { "STATIC" } else { "MODULE" };
  out.push_str(&format!("add_library({} {} {})\n", target, kind, sources.join(" ")));
  let (subdir, leaf) = split_module(module);
  out.push_str(&format!(
    "set_target_properties({} PROPERTIES PREFIX \"\" OUTPUT_NAME {})\n",
    target, leaf
  ));
  if !static_libs {
    out.push_str(&format!(
      "install(TARGETS {} DESTINATION ${{INSTALL_CMOD}}{})\n",
      target, subdir
    ));
  }
  Ok(())
}

fn emit_install_rule(out: &mut String, kind: &str, files: &[String]) {
  if files.is_empty() {
    return;
  }
  let (directive, dest) = match kind {
    "lua" => ("FILES", "${INSTALL_LMOD}".to_string()),
    "bin" => ("PROGRAMS", "${INSTALL_BIN}".to_string()),
    "inc" => ("FILES", "${INSTALL_INC}".to_string()),
    "conf" => ("FILES", "${INSTALL_CONF}".to_string()),
    other => ("FILES", other.to_string()),
  };
  out.push_str(&format!(
    "install({} {} DESTINATION {})\n",
    directive,
    files.join(" "),
    dest
  ));
}

/// `socket.http` → subdirectory `/socket`, leaf `http`.
fn split_module(module: &str) -> (String, &str) {
  match module.rsplit_once('.') {
    Some((dirs, leaf)) => (format!("/{}", dirs.replace('.', "/")), leaf),
    None => (String::new(), module),
  }
}

/// Module or package name as a CMake identifier: dots become underscores.
fn cmake_identifier(name: &str) -> String {
  name.replace(['.', '-'], "_")
}

/// Write the variable cache script the configure step reads: one
/// `SET(K "V" CACHE STRING "" FORCE)` per variable, path separators
/// normalized to forward slashes.
pub fn write_cache_script(path: &Path, variables: &OrderedMap<String>) -> io::Result<()> {
  let mut out = String::new();
  for (key, value) in variables.iter() {
    out.push_str(&format!(
      "SET({} \"{}\" CACHE STRING \"\" FORCE)\n",
      key,
      cache_quote(value)
    ));
  }
  std::fs::write(path, out)
}

fn cache_quote(value: &str) -> String {
  value.replace('\\', "/").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec_from(source: &str) -> Rockspec {
    let value = dist_lua::eval_string(source, "test.rockspec").unwrap();
    Rockspec::from_value(&value).unwrap()
  }

  #[test]
  fn pure_lua_module_installs_files() {
    let spec = spec_from(
      r#"
        package = "xml"
        version = "1.8.0-1"
        build = { type = "builtin", modules = { xml = "xml.lua" } }
      "#,
    );
    let text = generate_cmakelists(&spec, false).unwrap();
    assert!(text.contains("install(FILES xml.lua DESTINATION ${INSTALL_LMOD} RENAME xml.lua)"));
    assert!(!text.contains("add_library"));
  }

  #[test]
  fn dotted_module_lands_in_subdirectory() {
    let spec = spec_from(
      r#"
        package = "socket"
        version = "3.0-1"
        build = { type = "builtin", modules = { ["socket.http"] = "src/http.lua" } }
      "#,
    );
    let text = generate_cmakelists(&spec, false).unwrap();
    assert!(text.contains("DESTINATION ${INSTALL_LMOD}/socket RENAME http.lua"));
  }

  #[test]
  fn c_module_becomes_loadable_library() {
    let spec = spec_from(
      r#"
        package = "socket"
        version = "3.0-1"
        build = {
          type = "builtin",
          modules = { ["socket.core"] = { "src/luasocket.c", "src/timeout.c" } },
        }
      "#,
    );
    let text = generate_cmakelists(&spec, false).unwrap();
    assert!(text.contains("add_library(socket_core MODULE src/luasocket.c src/timeout.c)"));
    assert!(text.contains("OUTPUT_NAME core"));
    assert!(text.contains("install(TARGETS socket_core DESTINATION ${INSTALL_CMOD}/socket)"));
  }

  #[test]
  fn static_mode_builds_archives_without_install() {
    let spec = spec_from(
      r#"
        package = "socket"
        version = "3.0-1"
        build = { type = "builtin", modules = { ["socket.core"] = { "src/luasocket.c" } } }
      "#,
    );
    let text = generate_cmakelists(&spec, true).unwrap();
    assert!(text.contains("add_library(socket_core STATIC src/luasocket.c)"));
    assert!(!text.contains("install("));
  }

  #[test]
  fn install_section_maps_destinations() {
    let spec = spec_from(
      r#"
        package = "tool"
        version = "1.0"
        build = {
          type = "builtin",
          install = { bin = { "bin/tool" }, conf = { "tool.conf" } },
        }
      "#,
    );
    let text = generate_cmakelists(&spec, false).unwrap();
    assert!(text.contains("install(PROGRAMS bin/tool DESTINATION ${INSTALL_BIN})"));
    assert!(text.contains("install(FILES tool.conf DESTINATION ${INSTALL_CONF})"));
  }

  #[test]
  fn cmake_type_refuses_generation() {
    let spec = spec_from(
      r#"
        package = "md5"
        version = "1.2"
        build = { type = "cmake" }
      "#,
    );
    let err = generate_cmakelists(&spec, false).unwrap_err();
    assert!(matches!(err, CmakeError::MissingCmakeLists { package } if package == "md5"));
  }

  #[test]
  fn cache_script_quotes_and_normalizes() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("cache.cmake");
    let mut vars = OrderedMap::new();
    vars.insert("CMAKE_INSTALL_PREFIX", "C:\\dist\\root".to_string());
    vars.insert("LUA_INCLUDE_DIR", "/root/include".to_string());
    write_cache_script(&path, &vars).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
      lines[0],
      "SET(CMAKE_INSTALL_PREFIX \"C:/dist/root\" CACHE STRING \"\" FORCE)"
    );
    assert_eq!(lines[1], "SET(LUA_INCLUDE_DIR \"/root/include\" CACHE STRING \"\" FORCE)");
  }

  #[test]
  fn empty_module_is_rejected() {
    let spec = spec_from(
      r#"
        package = "bad"
        version = "1.0"
        build = { type = "builtin", modules = { bad = {} } }
      "#,
    );
    let err = generate_cmakelists(&spec, false).unwrap_err();
    assert!(matches!(err, CmakeError::EmptyModule { module, .. } if module == "bad"));
  }
}
