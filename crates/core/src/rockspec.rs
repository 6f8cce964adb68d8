//! The rockspec package descriptor.
//!
//! A rockspec is a structured record with a closed set of recognized fields.
//! Source rockspecs carry a build recipe; binary rockspecs (re-exported by
//! `pack`) instead carry the list of installed files, which short-circuits
//! the build entirely.

use std::fmt;

use thiserror::Error;

use crate::ordmap::OrderedMap;
use crate::value::Value;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RockspecError {
  #[error("rockspec is not a table")]
  NotATable,

  #[error("unknown rockspec field '{0}'")]
  UnknownField(String),

  #[error("missing rockspec field '{0}'")]
  MissingField(&'static str),

  #[error("rockspec field '{field}' should be a {expected}, got {got}")]
  TypeMismatch {
    field: String,
    expected: &'static str,
    got: &'static str,
  },

  #[error("unknown build type '{0}'")]
  UnknownBuildType(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Source {
  pub url: Option<String>,
  pub tag: Option<String>,
  pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Description {
  pub summary: Option<String>,
  pub homepage: Option<String>,
  pub license: Option<String>,
  /// Platform a binary rockspec was built on.
  pub built_on: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
  Cmake,
  #[default]
  Builtin,
  None,
}

impl BuildType {
  fn parse(s: &str) -> Result<BuildType, RockspecError> {
    match s {
      "cmake" => Ok(BuildType::Cmake),
      "builtin" => Ok(BuildType::Builtin),
      "none" => Ok(BuildType::None),
      other => Err(RockspecError::UnknownBuildType(other.to_string())),
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      BuildType::Cmake => "cmake",
      BuildType::Builtin => "builtin",
      BuildType::None => "none",
    }
  }
}

impl fmt::Display for BuildType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One module of a builtin build: a single source file or a list of them.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleSpec {
  Source(String),
  Sources(Vec<String>),
}

impl ModuleSpec {
  pub fn sources(&self) -> Vec<&str> {
    match self {
      ModuleSpec::Source(s) => vec![s.as_str()],
      ModuleSpec::Sources(list) => list.iter().map(String::as_str).collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Build {
  pub build_type: BuildType,
  /// CMake-style variables, lowest precedence in the installer's merge.
  pub variables: OrderedMap<String>,
  /// Module name → sources, for builtin builds.
  pub modules: OrderedMap<ModuleSpec>,
  /// Install tree kind (`lua`, `bin`, `conf`, …) → file list.
  pub install: OrderedMap<Vec<String>>,
}

/// View selecting the installer's path for a package.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecKind<'a> {
  /// Prebuilt artifact: copy `files`, no build.
  Binary(&'a [String]),
  /// Source package: translate and drive a native build.
  Source(&'a Build),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rockspec {
  pub package: String,
  pub version: String,
  pub source: Source,
  pub description: Description,
  pub dependencies: Vec<String>,
  pub supported_platforms: Vec<String>,
  pub build: Build,
  /// Present only for already-built binary packages.
  pub files: Option<Vec<String>>,
}

impl Rockspec {
  pub fn kind(&self) -> SpecKind<'_> {
    match &self.files {
      Some(files) => SpecKind::Binary(files),
      None => SpecKind::Source(&self.build),
    }
  }

  /// Parse from the evaluated table form, rejecting fields outside the
  /// recognized enumeration.
  pub fn from_value(value: &Value) -> Result<Rockspec, RockspecError> {
    let table = value.as_table().ok_or(RockspecError::NotATable)?;
    let mut spec = Rockspec::default();

    for (key, field) in table.iter() {
      match key.as_str() {
        "package" => spec.package = str_field(field, "package")?,
        "version" => spec.version = str_field(field, "version")?,
        "source" => spec.source = parse_source(field)?,
        "description" => spec.description = parse_description(field)?,
        "dependencies" => spec.dependencies = str_list(field, "dependencies")?,
        "supported_platforms" => spec.supported_platforms = str_list(field, "supported_platforms")?,
        "build" => spec.build = parse_build(field)?,
        "files" => spec.files = Some(str_list(field, "files")?),
        other => return Err(RockspecError::UnknownField(other.to_string())),
      }
    }

    if spec.package.is_empty() {
      return Err(RockspecError::MissingField("package"));
    }
    if spec.version.is_empty() {
      return Err(RockspecError::MissingField("version"));
    }
    Ok(spec)
  }

  /// Render back to the table form written to disk. Field order is the
  /// conventional rockspec order regardless of how the spec was loaded.
  pub fn to_value(&self) -> Value {
    let mut top = OrderedMap::new();
    top.insert("package", Value::from(self.package.clone()));
    top.insert("version", Value::from(self.version.clone()));

    let mut source = OrderedMap::new();
    if let Some(url) = &self.source.url {
      source.insert("url", Value::from(url.clone()));
    }
    if let Some(tag) = &self.source.tag {
      source.insert("tag", Value::from(tag.clone()));
    }
    if let Some(branch) = &self.source.branch {
      source.insert("branch", Value::from(branch.clone()));
    }
    if !source.is_empty() {
      top.insert("source", Value::Table(source));
    }

    let mut description = OrderedMap::new();
    if let Some(summary) = &self.description.summary {
      description.insert("summary", Value::from(summary.clone()));
    }
    if let Some(homepage) = &self.description.homepage {
      description.insert("homepage", Value::from(homepage.clone()));
    }
    if let Some(license) = &self.description.license {
      description.insert("license", Value::from(license.clone()));
    }
    if let Some(built_on) = &self.description.built_on {
      description.insert("built_on", Value::from(built_on.clone()));
    }
    if !description.is_empty() {
      top.insert("description", Value::Table(description));
    }

    if !self.supported_platforms.is_empty() {
      top.insert("supported_platforms", Value::from(self.supported_platforms.clone()));
    }
    if !self.dependencies.is_empty() {
      top.insert("dependencies", Value::from(self.dependencies.clone()));
    }

    match &self.files {
      Some(files) => {
        top.insert("files", Value::from(files.clone()));
      }
      None => {
        let mut build = OrderedMap::new();
        build.insert("type", Value::from(self.build.build_type.as_str()));
        if !self.build.variables.is_empty() {
          let mut vars = OrderedMap::new();
          for (k, v) in self.build.variables.iter() {
            vars.insert(k.clone(), Value::from(v.clone()));
          }
          build.insert("variables", Value::Table(vars));
        }
        if !self.build.modules.is_empty() {
          let mut modules = OrderedMap::new();
          for (name, spec) in self.build.modules.iter() {
            let v = match spec {
              ModuleSpec::Source(s) => Value::from(s.clone()),
              ModuleSpec::Sources(list) => Value::from(list.clone()),
            };
            modules.insert(name.clone(), v);
          }
          build.insert("modules", Value::Table(modules));
        }
        if !self.build.install.is_empty() {
          let mut install = OrderedMap::new();
          for (kind, files) in self.build.install.iter() {
            install.insert(kind.clone(), Value::from(files.clone()));
          }
          build.insert("install", Value::Table(install));
        }
        top.insert("build", Value::Table(build));
      }
    }

    Value::Table(top)
  }
}

fn mismatch(field: &str, expected: &'static str, got: &Value) -> RockspecError {
  RockspecError::TypeMismatch {
    field: field.to_string(),
    expected,
    got: got.type_name(),
  }
}

fn str_field(value: &Value, field: &str) -> Result<String, RockspecError> {
  value
    .as_str()
    .map(str::to_string)
    .ok_or_else(|| mismatch(field, "string", value))
}

fn str_list(value: &Value, field: &str) -> Result<Vec<String>, RockspecError> {
  let items = value.as_list().ok_or_else(|| mismatch(field, "list", value))?;
  items
    .iter()
    .map(|item| {
      item
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(field, "list of strings", item))
    })
    .collect()
}

fn parse_source(value: &Value) -> Result<Source, RockspecError> {
  let table = value.as_table().ok_or_else(|| mismatch("source", "table", value))?;
  let mut source = Source::default();
  for (key, field) in table.iter() {
    match key.as_str() {
      "url" => source.url = Some(str_field(field, "source.url")?),
      "tag" => source.tag = Some(str_field(field, "source.tag")?),
      "branch" => source.branch = Some(str_field(field, "source.branch")?),
      other => return Err(RockspecError::UnknownField(format!("source.{}", other))),
    }
  }
  Ok(source)
}

fn parse_description(value: &Value) -> Result<Description, RockspecError> {
  let table = value.as_table().ok_or_else(|| mismatch("description", "table", value))?;
  let mut description = Description::default();
  for (key, field) in table.iter() {
    match key.as_str() {
      "summary" => description.summary = Some(str_field(field, "description.summary")?),
      "homepage" => description.homepage = Some(str_field(field, "description.homepage")?),
      "license" => description.license = Some(str_field(field, "description.license")?),
      "built_on" => description.built_on = Some(str_field(field, "description.built_on")?),
      other => return Err(RockspecError::UnknownField(format!("description.{}", other))),
    }
  }
  Ok(description)
}

fn parse_build(value: &Value) -> Result<Build, RockspecError> {
  let table = value.as_table().ok_or_else(|| mismatch("build", "table", value))?;
  let mut build = Build::default();
  for (key, field) in table.iter() {
    match key.as_str() {
      "type" => build.build_type = BuildType::parse(&str_field(field, "build.type")?)?,
      "variables" => {
        let vars = field
          .as_table()
          .ok_or_else(|| mismatch("build.variables", "table", field))?;
        for (name, v) in vars.iter() {
          build.variables.insert(name.clone(), variable_string(name, v)?);
        }
      }
      "modules" => {
        let modules = field.as_table().ok_or_else(|| mismatch("build.modules", "table", field))?;
        for (name, v) in modules.iter() {
          let spec = match v {
            Value::Str(s) => ModuleSpec::Source(s.clone()),
            Value::List(_) => ModuleSpec::Sources(str_list(v, "build.modules")?),
            other => return Err(mismatch(&format!("build.modules.{}", name), "string or list", other)),
          };
          build.modules.insert(name.clone(), spec);
        }
      }
      "install" => {
        let install = field.as_table().ok_or_else(|| mismatch("build.install", "table", field))?;
        for (kind, v) in install.iter() {
          build
            .install
            .insert(kind.clone(), str_list(v, &format!("build.install.{}", kind))?);
        }
      }
      other => return Err(RockspecError::UnknownField(format!("build.{}", other))),
    }
  }
  Ok(build)
}

fn variable_string(name: &str, value: &Value) -> Result<String, RockspecError> {
  match value {
    Value::Str(s) => Ok(s.clone()),
    Value::Bool(b) => Ok(if *b { "ON" } else { "OFF" }.to_string()),
    Value::Int(n) => Ok(n.to_string()),
    Value::Num(n) => Ok(n.to_string()),
    other => Err(mismatch(
      &format!("build.variables.{}", name),
      "string, number or boolean",
      other,
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(entries: Vec<(&str, Value)>) -> Value {
    let mut t = OrderedMap::new();
    for (k, v) in entries {
      t.insert(k, v);
    }
    Value::Table(t)
  }

  fn source_spec() -> Value {
    table(vec![
      ("package", Value::from("xml")),
      ("version", Value::from("1.8.0-1")),
      (
        "source",
        table(vec![
          ("url", Value::from("git://github.com/LuaDist2/xml.git")),
          ("tag", Value::from("1.8.0-1")),
        ]),
      ),
      ("dependencies", Value::from(vec!["lua >= 5.1".to_string()])),
      (
        "build",
        table(vec![
          ("type", Value::from("builtin")),
          ("modules", table(vec![("xml", Value::from("xml.lua"))])),
        ]),
      ),
    ])
  }

  #[test]
  fn parses_source_rockspec() {
    let spec = Rockspec::from_value(&source_spec()).unwrap();
    assert_eq!(spec.package, "xml");
    assert_eq!(spec.version, "1.8.0-1");
    assert_eq!(spec.source.url.as_deref(), Some("git://github.com/LuaDist2/xml.git"));
    assert_eq!(spec.dependencies, ["lua >= 5.1"]);
    assert_eq!(spec.build.build_type, BuildType::Builtin);
    assert!(matches!(spec.kind(), SpecKind::Source(_)));
    assert_eq!(spec.build.modules.get("xml").unwrap().sources(), ["xml.lua"]);
  }

  #[test]
  fn binary_files_select_binary_kind() {
    let spec = Rockspec::from_value(&table(vec![
      ("package", Value::from("xml")),
      ("version", Value::from("1.8.0-1_abcdef1234")),
      ("files", Value::from(vec!["lib/lua/xml.lua".to_string()])),
      (
        "description",
        table(vec![("built_on", Value::from("x86_64-linux"))]),
      ),
    ]))
    .unwrap();
    match spec.kind() {
      SpecKind::Binary(files) => assert_eq!(files, ["lib/lua/xml.lua"]),
      SpecKind::Source(_) => panic!("expected binary kind"),
    }
    assert_eq!(spec.description.built_on.as_deref(), Some("x86_64-linux"));
  }

  #[test]
  fn unknown_field_is_rejected() {
    let err = Rockspec::from_value(&table(vec![
      ("package", Value::from("x")),
      ("version", Value::from("1.0")),
      ("prankster", Value::from("nope")),
    ]))
    .unwrap_err();
    assert_eq!(err, RockspecError::UnknownField("prankster".to_string()));

    let err = Rockspec::from_value(&table(vec![
      ("package", Value::from("x")),
      ("version", Value::from("1.0")),
      ("source", table(vec![("md5", Value::from("feedface"))])),
    ]))
    .unwrap_err();
    assert_eq!(err, RockspecError::UnknownField("source.md5".to_string()));
  }

  #[test]
  fn missing_identity_is_rejected() {
    let err = Rockspec::from_value(&table(vec![("package", Value::from("x"))])).unwrap_err();
    assert_eq!(err, RockspecError::MissingField("version"));
  }

  #[test]
  fn unknown_build_type_is_rejected() {
    let err = Rockspec::from_value(&table(vec![
      ("package", Value::from("x")),
      ("version", Value::from("1.0")),
      ("build", table(vec![("type", Value::from("make"))])),
    ]))
    .unwrap_err();
    assert_eq!(err, RockspecError::UnknownBuildType("make".to_string()));
  }

  #[test]
  fn value_round_trip_preserves_fields() {
    let spec = Rockspec::from_value(&source_spec()).unwrap();
    let again = Rockspec::from_value(&spec.to_value()).unwrap();
    assert_eq!(again, spec);
  }

  #[test]
  fn boolean_variables_render_as_cmake_switches() {
    let spec = Rockspec::from_value(&table(vec![
      ("package", Value::from("x")),
      ("version", Value::from("1.0")),
      (
        "build",
        table(vec![
          ("type", Value::from("cmake")),
          ("variables", table(vec![("BUILD_SHARED_LIBS", Value::Bool(false))])),
        ]),
      ),
    ]))
    .unwrap();
    assert_eq!(spec.build.variables.get("BUILD_SHARED_LIBS").map(String::as_str), Some("OFF"));
  }
}
