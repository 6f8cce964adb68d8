//! Restricted evaluation of Lua descriptors.
//!
//! A descriptor file is either a chunk that returns a table (`return { … }`,
//! the manifest style) or a sequence of global assignments (`package = …`,
//! the rockspec style). Both run against an empty environment in a fresh VM;
//! whichever table results is converted to `dist_core::Value`, rejecting
//! functions, userdata, and coroutines wherever they appear.

use std::path::Path;

use mlua::{Lua, Table as LuaTable, Value as MluaValue};

use dist_core::{OrderedMap, Value};

use crate::error::LuaError;

/// Evaluate a descriptor file. A leading shebang line is stripped.
pub fn eval_file(path: &Path) -> Result<Value, LuaError> {
  let source = std::fs::read_to_string(path).map_err(|source| LuaError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let name = path.display().to_string();
  eval_string(&source, &name)
}

/// Evaluate descriptor source text. `chunk_name` is used in Lua error
/// locations only.
pub fn eval_string(source: &str, chunk_name: &str) -> Result<Value, LuaError> {
  let source = strip_shebang(source);

  let lua = Lua::new();
  let env = lua.create_table()?;
  let returned: MluaValue = lua
    .load(source)
    .set_name(chunk_name)
    .set_environment(env.clone())
    .eval()?;

  match returned {
    MluaValue::Table(table) => convert_table(&table, "<result>"),
    MluaValue::Nil => convert_table(&env, "<globals>"),
    other => Err(LuaError::NotATable(lua_type_name(&other))),
  }
}

fn strip_shebang(source: &str) -> &str {
  match source.strip_prefix("#!") {
    Some(rest) => rest.split_once('\n').map(|(_, tail)| tail).unwrap_or(""),
    None => source,
  }
}

fn convert(value: &MluaValue, at: &str) -> Result<Value, LuaError> {
  match value {
    MluaValue::Boolean(b) => Ok(Value::Bool(*b)),
    MluaValue::Integer(n) => Ok(Value::Int(*n)),
    MluaValue::Number(n) => Ok(Value::Num(*n)),
    MluaValue::String(s) => Ok(Value::Str(s.to_string_lossy().to_string())),
    MluaValue::Table(t) => convert_table(t, at),
    MluaValue::Function(_) | MluaValue::Thread(_) => Err(LuaError::ExecutableContent(at.to_string())),
    _ => Err(LuaError::ExecutableContent(at.to_string())),
  }
}

/// Convert a Lua table. Integer-keyed tables become lists ordered by index;
/// string-keyed tables become maps with keys sorted for determinism (Lua
/// iteration order is hash order). Mixed keys are rejected.
fn convert_table(table: &LuaTable, at: &str) -> Result<Value, LuaError> {
  let mut list_items: Vec<(i64, Value)> = Vec::new();
  let mut map_items: Vec<(String, Value)> = Vec::new();

  // Tables are cheap handles; iteration consumes one.
  for pair in table.clone().pairs::<MluaValue, MluaValue>() {
    let (key, value) = pair?;
    match key {
      MluaValue::Integer(i) if i >= 1 => {
        let at = format!("{}[{}]", at, i);
        list_items.push((i, convert(&value, &at)?));
      }
      MluaValue::String(s) => {
        let key = s.to_string_lossy().to_string();
        let at = format!("{}.{}", at, key);
        map_items.push((key, convert(&value, &at)?));
      }
      _ => return Err(LuaError::BadKey(at.to_string())),
    }
  }

  match (list_items.is_empty(), map_items.is_empty()) {
    // Empty tables read as empty lists; every consumer of an optional
    // list-or-absent field treats the two alike.
    (true, true) => Ok(Value::List(Vec::new())),
    (false, true) => {
      list_items.sort_by_key(|(i, _)| *i);
      Ok(Value::List(list_items.into_iter().map(|(_, v)| v).collect()))
    }
    (true, false) => {
      map_items.sort_by(|(a, _), (b, _)| a.cmp(b));
      let mut map = OrderedMap::new();
      for (k, v) in map_items {
        map.insert(k, v);
      }
      Ok(Value::Table(map))
    }
    (false, false) => Err(LuaError::BadKey(at.to_string())),
  }
}

fn lua_type_name(value: &MluaValue) -> &'static str {
  match value {
    MluaValue::Boolean(_) => "boolean",
    MluaValue::Integer(_) | MluaValue::Number(_) => "number",
    MluaValue::String(_) => "string",
    MluaValue::Function(_) => "function",
    _ => "value",
  }
}
