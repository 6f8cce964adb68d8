//! Pretty-printing values back to Lua table text.
//!
//! Output is deterministic: tables render in their `OrderedMap` order, one
//! entry per line, trailing commas throughout. `to_lua_module` wraps the
//! value in a `return` statement, the form every descriptor file on disk
//! uses.

use dist_core::Value;

/// Render a value as a Lua literal.
pub fn to_lua(value: &Value) -> String {
  let mut out = String::new();
  write_value(&mut out, value, 0);
  out
}

/// Render a value as a loadable Lua module: `return <literal>\n`.
pub fn to_lua_module(value: &Value) -> String {
  format!("return {}\n", to_lua(value))
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
  match value {
    Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    Value::Int(n) => out.push_str(&n.to_string()),
    Value::Num(n) => out.push_str(&n.to_string()),
    Value::Str(s) => write_string(out, s),
    Value::List(items) => {
      if items.is_empty() {
        out.push_str("{}");
        return;
      }
      out.push_str("{\n");
      for item in items {
        indent(out, depth + 1);
        write_value(out, item, depth + 1);
        out.push_str(",\n");
      }
      indent(out, depth);
      out.push('}');
    }
    Value::Table(map) => {
      if map.is_empty() {
        out.push_str("{}");
        return;
      }
      out.push_str("{\n");
      for (key, item) in map.iter() {
        indent(out, depth + 1);
        write_key(out, key);
        out.push_str(" = ");
        write_value(out, item, depth + 1);
        out.push_str(",\n");
      }
      indent(out, depth);
      out.push('}');
    }
  }
}

fn indent(out: &mut String, depth: usize) {
  for _ in 0..depth {
    out.push_str("  ");
  }
}

fn write_key(out: &mut String, key: &str) {
  if is_identifier(key) {
    out.push_str(key);
  } else {
    out.push('[');
    write_string(out, key);
    out.push(']');
  }
}

fn write_string(out: &mut String, s: &str) {
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      c => out.push(c),
    }
  }
  out.push('"');
}

const LUA_KEYWORDS: &[&str] = &[
  "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in", "local", "nil",
  "not", "or", "repeat", "return", "then", "true", "until", "while",
];

fn is_identifier(key: &str) -> bool {
  let mut chars = key.chars();
  let starts_well = chars
    .next()
    .map(|c| c.is_ascii_alphabetic() || c == '_')
    .unwrap_or(false);
  starts_well && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !LUA_KEYWORDS.contains(&key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::eval::eval_string;
  use dist_core::OrderedMap;

  fn sample() -> Value {
    let mut source = OrderedMap::new();
    source.insert("url", Value::from("git://github.com/LuaDist2/xml.git"));
    let mut top = OrderedMap::new();
    top.insert("package", Value::from("xml"));
    top.insert("version", Value::from("1.8.0-1"));
    top.insert("source", Value::Table(source));
    top.insert("dependencies", Value::from(vec!["lua >= 5.1".to_string()]));
    Value::Table(top)
  }

  #[test]
  fn renders_in_map_order() {
    let text = to_lua(&sample());
    let package_at = text.find("package =").unwrap();
    let version_at = text.find("version =").unwrap();
    let source_at = text.find("source =").unwrap();
    assert!(package_at < version_at && version_at < source_at);
  }

  #[test]
  fn non_identifier_keys_are_bracketed() {
    let mut versions = OrderedMap::new();
    versions.insert("1.8.0-1", Value::table());
    versions.insert("end", Value::table());
    let text = to_lua(&Value::Table(versions));
    assert!(text.contains(r#"["1.8.0-1"] = {}"#));
    assert!(text.contains(r#"["end"] = {}"#));
  }

  #[test]
  fn strings_are_escaped() {
    let text = to_lua(&Value::from("a \"quoted\"\npath\\here"));
    assert_eq!(text, r#""a \"quoted\"\npath\\here""#);
  }

  #[test]
  fn module_round_trips_through_eval() {
    // Evaluation re-sorts map keys, so compare field-wise.
    let original = sample();
    let text = to_lua_module(&original);
    let parsed = eval_string(&text, "round-trip").unwrap();
    for field in ["package", "version", "dependencies"] {
      assert_eq!(parsed.field(field), original.field(field), "field {}", field);
    }
    assert_eq!(
      parsed.field("source").and_then(|s| s.field("url")),
      original.field("source").and_then(|s| s.field("url")),
    );
  }

  #[test]
  fn empty_containers_render_flat() {
    assert_eq!(to_lua(&Value::List(Vec::new())), "{}");
    assert_eq!(to_lua(&Value::table()), "{}");
  }
}
