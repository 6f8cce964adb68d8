//! Error types for dist-lua.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LuaError {
  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("lua evaluation failed: {0}")]
  Eval(#[from] mlua::Error),

  #[error("executable content at '{0}' is not allowed in a descriptor")]
  ExecutableContent(String),

  #[error("unsupported table key at '{0}': only strings and positive integers are allowed")]
  BadKey(String),

  #[error("descriptor evaluated to a {0}, expected a table")]
  NotATable(&'static str),
}
