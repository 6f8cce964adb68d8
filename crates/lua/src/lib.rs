//! dist-lua: the Lua boundary of luadist.
//!
//! Rockspecs, remote manifests, and the installed set are all Lua source on
//! disk. This crate evaluates such files in a restricted environment and
//! returns the closed `Value` form defined in `dist-core`; the `write`
//! module renders values back to pretty-printed Lua text.
//!
//! Evaluation is isolated: every file gets a fresh VM and an empty chunk
//! environment, so a descriptor can neither observe nor mutate process
//! state, and any executable content in the result is rejected.

pub mod error;
pub mod eval;
pub mod write;

pub use error::LuaError;
pub use eval::{eval_file, eval_string};
pub use write::{to_lua, to_lua_module};
