//! dist-core: Core types and logic for luadist
//!
//! This crate provides the fundamental types used throughout luadist:
//! - `Version` / `Constraint`: the version algebra rockspecs are resolved with
//! - `Package`: a named, versioned unit with its spec and installed files
//! - `OrderedMap`: insertion-ordered map backing every deterministic listing
//! - `Rockspec`: the structured package descriptor (metadata + build recipe)
//! - `Manifest`: an index of available packages and versions
//! - `Config`: every option recognized by the tool
//!
//! The types are Lua-runtime agnostic. The `dist-lua` crate handles
//! conversion between Lua source text and the `Value` form defined here.

pub mod config;
pub mod consts;
pub mod constraint;
pub mod hash;
pub mod manifest;
pub mod ordmap;
pub mod package;
pub mod rockspec;
pub mod value;
pub mod version;

pub use config::Config;
pub use constraint::{Constraint, ConstraintError, Op, PackageRef};
pub use manifest::{Manifest, PkgEntry};
pub use ordmap::OrderedMap;
pub use package::Package;
pub use rockspec::{Build, BuildType, Rockspec, RockspecError, SpecKind};
pub use value::Value;
pub use version::{Version, VersionError};
