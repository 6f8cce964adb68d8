//! Shared constants.

/// Length of the truncated hex digest embedded in packed version strings.
pub const HASH_PREFIX_LEN: usize = 10;

/// File name of the installed-set manifest under the deploy root.
pub const DEPLOY_MANIFEST: &str = "dist.manifest";

/// File name of the package index inside a remote manifest repository.
pub const MANIFEST_FILENAME: &str = "manifest-file";

/// Name of the interpreter package the fallback resolver seeds.
pub const LUA_PACKAGE: &str = "lua";
