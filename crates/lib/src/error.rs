//! The operation-level error taxonomy.
//!
//! Stage-local errors (fetch, install, …) are defined next to the code that
//! produces them; this module defines the kinds an operation surfaces to the
//! caller, each mapped to a stable exit code at the CLI boundary. Errors
//! propagate unchanged: no stage retries, and the Lua-fallback resolve is a
//! different query rather than a retry.
//!
//! Kinds 1 through 8 are the classic taxonomy; 9 and 10 cover failures the
//! original enumeration had no slot for (a `remove` target that is not
//! installed, and an unreadable or unwritable installed set).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistError {
  /// A manifest URL failed to clone or load; there is no merged manifest.
  #[error("manifest retrieval failed: {0}")]
  ManifestRetrieval(#[source] crate::manifest::ManifestStoreError),

  /// No version assignment satisfies the constraints, even after the Lua
  /// fallback.
  #[error("cannot resolve dependencies: {0}")]
  Resolve(#[source] crate::resolver::ResolveError),

  /// A package source was unavailable at every candidate repository. The
  /// stage error names the failing package.
  #[error("cannot fetch: {0}")]
  Fetch(#[from] crate::fetch::FetchError),

  /// Build or install failed for a package the user named.
  #[error("failed to install '{package}': {source}")]
  InstallTarget {
    package: String,
    #[source]
    source: crate::install::InstallError,
  },

  /// Build or install failed for a transitive dependency.
  #[error("failed to install dependency '{package}': {source}")]
  InstallDep {
    package: String,
    #[source]
    source: crate::install::InstallError,
  },

  /// `make` was invoked in a directory without a single rockspec.
  #[error("no rockspec found in '{0}'")]
  NoSourceFound(PathBuf),

  /// `pack` failed: unknown package or missing installed files.
  #[error("cannot export '{package}': {source}")]
  BinaryExport {
    package: String,
    #[source]
    source: crate::pack::PackError,
  },

  /// The static bundler failed at one of its sub-steps.
  #[error("static bundle failed: {0}")]
  StaticBundle(#[source] crate::bundle::BundleError),

  /// A `remove` target matches no installed package.
  #[error("package matching '{0}' is not installed")]
  NotInstalled(String),

  /// The installed set under the deploy root could not be read or written.
  #[error("installed manifest error: {0}")]
  InstalledSet(#[from] crate::installed::InstalledError),
}

impl DistError {
  /// Stable exit code for the CLI boundary.
  pub fn exit_code(&self) -> i32 {
    match self {
      DistError::ManifestRetrieval(_) => 1,
      DistError::Resolve(_) => 2,
      DistError::Fetch(_) => 3,
      DistError::InstallTarget { .. } => 4,
      DistError::InstallDep { .. } => 5,
      DistError::NoSourceFound(_) => 6,
      DistError::BinaryExport { .. } => 7,
      DistError::StaticBundle(_) => 8,
      DistError::NotInstalled(_) => 9,
      DistError::InstalledSet(_) => 10,
    }
  }
}
