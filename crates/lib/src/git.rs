//! Shallow git clones.
//!
//! Both the manifest store and the package downloader fetch by cloning at
//! depth 1: the manifest at the default branch tip, packages at the tag
//! matching their version.

use std::num::NonZeroU32;
use std::path::Path;

use gix::remote::fetch::Shallow;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
  #[error("invalid ref name '{name}': {source}")]
  RefName {
    name: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to clone '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to check out '{url}': {source}")]
  Checkout {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// Clone `url` into `dest` at depth 1. With `ref_name` set, the clone is
/// made at that tag or branch instead of the default branch tip.
pub fn shallow_clone(url: &str, dest: &Path, ref_name: Option<&str>) -> Result<(), GitError> {
  debug!(url, dest = %dest.display(), r#ref = ref_name, "cloning");

  let mut prepared = gix::prepare_clone(url, dest)
    .map_err(|e| GitError::Clone {
      url: url.to_string(),
      source: Box::new(e),
    })?
    .with_shallow(Shallow::DepthAtRemote(NonZeroU32::MIN));

  if let Some(name) = ref_name {
    prepared = prepared.with_ref_name(Some(name)).map_err(|e| GitError::RefName {
      name: name.to_string(),
      source: Box::new(e),
    })?;
  }

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| GitError::Clone {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  let (_repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| GitError::Checkout {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  Ok(())
}

/// Whether a manifest URL names a git transport rather than a local path.
pub fn is_remote_url(url: &str) -> bool {
  ["git://", "http://", "https://", "ssh://", "git+"]
    .iter()
    .any(|scheme| url.starts_with(scheme))
}
