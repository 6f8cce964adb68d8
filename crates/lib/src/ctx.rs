//! The per-operation context.
//!
//! Replaces the source system's process-wide mutable root directory with an
//! explicit value threaded through every stage: the configuration is fixed
//! for the whole operation and the merged manifest is memoized after its
//! first successful load.

use dist_core::{Config, Manifest};

use crate::error::DistError;
use crate::manifest;

pub struct DistContext {
  config: Config,
  manifest: Option<Manifest>,
}

impl DistContext {
  pub fn new(mut config: Config) -> DistContext {
    if config.platform.is_empty() {
      config.platform = dist_platform::default_platform();
    }
    DistContext {
      config,
      manifest: None,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The merged manifest, downloaded on first use and cached for the rest
  /// of the operation. Callers never mutate the returned view.
  pub fn manifest(&mut self) -> Result<&Manifest, DistError> {
    let merged = match self.manifest.take() {
      Some(merged) => merged,
      None => manifest::download_manifest(&self.config, &self.config.manifest_repos)
        .map_err(DistError::ManifestRetrieval)?,
    };
    Ok(self.manifest.insert(merged))
  }

  /// Pre-seed the manifest cache; used by tests and by callers that already
  /// hold a merged view.
  pub fn with_manifest(config: Config, manifest: Manifest) -> DistContext {
    let mut ctx = DistContext::new(config);
    ctx.manifest = Some(manifest);
    ctx
  }
}
