//! Dependency resolution.
//!
//! A greedy depth-first closure: for each target in order, pick the
//! greatest manifest version satisfying every accumulated constraint and
//! the platform filter, recurse into its dependencies first, and append to
//! the output, so the output is dependency-first and feeds the installer
//! directly. Packages already in the working set only have their
//! constraints checked; an incompatible present version is a conflict, not
//! a backtrack point.
//!
//! The interpreter package (`lua`) is never chosen from the manifest: every
//! build runs against the installed interpreter, so `lua` resolves only
//! through the installed set or through the fallback strategy below, which
//! seeds provisional candidates newest-first and materializes the first one
//! that makes the whole query succeed.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use dist_core::consts::LUA_PACKAGE;
use dist_core::{Constraint, ConstraintError, Manifest, OrderedMap, Package, PackageRef, Version};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("no version of '{0}' satisfies '{0} {1}'{2}")]
  NoCandidate(String, Constraint, RequiredBy),

  #[error("package '{name}' {version} is present but '{name} {constraint}' is required{required_by}")]
  Conflict {
    name: String,
    version: Version,
    constraint: Constraint,
    required_by: RequiredBy,
  },

  #[error("no lua installed; '{0} {1}' cannot be satisfied{2}")]
  LuaMissing(String, Constraint, RequiredBy),

  #[error("circular dependency through '{0}'")]
  Circular(String),

  #[error("invalid dependency '{text}' of '{owner}': {source}")]
  BadDependency {
    owner: String,
    text: String,
    #[source]
    source: ConstraintError,
  },
}

/// Where a requirement came from, for error messages.
#[derive(Debug, Clone, Default)]
pub struct RequiredBy(Option<String>);

impl fmt::Display for RequiredBy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Some(owner) => write!(f, " (required by '{}')", owner),
      None => Ok(()),
    }
  }
}

/// Resolve every target against the installed set, optionally with a
/// provisional interpreter seeded into the working view. The returned list
/// is dependency-first and contains neither installed packages nor the
/// provisional seed.
pub fn resolve_all(
  manifest: &Manifest,
  targets: &[PackageRef],
  installed: &OrderedMap<Package>,
  provisional: Option<Package>,
  platform: &[String],
) -> Result<Vec<Package>, ResolveError> {
  let mut working = installed.clone();
  if let Some(seed) = provisional {
    debug!(lua = %seed.version, "seeding provisional interpreter");
    working.insert(seed.name.clone(), seed);
  }

  let mut out = Vec::new();
  for target in targets {
    let mut visiting = Vec::new();
    resolve_one(manifest, target, None, &mut working, &mut out, platform, &mut visiting)?;
  }
  Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn resolve_one(
  manifest: &Manifest,
  target: &PackageRef,
  required_by: Option<&str>,
  working: &mut OrderedMap<Package>,
  out: &mut Vec<Package>,
  platform: &[String],
  visiting: &mut Vec<(String, Version)>,
) -> Result<(), ResolveError> {
  let owner = RequiredBy(required_by.map(str::to_string));

  // Already present (installed, provisional, or selected earlier)?
  if let Some(existing) = working.get(&target.name) {
    if target.constraint.satisfied_by(&existing.version) {
      return Ok(());
    }
    return Err(ResolveError::Conflict {
      name: target.name.clone(),
      version: existing.version.clone(),
      constraint: target.constraint.clone(),
      required_by: owner,
    });
  }

  // Mid-resolution on the DFS path: check the pending selection.
  if let Some((_, pending)) = visiting.iter().find(|(name, _)| *name == target.name) {
    if target.constraint.satisfied_by(pending) {
      return Ok(());
    }
    return Err(ResolveError::Circular(target.name.clone()));
  }

  // The interpreter is managed through the installed set only.
  if target.name == LUA_PACKAGE {
    return Err(ResolveError::LuaMissing(
      target.name.clone(),
      target.constraint.clone(),
      owner,
    ));
  }

  let chosen = best_candidate(manifest, target, platform)
    .ok_or_else(|| ResolveError::NoCandidate(target.name.clone(), target.constraint.clone(), owner))?;
  debug!(package = %target.name, version = %chosen.0, "selected");

  visiting.push((target.name.clone(), chosen.0.clone()));
  for dep_text in &chosen.1 {
    let dep: PackageRef = dep_text.parse().map_err(|source| ResolveError::BadDependency {
      owner: target.name.clone(),
      text: dep_text.clone(),
      source,
    })?;
    resolve_one(manifest, &dep, Some(&target.name), working, out, platform, visiting)?;
  }
  visiting.pop();

  let pkg = Package::new(target.name.clone(), chosen.0);
  working.insert(pkg.name.clone(), pkg.clone());
  out.push(pkg);
  Ok(())
}

/// Greatest manifest version of the target passing constraint and platform
/// filters, with its dependency list. Equal components tie-break on the
/// greater revision through the version order itself.
pub fn best_candidate(manifest: &Manifest, target: &PackageRef, platform: &[String]) -> Option<(Version, Vec<String>)> {
  manifest
    .versions_of(&target.name)
    .into_iter()
    .filter(|entry| dist_platform::supported_on(&entry.supported_platforms, platform))
    .filter(|entry| target.constraint.satisfied_by(&entry.version))
    .max_by(|a, b| a.version.cmp(&b.version))
    .map(|entry| (entry.version.clone(), entry.dependencies.clone()))
}

/// Resolve with the interpreter fallback.
///
/// If the plain query fails and no `lua` is installed, retry with each
/// manifest `lua` version seeded provisionally, newest first. The first
/// success materializes that interpreter as a real package prepended to the
/// result; exhaustion returns the original error. With `lua` already
/// installed no fallback is attempted; the user manages their interpreter.
pub fn resolve_with_fallback(
  manifest: &Manifest,
  targets: &[PackageRef],
  installed: &OrderedMap<Package>,
  platform: &[String],
) -> Result<Vec<Package>, ResolveError> {
  let original = match resolve_all(manifest, targets, installed, None, platform) {
    Ok(result) => return Ok(result),
    Err(e) => e,
  };

  if installed.contains_key(LUA_PACKAGE) {
    return Err(original);
  }

  let mut candidates: Vec<Version> = manifest
    .versions_of(LUA_PACKAGE)
    .into_iter()
    .filter(|entry| dist_platform::supported_on(&entry.supported_platforms, platform))
    .map(|entry| entry.version.clone())
    .collect();
  candidates.sort();
  candidates.reverse();

  for candidate in candidates {
    debug!(lua = %candidate, "retrying resolution with provisional interpreter");
    let seed = Package::provisional(LUA_PACKAGE, candidate.clone());
    if let Ok(rest) = resolve_all(manifest, targets, installed, Some(seed), platform) {
      info!(lua = %candidate, "interpreter fallback succeeded");
      let mut result = vec![Package::new(LUA_PACKAGE, candidate)];
      result.extend(rest);
      return Ok(result);
    }
  }

  Err(original)
}
