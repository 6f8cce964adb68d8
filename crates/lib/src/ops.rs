//! The top-level operations.
//!
//! Each operation composes the pipeline stages in a fixed order and owns
//! the deploy root for its duration. Installs persist the installed set
//! after every successful package, so an interrupted run keeps what it
//! finished; a second pass then records the exact dependency versions each
//! new package was built against.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use dist_core::{Manifest, OrderedMap, Package, PackageRef, Rockspec};

use crate::bundle::{self, BundleInput};
use crate::ctx::DistContext;
use crate::error::DistError;
use crate::fetch;
use crate::install::{self, InstallError};
use crate::installed::InstalledSet;
use crate::manifest;
use crate::pack;
use crate::report::Reporter;
use crate::resolver::{self, ResolveError};

/// Install every target plus whatever they need.
pub fn install(ctx: &mut DistContext, targets: &[PackageRef]) -> Result<Vec<Package>, DistError> {
  let root = ctx.config().root_dir.clone();
  let mut reporter = Reporter::new(ctx.config(), &format!("install {}", refs_label(targets)));
  let result = install_inner(ctx, targets, &mut reporter);
  finish(reporter, &root, &result);
  result
}

fn install_inner(
  ctx: &mut DistContext,
  targets: &[PackageRef],
  reporter: &mut Reporter,
) -> Result<Vec<Package>, DistError> {
  let manifest = ctx.manifest()?.clone();
  let cfg = ctx.config().clone();
  let mut set = InstalledSet::load(&cfg.deploy_manifest_path())?;

  let plan = resolver::resolve_with_fallback(&manifest, targets, &set.working_set(), &cfg.platform)
    .map_err(DistError::Resolve)?;
  if plan.is_empty() {
    info!("nothing to install");
    reporter.step("nothing to install");
    return Ok(Vec::new());
  }

  let target_names: HashSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();
  let mut installed_now = Vec::new();
  for mut pkg in plan {
    info!(package = %pkg, "installing");
    let src_dir = fetch::fetch_package(&manifest, &pkg, &cfg.temp_dir)?;
    install::install_package(&cfg, &mut pkg, &src_dir)
      .map_err(|source| install_error_for(&pkg, &target_names, source))?;

    set.add(pkg.clone())?;
    set.save(&cfg.deploy_manifest_path())?;
    reporter.step(format!("installed {}", pkg));
    installed_now.push(pkg);
  }

  fill_bin_dependencies(&mut set, &installed_now);
  set.save(&cfg.deploy_manifest_path())?;
  Ok(installed_now)
}

/// Build and install from the current working directory.
///
/// The alphabetically first rockspec names the package; further rockspecs
/// are ignored with a warning. Dependencies install first, then the
/// directory itself is built in place and cleaned up on success unless
/// debug mode retains it.
pub fn make(ctx: &mut DistContext, dir: &Path) -> Result<Package, DistError> {
  let root = ctx.config().root_dir.clone();
  let mut reporter = Reporter::new(ctx.config(), &format!("make {}", dir.display()));
  let result = make_inner(ctx, dir, &mut reporter);
  finish(reporter, &root, &result);
  result
}

fn make_inner(ctx: &mut DistContext, dir: &Path, reporter: &mut Reporter) -> Result<Package, DistError> {
  let rockspecs = manifest::rockspecs_in(dir).map_err(|_| DistError::NoSourceFound(dir.to_path_buf()))?;
  let first = match rockspecs.first() {
    Some(first) => first.clone(),
    None => return Err(DistError::NoSourceFound(dir.to_path_buf())),
  };
  if rockspecs.len() > 1 {
    let ignored: Vec<String> = rockspecs[1..]
      .iter()
      .map(|p| p.file_name().unwrap_or_default().to_string_lossy().into_owned())
      .collect();
    warn!(using = %first.display(), ignored = %ignored.join(", "), "multiple rockspecs, using the first");
    reporter.warning(format!(
      "multiple rockspecs found; using '{}', ignoring {}",
      first.display(),
      ignored.join(", ")
    ));
  }

  let spec = install::load_rockspec_file(&first).map_err(|source| DistError::InstallTarget {
    package: first.display().to_string(),
    source,
  })?;
  let version = spec.version.parse().map_err(|source| DistError::InstallTarget {
    package: spec.package.clone(),
    source: InstallError::BadVersion {
      path: first.clone(),
      source,
    },
  })?;
  let mut pkg = Package::new(spec.package.clone(), version);
  info!(package = %pkg, "making from working directory");

  // Dependencies first, through the ordinary pipeline.
  let mut dep_refs = Vec::new();
  for text in &spec.dependencies {
    let r: PackageRef = text
      .parse()
      .map_err(|source| {
        DistError::Resolve(ResolveError::BadDependency {
          owner: pkg.name.clone(),
          text: text.clone(),
          source,
        })
      })?;
    dep_refs.push(r);
  }
  if !dep_refs.is_empty() {
    install_inner(ctx, &dep_refs, reporter)?;
  }

  let cfg = ctx.config().clone();
  let mut set = InstalledSet::load(&cfg.deploy_manifest_path())?;
  install::install_package(&cfg, &mut pkg, dir).map_err(|source| DistError::InstallTarget {
    package: pkg.dir_name(),
    source,
  })?;
  install::cleanup(&cfg, dir);

  set.add(pkg.clone())?;
  set.save(&cfg.deploy_manifest_path())?;
  fill_bin_dependencies(&mut set, std::slice::from_ref(&pkg));
  set.save(&cfg.deploy_manifest_path())?;
  reporter.step(format!("installed {}", pkg));
  Ok(pkg)
}

/// Remove installed packages and their files. A file also listed by
/// another installed package is preserved.
pub fn remove(ctx: &mut DistContext, targets: &[PackageRef]) -> Result<Vec<Package>, DistError> {
  let root = ctx.config().root_dir.clone();
  let mut reporter = Reporter::new(ctx.config(), &format!("remove {}", refs_label(targets)));
  let result = remove_inner(ctx, targets, &mut reporter);
  finish(reporter, &root, &result);
  result
}

fn remove_inner(
  ctx: &mut DistContext,
  targets: &[PackageRef],
  reporter: &mut Reporter,
) -> Result<Vec<Package>, DistError> {
  let cfg = ctx.config().clone();
  let mut set = InstalledSet::load(&cfg.deploy_manifest_path())?;

  let mut removed = Vec::new();
  for target in targets {
    let pkg = set
      .find_match(target)
      .cloned()
      .ok_or_else(|| DistError::NotInstalled(target.to_string()))?;

    for file in &pkg.files {
      if set.file_shared(file, &pkg.name) {
        warn!(file = %file, package = %pkg, "file is shared with another package, keeping");
        reporter.warning(format!("kept shared file {}", file));
        continue;
      }
      let path = cfg.root_dir.join(file);
      if let Err(e) = fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
          warn!(file = %file, error = %e, "could not remove installed file");
        }
      }
      prune_empty_dirs(&cfg.root_dir, &path);
    }

    set.remove(&pkg.name);
    set.save(&cfg.deploy_manifest_path())?;
    info!(package = %pkg, "removed");
    reporter.step(format!("removed {}", pkg));
    removed.push(pkg);
  }
  Ok(removed)
}

/// Fetch package sources without installing: each target's best manifest
/// version is staged under `dest`.
pub fn fetch(
  ctx: &mut DistContext,
  targets: &[PackageRef],
  dest: &Path,
) -> Result<Vec<(Package, PathBuf)>, DistError> {
  let manifest = ctx.manifest()?.clone();
  let cfg = ctx.config().clone();

  let mut selected = Vec::new();
  for target in targets {
    selected.push(select_from_manifest(&manifest, target, &cfg.platform)?);
  }

  let fetched = fetch::fetch_packages(&manifest, &selected, dest)?;
  for (pkg, dir) in &fetched {
    info!(package = %pkg, dir = %dir.display(), "fetched");
  }
  Ok(fetched)
}

/// Re-export installed packages as redistributable binary units.
pub fn pack(ctx: &mut DistContext, targets: &[PackageRef], dest: &Path) -> Result<Vec<PathBuf>, DistError> {
  let root = ctx.config().root_dir.clone();
  let mut reporter = Reporter::new(ctx.config(), &format!("pack {}", refs_label(targets)));
  let result = pack_inner(ctx, targets, dest, &mut reporter);
  finish(reporter, &root, &result);
  result
}

fn pack_inner(
  ctx: &mut DistContext,
  targets: &[PackageRef],
  dest: &Path,
  reporter: &mut Reporter,
) -> Result<Vec<PathBuf>, DistError> {
  let cfg = ctx.config().clone();
  let set = InstalledSet::load(&cfg.deploy_manifest_path())?;

  let mut exports = Vec::new();
  for target in targets {
    let out_dir = pack::pack_package(&cfg, &set, target, dest).map_err(|source| DistError::BinaryExport {
      package: target.to_string(),
      source,
    })?;
    reporter.step(format!("packed {}", out_dir.display()));
    exports.push(out_dir);
  }
  Ok(exports)
}

/// Assemble a statically linked bundle of the targets and everything they
/// need, interpreter included. Nothing is installed.
pub fn bundle(ctx: &mut DistContext, targets: &[PackageRef], dest: &Path) -> Result<PathBuf, DistError> {
  let root = ctx.config().root_dir.clone();
  let mut reporter = Reporter::new(ctx.config(), &format!("static {}", refs_label(targets)));
  let result = bundle_inner(ctx, targets, dest, &mut reporter);
  finish(reporter, &root, &result);
  result
}

fn bundle_inner(
  ctx: &mut DistContext,
  targets: &[PackageRef],
  dest: &Path,
  reporter: &mut Reporter,
) -> Result<PathBuf, DistError> {
  let manifest = ctx.manifest()?.clone();
  let cfg = ctx.config().clone();

  // Resolve against an empty installed view so every dependency, the
  // interpreter included, lands in the bundle.
  let plan = resolver::resolve_with_fallback(&manifest, targets, &OrderedMap::new(), &cfg.platform)
    .map_err(DistError::Resolve)?;

  let mut inputs = Vec::new();
  for (pkg, src_dir) in fetch::fetch_packages(&manifest, &plan, &cfg.temp_dir)? {
    let spec = install::load_rockspec_for(&pkg, &src_dir)
      .map_err(|source| DistError::StaticBundle(bundle::BundleError::Spec(source)))?;
    reporter.step(format!("bundling {}", pkg));
    inputs.push(BundleInput {
      package: pkg,
      spec,
      src_dir,
    });
  }

  bundle::bundle_static(&inputs, dest).map_err(DistError::StaticBundle)?;
  Ok(dest.to_path_buf())
}

/// The rockspec of the best manifest version matching `target`.
pub fn get_rockspec(ctx: &mut DistContext, target: &PackageRef) -> Result<Rockspec, DistError> {
  let manifest = ctx.manifest()?.clone();
  let cfg = ctx.config().clone();

  let pkg = select_from_manifest(&manifest, target, &cfg.platform)?;
  let src_dir = fetch::fetch_package(&manifest, &pkg, &cfg.temp_dir)?;
  install::load_rockspec_for(&pkg, &src_dir).map_err(|source| DistError::InstallTarget {
    package: pkg.dir_name(),
    source,
  })
}

/// Installed packages in install order, for listing.
pub fn installed_packages(ctx: &DistContext) -> Result<Vec<Package>, DistError> {
  let set = InstalledSet::load(&ctx.config().deploy_manifest_path())?;
  Ok(set.packages().cloned().collect())
}

fn select_from_manifest(manifest: &Manifest, target: &PackageRef, platform: &[String]) -> Result<Package, DistError> {
  resolver::best_candidate(manifest, target, platform)
    .map(|(version, _)| Package::new(target.name.clone(), version))
    .ok_or_else(|| {
      DistError::Resolve(ResolveError::NoCandidate(
        target.name.clone(),
        target.constraint.clone(),
        Default::default(),
      ))
    })
}

/// Record the exact installed versions satisfying each new package's
/// runtime dependencies.
fn fill_bin_dependencies(set: &mut InstalledSet, new_packages: &[Package]) {
  for pkg in new_packages {
    let dep_texts: Vec<String> = pkg.dependencies().to_vec();
    let mut bin_deps = Vec::new();
    for text in &dep_texts {
      let r: PackageRef = match text.parse() {
        Ok(r) => r,
        Err(_) => continue,
      };
      match set.find(&r.name) {
        Some(dep) => bin_deps.push(format!("{} {}", dep.name, dep.version)),
        None => warn!(package = %pkg, dep = %text, "resolved dependency is no longer installed"),
      }
    }
    if let Some(installed) = set.find_mut(&pkg.name) {
      installed.bin_dependencies = bin_deps;
    }
  }
}

fn install_error_for(pkg: &Package, target_names: &HashSet<&str>, source: InstallError) -> DistError {
  if target_names.contains(pkg.name.as_str()) {
    DistError::InstallTarget {
      package: pkg.dir_name(),
      source,
    }
  } else {
    DistError::InstallDep {
      package: pkg.dir_name(),
      source,
    }
  }
}

fn refs_label(targets: &[PackageRef]) -> String {
  targets.iter().map(PackageRef::to_string).collect::<Vec<_>>().join(", ")
}

fn finish<T>(reporter: Reporter, root: &Path, result: &Result<T, DistError>) {
  let outcome = match result {
    Ok(_) => "ok".to_string(),
    Err(e) => format!("failed (exit {})", e.exit_code()),
  };
  reporter.finish(root, &outcome);
}

/// Remove now-empty parent directories of a deleted file, up to the root.
fn prune_empty_dirs(root: &Path, deleted: &Path) {
  let mut dir = deleted.parent();
  while let Some(d) = dir {
    if d == root || !d.starts_with(root) {
      break;
    }
    if fs::remove_dir(d).is_err() {
      break;
    }
    dir = d.parent();
  }
}
