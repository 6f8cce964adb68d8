//! luadist: a package manager for Lua modules.
//!
//! Thin front-end over `luadist-lib`: parses the command line, builds the
//! operation context, runs one operation, and maps its error kind to a
//! stable exit code.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dist_core::constraint::ConstraintError;
use dist_core::{Config, PackageRef};
use luadist_lib::{ops, DistContext, DistError};

mod output;

#[derive(Parser)]
#[command(name = "luadist", version, about = "Package manager for Lua modules")]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Deploy root to install into
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  /// Manifest repository (repeatable, replaces the default list)
  #[arg(long = "repo", global = true)]
  repos: Vec<String>,

  /// Allow local directories as manifest repositories
  #[arg(long, global = true)]
  local: bool,

  /// Keep staging directories and dump the merged manifest
  #[arg(long, global = true)]
  debug: bool,

  /// Append a markdown activity report under the deploy root
  #[arg(long, global = true)]
  report: bool,

  /// Extra build variable KEY=VALUE (repeatable)
  #[arg(short = 'D', value_name = "KEY=VALUE", global = true)]
  variables: Vec<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Install packages and their dependencies
  Install {
    /// Package references: "name", "name version" or "name op version"
    #[arg(required = true)]
    packages: Vec<String>,
  },

  /// Build and install the package in a working directory
  Make {
    /// Directory holding the rockspec (defaults to the current directory)
    #[arg(default_value = ".")]
    dir: PathBuf,
  },

  /// Remove installed packages
  Remove {
    #[arg(required = true)]
    packages: Vec<String>,
  },

  /// List installed packages
  List,

  /// Fetch package sources without installing
  Fetch {
    #[arg(required = true)]
    packages: Vec<String>,

    /// Directory to stage sources into
    #[arg(long, default_value = ".")]
    dest: PathBuf,
  },

  /// Re-export installed packages as redistributable binary units
  Pack {
    #[arg(required = true)]
    packages: Vec<String>,

    /// Directory to export into
    #[arg(long, default_value = ".")]
    dest: PathBuf,
  },

  /// Assemble a statically linked bundle of packages and dependencies
  Static {
    #[arg(required = true)]
    packages: Vec<String>,

    /// Directory to assemble the bundle in
    #[arg(long, default_value = "dist-bundle")]
    dest: PathBuf,
  },
}

enum CliError {
  /// A package reference on the command line did not parse.
  Usage { text: String, source: ConstraintError },
  Dist(DistError),
}

impl CliError {
  fn exit_code(&self) -> u8 {
    match self {
      // An unparseable reference can never resolve.
      CliError::Usage { .. } => 2,
      CliError::Dist(e) => e.exit_code().clamp(1, 255) as u8,
    }
  }
}

impl fmt::Display for CliError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CliError::Usage { text, source } => write!(f, "invalid package reference '{}': {}", text, source),
      CliError::Dist(e) => write!(f, "{}", e),
    }
  }
}

impl From<DistError> for CliError {
  fn from(e: DistError) -> CliError {
    CliError::Dist(e)
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      output::print_error(&e.to_string());
      ExitCode::from(e.exit_code())
    }
  }
}

fn run(cli: Cli) -> Result<(), CliError> {
  let mut ctx = build_context(&cli);

  match &cli.command {
    Commands::Install { packages } => {
      let refs = parse_refs(packages)?;
      let installed = ops::install(&mut ctx, &refs)?;
      if installed.is_empty() {
        output::print_info("nothing to install");
      }
      for pkg in &installed {
        output::print_success(&format!("installed {}", pkg));
      }
      Ok(())
    }

    Commands::Make { dir } => {
      let pkg = ops::make(&mut ctx, dir)?;
      output::print_success(&format!("installed {}", pkg));
      Ok(())
    }

    Commands::Remove { packages } => {
      let refs = parse_refs(packages)?;
      for pkg in ops::remove(&mut ctx, &refs)? {
        output::print_success(&format!("removed {}", pkg));
      }
      Ok(())
    }

    Commands::List => {
      let packages = ops::installed_packages(&ctx)?;
      if packages.is_empty() {
        output::print_info("no packages installed");
      }
      for pkg in packages {
        println!("{}", pkg);
      }
      Ok(())
    }

    Commands::Fetch { packages, dest } => {
      let refs = parse_refs(packages)?;
      for (pkg, dir) in ops::fetch(&mut ctx, &refs, dest)? {
        output::print_step(&format!("fetched {} to {}", pkg, dir.display()));
      }
      Ok(())
    }

    Commands::Pack { packages, dest } => {
      let refs = parse_refs(packages)?;
      for export in ops::pack(&mut ctx, &refs, dest)? {
        output::print_success(&format!("packed {}", export.display()));
      }
      Ok(())
    }

    Commands::Static { packages, dest } => {
      let refs = parse_refs(packages)?;
      let out = ops::bundle(&mut ctx, &refs, dest)?;
      output::print_success(&format!("bundle assembled in {}", out.display()));
      Ok(())
    }
  }
}

fn build_context(cli: &Cli) -> DistContext {
  let mut cfg = Config::from_env();
  if let Some(root) = &cli.root {
    cfg.set_root_dir(root.clone());
  }
  if !cli.repos.is_empty() {
    cfg.manifest_repos = cli.repos.clone();
  }
  if cli.local {
    cfg.include_local_repos = true;
  }
  if cli.debug {
    cfg.debug = true;
  }
  if cli.report {
    cfg.report = true;
  }
  for entry in &cli.variables {
    match entry.split_once('=') {
      Some((key, value)) => {
        cfg.variables.insert(key, value.to_string());
      }
      None => {
        cfg.variables.insert(entry.as_str(), String::new());
      }
    }
  }
  DistContext::new(cfg)
}

fn parse_refs(args: &[String]) -> Result<Vec<PackageRef>, CliError> {
  args
    .iter()
    .map(|text| {
      text.parse().map_err(|source| CliError::Usage {
        text: text.clone(),
        source,
      })
    })
    .collect()
}
