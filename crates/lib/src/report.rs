//! Markdown activity reports.
//!
//! With `report = true` every operation appends a section to
//! `<root>/dist.report.md` describing what it did. Disabled reporters
//! swallow every call, so call sites stay unconditional.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use tracing::warn;

use dist_core::Config;

/// File name of the activity report under the deploy root.
pub const REPORT_FILENAME: &str = "dist.report.md";

pub struct Reporter {
  enabled: bool,
  title: String,
  lines: Vec<String>,
}

impl Reporter {
  pub fn new(cfg: &Config, operation: &str) -> Reporter {
    Reporter {
      enabled: cfg.report,
      title: operation.to_string(),
      lines: Vec::new(),
    }
  }

  /// Record one bullet line.
  pub fn step(&mut self, text: impl Into<String>) {
    if self.enabled {
      self.lines.push(format!("- {}", text.into()));
    }
  }

  /// Record a warning bullet.
  pub fn warning(&mut self, text: impl Into<String>) {
    if self.enabled {
      self.lines.push(format!("- **warning**: {}", text.into()));
    }
  }

  /// Append the section to the report file under `root`. A reporting
  /// failure never fails the operation.
  pub fn finish(self, root: &Path, outcome: &str) {
    if !self.enabled {
      return;
    }
    if let Err(e) = self.write_to(root, outcome) {
      warn!(error = %e, "could not write activity report");
    }
  }

  fn write_to(&self, root: &Path, outcome: &str) -> io::Result<()> {
    std::fs::create_dir_all(root)?;
    let path = root.join(REPORT_FILENAME);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "## {} - {}", self.title, outcome)?;
    writeln!(file)?;
    for line in &self.lines {
      writeln!(file, "{}", line)?;
    }
    writeln!(file)
  }
}
