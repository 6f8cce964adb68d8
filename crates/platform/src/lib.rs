//! dist-platform: platform identification for luadist.
//!
//! Packages are filtered through an ordered list of platform tags, most
//! specific first (`["linux", "unix"]`, `["macosx", "unix", "bsd"]`, …).
//! A rockspec's `supported_platforms` list names tags it supports, or
//! excludes with a leading `!`.

pub mod arch;

use std::fmt;

use arch::Arch;

/// Operating-system flavor, carrying its filter tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Bsd,
  Windows,
  Cygwin,
}

impl Os {
  /// Detect the current operating system at runtime.
  pub fn current() -> Option<Os> {
    match std::env::consts::OS {
      "linux" => Some(Os::Linux),
      "macos" => Some(Os::MacOs),
      "freebsd" | "netbsd" | "openbsd" | "dragonfly" => Some(Os::Bsd),
      "windows" => Some(Os::Windows),
      _ => None,
    }
  }

  /// Filter tags for this OS, most specific first.
  pub fn tags(self) -> Vec<String> {
    let tags: &[&str] = match self {
      Os::Linux => &["linux", "unix"],
      Os::MacOs => &["macosx", "unix", "bsd"],
      Os::Bsd => &["bsd", "unix"],
      Os::Windows => &["windows"],
      Os::Cygwin => &["cygwin", "unix"],
    };
    tags.iter().map(|t| t.to_string()).collect()
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Os::Linux => "linux",
      Os::MacOs => "macosx",
      Os::Bsd => "bsd",
      Os::Windows => "windows",
      Os::Cygwin => "cygwin",
    };
    write!(f, "{}", name)
  }
}

/// The active platform tag set, most specific first.
///
/// Falls back to `["unix"]` on OSes without a dedicated tag so resolution
/// still works on unrecognized Unix flavors.
pub fn default_platform() -> Vec<String> {
  match Os::current() {
    Some(os) => os.tags(),
    None => vec!["unix".to_string()],
  }
}

/// Build-metadata string for the current machine: `<arch>-<first tag>`.
pub fn platform_string() -> String {
  let tag = default_platform().into_iter().next().unwrap_or_else(|| "unknown".to_string());
  match Arch::current() {
    Some(arch) => format!("{}-{}", arch, tag),
    None => tag,
  }
}

/// Evaluate a rockspec's `supported_platforms` against the active tag set.
///
/// An empty list supports everything. A `!tag` entry rejects outright when
/// `tag` is active; otherwise at least one positive entry must match.
pub fn supported_on(supported: &[String], active: &[String]) -> bool {
  if supported.is_empty() {
    return true;
  }
  let mut any_positive = false;
  let mut positive_match = false;
  for entry in supported {
    match entry.strip_prefix('!') {
      Some(negated) => {
        if active.iter().any(|tag| tag == negated) {
          return false;
        }
      }
      None => {
        any_positive = true;
        if active.iter().any(|tag| tag == entry) {
          positive_match = true;
        }
      }
    }
  }
  !any_positive || positive_match
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn empty_supported_list_matches_everywhere() {
    assert!(supported_on(&[], &tags(&["linux", "unix"])));
  }

  #[test]
  fn positive_tag_must_match() {
    let active = tags(&["linux", "unix"]);
    assert!(supported_on(&tags(&["unix"]), &active));
    assert!(supported_on(&tags(&["windows", "linux"]), &active));
    assert!(!supported_on(&tags(&["windows"]), &active));
  }

  #[test]
  fn negated_tag_rejects() {
    let active = tags(&["linux", "unix"]);
    assert!(!supported_on(&tags(&["!linux"]), &active));
    assert!(supported_on(&tags(&["!windows"]), &active));
    // A negation rejects even when a positive entry matches.
    assert!(!supported_on(&tags(&["unix", "!linux"]), &active));
  }

  #[test]
  fn only_negations_means_everything_else() {
    let active = tags(&["macosx", "unix", "bsd"]);
    assert!(supported_on(&tags(&["!windows", "!cygwin"]), &active));
  }

  #[test]
  fn os_tags_are_most_specific_first() {
    assert_eq!(Os::Linux.tags(), tags(&["linux", "unix"]));
    assert_eq!(Os::MacOs.tags(), tags(&["macosx", "unix", "bsd"]));
  }

  #[test]
  fn default_platform_is_nonempty() {
    assert!(!default_platform().is_empty());
  }

  #[test]
  fn platform_string_has_arch_prefix_when_known() {
    let s = platform_string();
    assert!(!s.is_empty());
    if Arch::current().is_some() {
      assert!(s.contains('-'));
    }
  }
}
