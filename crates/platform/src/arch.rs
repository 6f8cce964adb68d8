use std::fmt;

/// Machine architectures luadist recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86,
  X86_64,
  Aarch64,
}

impl Arch {
  /// Detect the current architecture at runtime.
  pub fn current() -> Option<Arch> {
    match std::env::consts::ARCH {
      "x86" => Some(Arch::X86),
      "x86_64" => Some(Arch::X86_64),
      "aarch64" => Some(Arch::Aarch64),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Arch::X86 => "x86",
      Arch::X86_64 => "x86_64",
      Arch::Aarch64 => "aarch64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_matches_identifier() {
    assert_eq!(Arch::X86_64.to_string(), "x86_64");
    assert_eq!(Arch::Aarch64.to_string(), "aarch64");
  }
}
