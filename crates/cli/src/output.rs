//! CLI output formatting.
//!
//! Colored status lines that degrade to plain text on non-terminal
//! streams.

use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.cyan()),
    message
  );
}

pub fn print_step(message: &str) {
  println!(
    "{} {}",
    symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}
