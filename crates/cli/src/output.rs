//! Terminal output: status lines, stats, build summaries and JSON.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use fatdeps_lib::execute::ProductSummary;
use owo_colors::{AnsiColors, OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Separates an aggregate target from its children.
pub const ARROW: &str = "→";

/// Kind of a status line. Failures and warnings go to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Done,
  Failed,
  Warning,
  Note,
  Pending,
}

impl Status {
  pub fn mark(self) -> &'static str {
    match self {
      Status::Done => "✓",
      Status::Failed => "✗",
      Status::Warning => "⚠",
      Status::Note => "•",
      Status::Pending => "~",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Status::Done => AnsiColors::Green,
      Status::Failed => AnsiColors::Red,
      Status::Warning | Status::Pending => AnsiColors::Yellow,
      Status::Note => AnsiColors::Blue,
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Status::Failed | Status::Warning)
  }

  /// Print `message` behind this status' mark. Messages on stderr take the mark's color.
  pub fn print(self, message: &str) {
    let color = self.color();
    if self.to_stderr() {
      eprintln!(
        "{} {}",
        self.mark().if_supports_color(Stream::Stderr, |m| m.color(color)),
        message.if_supports_color(Stream::Stderr, |m| m.color(color))
      );
    } else {
      println!(
        "{} {}",
        self.mark().if_supports_color(Stream::Stdout, |m| m.color(color)),
        message
      );
    }
  }
}

/// Indented `label: value` line.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |l| l.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Binary units, one decimal above a kibibyte.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// `850ms`, `12.34s` or `3m 7s`.
pub fn format_duration(duration: Duration) -> String {
  match duration.as_secs() {
    0 => format!("{}ms", duration.subsec_millis()),
    secs @ 1..60 => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    secs => format!("{}m {}s", secs / 60, secs % 60),
  }
}

/// `5 built, 2 fresh, 1 failed`; zero counts are left out.
pub fn format_summary(summary: &ProductSummary) -> String {
  let parts: Vec<String> = [
    (summary.built, "built"),
    (summary.pending, "pending"),
    (summary.fresh, "fresh"),
    (summary.failed, "failed"),
    (summary.skipped, "skipped"),
  ]
  .into_iter()
  .filter(|(count, _)| *count > 0)
  .map(|(count, what)| format!("{} {}", count, what))
  .collect();

  if parts.is_empty() {
    "nothing to do".to_string()
  } else {
    parts.join(", ")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_leaves_out_zero_counts() {
    let summary = ProductSummary {
      product: "OpenSSL".to_string(),
      built: 3,
      fresh: 0,
      pending: 0,
      failed: 1,
      skipped: 4,
    };
    assert_eq!(format_summary(&summary), "3 built, 1 failed, 4 skipped");
    assert_eq!(format_summary(&ProductSummary::default()), "nothing to do");
  }

  #[test]
  fn bytes_use_binary_units() {
    assert_eq!(format_bytes(500), "500 B");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024), "2048.0 GB");
  }

  #[test]
  fn durations_scale_with_length() {
    assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
    assert_eq!(format_duration(Duration::from_millis(12_345)), "12.34s");
    assert_eq!(format_duration(Duration::from_secs(187)), "3m 7s");
  }

  #[test]
  fn failures_and_warnings_go_to_stderr() {
    assert!(Status::Failed.to_stderr());
    assert!(Status::Warning.to_stderr());
    assert!(!Status::Pending.to_stderr());
    assert_eq!(Status::Done.mark(), "✓");
  }
}
