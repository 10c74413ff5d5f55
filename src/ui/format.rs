use chrono::Duration;
use ratatui::prelude::Color;
use rehydrate::cache::{SyncErrorKind, SyncReport};

/// Truncate to `max_chars` characters, adding "..." if truncated
pub fn truncate(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Compact age such as "12s", "5m" or "3d"
pub fn format_age(age: Duration) -> String {
  let secs = age.num_seconds().max(0);
  match secs {
    0..=59 => format!("{}s", secs),
    60..=3599 => format!("{}m", secs / 60),
    3600..=86399 => format!("{}h", secs / 3600),
    _ => format!("{}d", secs / 86400),
  }
}

/// Color for the sync report shown in the status bar
pub fn report_color(report: &SyncReport) -> Color {
  match report.error_kind() {
    None => Color::Green,
    Some(SyncErrorKind::Decode) => Color::Yellow,
    Some(SyncErrorKind::Encode | SyncErrorKind::Io) => Color::Red,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_counts_chars() {
    assert_eq!(truncate("ééééé", 4), "é...");
  }

  #[test]
  fn test_format_age_units() {
    assert_eq!(format_age(Duration::seconds(-3)), "0s");
    assert_eq!(format_age(Duration::seconds(59)), "59s");
    assert_eq!(format_age(Duration::minutes(5)), "5m");
    assert_eq!(format_age(Duration::hours(2)), "2h");
    assert_eq!(format_age(Duration::days(3)), "3d");
  }

  #[test]
  fn test_report_color() {
    assert_eq!(report_color(&SyncReport::NoSnapshot), Color::Green);
  }
}
