//! Normalization of raw federation payload values.
//!
//! Free-text sanitization, the canonical status vocabulary with its synonym
//! mapping, and tolerant date canonicalization to `YYYY-MM-DD`.

use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a sanitized free-text field.
const MAX_TEXT_LEN: usize = 255;

/// Canonical registry of record statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Running,
    Finished,
    Upcoming,
    Cancelled,
    Suspended,
    Postponed,
    Unknown,
}

impl RecordStatus {
    /// Return the canonical string representation for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Running => "Running",
            RecordStatus::Finished => "Finished",
            RecordStatus::Upcoming => "Upcoming",
            RecordStatus::Cancelled => "Cancelled",
            RecordStatus::Suspended => "Suspended",
            RecordStatus::Postponed => "Postponed",
            RecordStatus::Unknown => "Unknown",
        }
    }

    /// Parse a canonical status string back into the enum.
    pub fn from_canonical(value: &str) -> Self {
        match value {
            "Running" => RecordStatus::Running,
            "Finished" => RecordStatus::Finished,
            "Upcoming" => RecordStatus::Upcoming,
            "Cancelled" => RecordStatus::Cancelled,
            "Suspended" => RecordStatus::Suspended,
            "Postponed" => RecordStatus::Postponed,
            _ => RecordStatus::Unknown,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete registry of canonical statuses.
pub const ALL_RECORD_STATUSES: &[RecordStatus] = &[
    RecordStatus::Running,
    RecordStatus::Finished,
    RecordStatus::Upcoming,
    RecordStatus::Cancelled,
    RecordStatus::Suspended,
    RecordStatus::Postponed,
    RecordStatus::Unknown,
];

/// Map a raw status value from the federation payload onto the canonical
/// vocabulary, case-insensitively and with the synonyms the gateway is known
/// to emit.
pub fn normalize_status(raw: &str) -> RecordStatus {
    match raw.trim().to_lowercase().as_str() {
        "running" | "live" | "in progress" | "inprogress" | "playing" | "started" => {
            RecordStatus::Running
        }
        "finished" | "final" | "completed" | "complete" | "ended" | "closed" => {
            RecordStatus::Finished
        }
        "upcoming" | "scheduled" | "planned" | "future" | "notstarted" | "not started" => {
            RecordStatus::Upcoming
        }
        "cancelled" | "canceled" | "abandoned" => RecordStatus::Cancelled,
        "suspended" | "interrupted" | "paused" => RecordStatus::Suspended,
        "postponed" | "delayed" | "rescheduled" => RecordStatus::Postponed,
        _ => RecordStatus::Unknown,
    }
}

/// Sanitize a free-text field: trim, collapse internal whitespace, strip
/// control characters, and cap the length at 255 characters with an ellipsis.
pub fn sanitize_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.chars().count() > MAX_TEXT_LEN {
        let truncated: String = cleaned.chars().take(MAX_TEXT_LEN - 1).collect();
        format!("{truncated}…")
    } else {
        cleaned
    }
}

/// Date formats accepted from the federation payload, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
];

/// Convert a raw date value to canonical `YYYY-MM-DD`.
///
/// Empty or unparseable input falls back to the current date; that is a
/// warning, not an error, because the federation feed routinely omits dates
/// on provisional fixtures.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();

    if !trimmed.is_empty() {
        // ISO timestamps carry a time suffix; keep the date part only.
        let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
                return date.format("%Y-%m-%d").to_string();
            }
        }
    }

    let today = Utc::now().date_naive();
    tracing::warn!(raw = %raw, "Unparseable date in payload, defaulting to current date");
    today.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_synonyms_map_to_canonical_values() {
        assert_eq!(normalize_status("live"), RecordStatus::Running);
        assert_eq!(normalize_status("In Progress"), RecordStatus::Running);
        assert_eq!(normalize_status("PLAYING"), RecordStatus::Running);
        assert_eq!(normalize_status("Final"), RecordStatus::Finished);
        assert_eq!(normalize_status("scheduled"), RecordStatus::Upcoming);
        assert_eq!(normalize_status("canceled"), RecordStatus::Cancelled);
        assert_eq!(normalize_status("Interrupted"), RecordStatus::Suspended);
        assert_eq!(normalize_status("delayed"), RecordStatus::Postponed);
        assert_eq!(normalize_status("???"), RecordStatus::Unknown);
    }

    #[test]
    fn canonical_round_trip() {
        for status in ALL_RECORD_STATUSES {
            assert_eq!(RecordStatus::from_canonical(status.as_str()), *status);
        }
    }

    #[test]
    fn sanitize_collapses_whitespace_and_strips_controls() {
        assert_eq!(
            sanitize_text("  Rio   de\tJaneiro \u{0007} Open \n"),
            "Rio de Janeiro Open"
        );
    }

    #[test]
    fn sanitize_caps_length_with_ellipsis() {
        let long = "a".repeat(400);
        let sanitized = sanitize_text(&long);
        assert_eq!(sanitized.chars().count(), 255);
        assert!(sanitized.ends_with('…'));
    }

    #[test]
    fn iso_dates_pass_through() {
        assert_eq!(normalize_date("2025-06-15"), "2025-06-15");
        assert_eq!(normalize_date("2025-06-15T14:30:00Z"), "2025-06-15");
    }

    #[test]
    fn day_first_dates_are_converted() {
        assert_eq!(normalize_date("15-06-2025"), "2025-06-15");
        assert_eq!(normalize_date("15.06.2025"), "2025-06-15");
    }

    #[test]
    fn month_first_dates_are_converted_when_unambiguous() {
        // Day slot exceeds 12, so only MM-DD-YYYY parses.
        assert_eq!(normalize_date("06-15-2025"), "2025-06-15");
    }

    #[test]
    fn invalid_date_falls_back_to_today() {
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(normalize_date("not-a-date"), today);
        assert_eq!(normalize_date(""), today);
    }
}
