//! `DD/MM/YYYY HH:MM` parsing for the scheduling step.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Display format used when storing the requested date.
pub const SCHEDULE_FORMAT: &str = "%d/%m/%Y %H:%M";

static SCHEDULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})/(\d{2})/(\d{4})\s+(\d{2}):(\d{2})$").expect("valid schedule regex")
});

/// A validated requested date/time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub at: NaiveDateTime,
}

impl Schedule {
    /// Canonical `DD/MM/YYYY HH:MM` text.
    pub fn display(&self) -> String {
        self.at.format(SCHEDULE_FORMAT).to_string()
    }
}

/// Parse free text as `DD/MM/YYYY HH:MM`. The value must also be a real
/// calendar date and time (no 31/02, no 25:00).
pub fn parse_schedule(input: &str) -> Option<Schedule> {
    let caps = SCHEDULE_RE.captures(input.trim())?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let day = num(1)?;
    let month = num(2)?;
    let year = i32::try_from(num(3)?).ok()?;
    let hour = num(4)?;
    let minute = num(5)?;

    let at = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    Some(Schedule { at })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_datetime() {
        let s = parse_schedule("25/10/2025 14:30").unwrap();
        assert_eq!(s.display(), "25/10/2025 14:30");
        assert_eq!(
            s.at,
            NaiveDate::from_ymd_opt(2025, 10, 25)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn collapses_inner_whitespace() {
        let s = parse_schedule("  01/02/2026   09:05 ").unwrap();
        assert_eq!(s.display(), "01/02/2026 09:05");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "tomorrow",
            "25/10/2025",
            "25-10-2025 14:30",
            "5/10/2025 14:30",
            "25/10/2025 14:30 extra",
            "",
        ] {
            assert!(parse_schedule(bad).is_none(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(parse_schedule("31/02/2025 10:00").is_none());
        assert!(parse_schedule("10/13/2025 10:00").is_none());
        assert!(parse_schedule("10/10/2025 24:00").is_none());
        assert!(parse_schedule("10/10/2025 12:60").is_none());
    }
}
