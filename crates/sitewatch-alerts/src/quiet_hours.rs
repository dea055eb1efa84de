//! Quiet-hours suppression.
//!
//! The delivery instant is converted into the quiet-hours timezone before the
//! wall-clock comparison. A window such as `23:00`-`07:00` wraps past midnight.
//! Critical alerts always bypass quiet hours.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::{in_circular_window, is_weekend, parse_timezone, ClockTime};
use crate::types::AlertSeverity;

/// A timezone-aware interval during which non-exempt severities are held back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    /// Whether quiet hours apply at all.
    #[serde(default)]
    pub enabled: bool,
    /// Start of the quiet window (inclusive).
    pub start_time: ClockTime,
    /// End of the quiet window (exclusive).
    pub end_time: ClockTime,
    /// IANA timezone the window is expressed in.
    pub timezone: String,
    /// Severities that are delivered anyway.
    #[serde(default)]
    pub exceptions: Vec<AlertSeverity>,
    /// Treat all of Saturday and Sunday as quiet.
    #[serde(default)]
    pub weekend_override: bool,
}

impl QuietHours {
    /// Creates enabled quiet hours.
    #[must_use]
    pub fn new(start_time: ClockTime, end_time: ClockTime, timezone: impl Into<String>) -> Self {
        Self {
            enabled: true,
            start_time,
            end_time,
            timezone: timezone.into(),
            exceptions: Vec::new(),
            weekend_override: false,
        }
    }

    /// Adds severities that bypass quiet hours.
    #[must_use]
    pub fn with_exceptions(mut self, exceptions: Vec<AlertSeverity>) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Sets the weekend override.
    #[must_use]
    pub const fn with_weekend_override(mut self, weekend_override: bool) -> Self {
        self.weekend_override = weekend_override;
        self
    }

    /// Returns true if `at` falls inside quiet hours.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` if the timezone is unknown.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let local = at.with_timezone(&parse_timezone(&self.timezone)?);
        if self.weekend_override && is_weekend(local.weekday()) {
            return Ok(true);
        }
        Ok(in_circular_window(
            local.time(),
            self.start_time.time(),
            self.end_time.time(),
        ))
    }

    /// Returns true if `severity` is delivered during quiet hours.
    #[must_use]
    pub fn is_exempt(&self, severity: AlertSeverity) -> bool {
        severity == AlertSeverity::Critical || self.exceptions.contains(&severity)
    }

    /// Returns true if an alert of `severity` must be held back at `at`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` if the timezone is unknown.
    pub fn suppresses(&self, severity: AlertSeverity, at: DateTime<Utc>) -> Result<bool> {
        if self.is_exempt(severity) {
            return Ok(false);
        }
        self.is_active_at(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn overnight(tz: &str) -> QuietHours {
        QuietHours::new("23:00".parse().unwrap(), "07:00".parse().unwrap(), tz)
    }

    #[test_case(22, 59, false ; "just before start")]
    #[test_case(23, 0, true ; "at start")]
    #[test_case(3, 0, true ; "middle of night")]
    #[test_case(7, 0, false ; "at end")]
    #[test_case(12, 0, false ; "midday")]
    fn overnight_window_utc(hour: u32, minute: u32, expected: bool) {
        let at = Utc.with_ymd_and_hms(2024, 3, 12, hour, minute, 0).unwrap();
        assert_eq!(overnight("UTC").is_active_at(at).unwrap(), expected);
    }

    #[test]
    fn converts_into_quiet_hours_timezone() {
        let quiet = overnight("America/New_York");
        // 04:00 UTC on 2024-03-12 is 00:00 EDT.
        let at = Utc.with_ymd_and_hms(2024, 3, 12, 4, 0, 0).unwrap();
        assert!(quiet.is_active_at(at).unwrap());
        // 12:00 UTC is 08:00 EDT.
        let morning = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        assert!(!quiet.is_active_at(morning).unwrap());
    }

    #[test]
    fn disabled_never_active() {
        let mut quiet = overnight("UTC");
        quiet.enabled = false;
        let at = Utc.with_ymd_and_hms(2024, 3, 12, 2, 0, 0).unwrap();
        assert!(!quiet.is_active_at(at).unwrap());
    }

    #[test]
    fn critical_always_exempt() {
        let quiet = overnight("UTC");
        let at = Utc.with_ymd_and_hms(2024, 3, 12, 2, 0, 0).unwrap();
        assert!(!quiet.suppresses(AlertSeverity::Critical, at).unwrap());
        assert!(quiet.suppresses(AlertSeverity::Medium, at).unwrap());
    }

    #[test]
    fn exceptions_bypass() {
        let quiet = overnight("UTC").with_exceptions(vec![AlertSeverity::High]);
        let at = Utc.with_ymd_and_hms(2024, 3, 12, 2, 0, 0).unwrap();
        assert!(!quiet.suppresses(AlertSeverity::High, at).unwrap());
        assert!(quiet.suppresses(AlertSeverity::Low, at).unwrap());
    }

    #[test]
    fn weekend_override_covers_whole_day() {
        let quiet = overnight("UTC").with_weekend_override(true);
        let saturday_noon = Utc.with_ymd_and_hms(2024, 3, 16, 12, 0, 0).unwrap();
        assert!(quiet.is_active_at(saturday_noon).unwrap());

        let tuesday_noon = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        assert!(!quiet.is_active_at(tuesday_noon).unwrap());
    }

    #[test]
    fn unknown_timezone_errors() {
        let quiet = overnight("Nowhere/Place");
        assert!(quiet.is_active_at(Utc::now()).is_err());
    }
}
