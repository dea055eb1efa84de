//! Wall-clock schedules evaluated in a named IANA timezone.
//!
//! Every schedule here converts the UTC instant into its own timezone before
//! comparing. Windows whose end is before their start wrap past midnight.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AlertError, Result};

/// Resolves an IANA timezone name such as `America/New_York`.
///
/// # Errors
///
/// Returns `AlertError::InvalidTimezone` if the name is unknown.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    Tz::from_str(name.trim()).map_err(|_| AlertError::InvalidTimezone {
        name: name.to_string(),
    })
}

/// Returns true if `t` lies in `[start, end)`, wrapping past midnight when
/// `end <= start`. An empty window (`start == end`) contains nothing.
#[must_use]
pub fn in_circular_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        t >= start && t < end
    } else {
        t >= start || t < end
    }
}

/// Returns true for Saturday and Sunday.
#[must_use]
pub const fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// A time of day written as `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    /// Creates a clock time from hour and minute.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfiguration` if out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| AlertError::InvalidConfiguration {
                reason: format!("invalid time of day {hour:02}:{minute:02}"),
            })
    }

    /// Returns the inner time.
    #[must_use]
    pub const fn time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for ClockTime {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Self)
            .map_err(|_| AlertError::InvalidConfiguration {
                reason: format!("invalid time of day '{s}', expected HH:MM"),
            })
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.second() == 0 {
            write!(f, "{}", self.0.format("%H:%M"))
        } else {
            write!(f, "{}", self.0.format("%H:%M:%S"))
        }
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The hours a building is considered staffed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// Opening time.
    pub start: ClockTime,
    /// Closing time.
    pub end: ClockTime,
    /// IANA timezone of the site.
    pub timezone: String,
    /// Whether weekends count as outside business hours.
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: ClockTime(NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()),
            end: ClockTime(NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default()),
            timezone: "UTC".to_string(),
            weekdays_only: true,
        }
    }
}

impl BusinessHours {
    /// Returns true if `at` falls within business hours in the site timezone.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` if the timezone is unknown.
    pub fn contains(&self, at: DateTime<Utc>) -> Result<bool> {
        let local = at.with_timezone(&parse_timezone(&self.timezone)?);
        if self.weekdays_only && is_weekend(local.weekday()) {
            return Ok(false);
        }
        Ok(in_circular_window(local.time(), self.start.time(), self.end.time()))
    }

    /// Returns true if `at` is a Saturday or Sunday in the site timezone.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` if the timezone is unknown.
    pub fn is_weekend(&self, at: DateTime<Utc>) -> Result<bool> {
        let local = at.with_timezone(&parse_timezone(&self.timezone)?);
        Ok(is_weekend(local.weekday()))
    }
}

/// A recurring on-call shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnCallSchedule {
    /// Days of week the shift runs (0 = Sunday, 6 = Saturday).
    pub days_of_week: Vec<u8>,
    /// Shift start.
    pub start: ClockTime,
    /// Shift end (may wrap past midnight).
    pub end: ClockTime,
    /// IANA timezone of the shift.
    pub timezone: String,
}

impl OnCallSchedule {
    /// Returns true if the shift covers `at`.
    ///
    /// An overnight shift belongs to the day it starts on.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` if the timezone is unknown.
    pub fn is_on_call(&self, at: DateTime<Utc>) -> Result<bool> {
        let local = at.with_timezone(&parse_timezone(&self.timezone)?);
        let (start, end, t) = (self.start.time(), self.end.time(), local.time());
        if !in_circular_window(t, start, end) {
            return Ok(false);
        }

        let today = local.weekday().num_days_from_sunday() as u8;
        let shift_day = if start > end && t < end {
            (today + 6) % 7
        } else {
            today
        };
        Ok(self.days_of_week.contains(&shift_day))
    }
}
