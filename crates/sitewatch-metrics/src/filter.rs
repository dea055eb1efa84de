//! Predicates applied to raw readings before aggregation.
//!
//! A [`ReadingFilter`] names a reading field, an operator and a value, for
//! example `quality = good`. Filters that do not fit the field (a number
//! compared against `quality`, say) never match, so the reading is dropped.

use serde::{Deserialize, Serialize};

use crate::aggregate::approx_eq;
use crate::error::{MetricsError, Result};
use crate::types::SensorReading;

/// The reading field a filter inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingField {
    /// The quality flag.
    Quality,
    /// The numeric value.
    Value,
    /// The unit string.
    Unit,
    /// The sensor id.
    SensorId,
}

impl ReadingField {
    /// Returns the field name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Value => "value",
            Self::Unit => "unit",
            Self::SensorId => "sensor_id",
        }
    }
}

/// Comparison used by a reading filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Field equals the value.
    Equals,
    /// Field differs from the value.
    NotEquals,
    /// Field is strictly greater (numeric fields only).
    GreaterThan,
    /// Field is greater or equal (numeric fields only).
    GreaterThanOrEqual,
    /// Field is strictly less (numeric fields only).
    LessThan,
    /// Field is less or equal (numeric fields only).
    LessThanOrEqual,
    /// Field is one of a list.
    In,
    /// Field is none of a list.
    NotIn,
}

/// The right-hand side of a reading filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A number.
    Number(f64),
    /// A string.
    Text(String),
    /// A list of strings.
    List(Vec<String>),
}

/// A predicate over a single reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingFilter {
    /// The field to inspect.
    pub field: ReadingField,
    /// The comparison.
    pub operator: FilterOperator,
    /// The value to compare against.
    pub value: FilterValue,
}

impl ReadingFilter {
    /// Creates a filter after checking the value fits the field and operator.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidFilter` for combinations that can never match.
    pub fn new(field: ReadingField, operator: FilterOperator, value: FilterValue) -> Result<Self> {
        let filter = Self {
            field,
            operator,
            value,
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Shorthand for `field = value` on a text field.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidFilter` if `field` is numeric.
    pub fn equals(field: ReadingField, value: impl Into<String>) -> Result<Self> {
        Self::new(field, FilterOperator::Equals, FilterValue::Text(value.into()))
    }

    /// Checks the value type against the field and operator.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidFilter` describing the mismatch.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| MetricsError::InvalidFilter {
            field: self.field.as_str().to_string(),
            reason: reason.to_string(),
        };

        match (&self.operator, &self.value) {
            (FilterOperator::In | FilterOperator::NotIn, FilterValue::List(_)) => {
                if self.field == ReadingField::Value {
                    return Err(invalid("list membership is not supported on numeric fields"));
                }
                Ok(())
            }
            (FilterOperator::In | FilterOperator::NotIn, _) => {
                Err(invalid("membership operators require a list value"))
            }
            (_, FilterValue::List(_)) => Err(invalid("list values require in/not_in")),
            (
                FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual,
                FilterValue::Number(_),
            ) if self.field == ReadingField::Value => Ok(()),
            (
                FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual,
                _,
            ) => Err(invalid("ordering operators require a numeric value on the value field")),
            (_, FilterValue::Number(_)) if self.field != ReadingField::Value => {
                Err(invalid("expected a text value"))
            }
            (_, FilterValue::Text(_)) if self.field == ReadingField::Value => {
                Err(invalid("expected a numeric value"))
            }
            _ => Ok(()),
        }
    }

    /// Returns true if the reading passes this filter.
    #[must_use]
    pub fn matches(&self, reading: &SensorReading) -> bool {
        match self.field {
            ReadingField::Value => self.matches_number(reading.value),
            ReadingField::Quality => self.matches_text(reading.quality.as_str()),
            ReadingField::Unit => self.matches_text(&reading.unit),
            ReadingField::SensorId => self.matches_text(&reading.sensor_id),
        }
    }

    fn matches_number(&self, actual: f64) -> bool {
        let FilterValue::Number(expected) = self.value else {
            return false;
        };

        match self.operator {
            FilterOperator::Equals => approx_eq(actual, expected),
            FilterOperator::NotEquals => !approx_eq(actual, expected),
            FilterOperator::GreaterThan => actual > expected,
            FilterOperator::GreaterThanOrEqual => actual >= expected,
            FilterOperator::LessThan => actual < expected,
            FilterOperator::LessThanOrEqual => actual <= expected,
            FilterOperator::In | FilterOperator::NotIn => false,
        }
    }

    fn matches_text(&self, actual: &str) -> bool {
        match (&self.operator, &self.value) {
            (FilterOperator::Equals, FilterValue::Text(expected)) => {
                actual.eq_ignore_ascii_case(expected)
            }
            (FilterOperator::NotEquals, FilterValue::Text(expected)) => {
                !actual.eq_ignore_ascii_case(expected)
            }
            (FilterOperator::In, FilterValue::List(options)) => {
                options.iter().any(|o| actual.eq_ignore_ascii_case(o))
            }
            (FilterOperator::NotIn, FilterValue::List(options)) => {
                !options.iter().any(|o| actual.eq_ignore_ascii_case(o))
            }
            _ => false,
        }
    }
}

/// Returns true if the reading passes every filter.
#[must_use]
pub fn passes_all(filters: &[ReadingFilter], reading: &SensorReading) -> bool {
    filters.iter().all(|f| f.matches(reading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReadingQuality;
    use chrono::Utc;

    fn reading(value: f64, quality: ReadingQuality) -> SensorReading {
        SensorReading::new("meter-1", Utc::now(), value, "kWh").with_quality(quality)
    }

    #[test]
    fn quality_equals_good() {
        let filter = ReadingFilter::equals(ReadingField::Quality, "good").unwrap();

        assert!(filter.matches(&reading(1.0, ReadingQuality::Good)));
        assert!(!filter.matches(&reading(1.0, ReadingQuality::Warning)));
        assert!(!filter.matches(&reading(1.0, ReadingQuality::Error)));
    }

    #[test]
    fn quality_not_in_list() {
        let filter = ReadingFilter::new(
            ReadingField::Quality,
            FilterOperator::NotIn,
            FilterValue::List(vec!["error".to_string()]),
        )
        .unwrap();

        assert!(filter.matches(&reading(1.0, ReadingQuality::Warning)));
        assert!(!filter.matches(&reading(1.0, ReadingQuality::Error)));
    }

    #[test]
    fn value_ordering() {
        let filter = ReadingFilter::new(
            ReadingField::Value,
            FilterOperator::GreaterThanOrEqual,
            FilterValue::Number(0.0),
        )
        .unwrap();

        assert!(filter.matches(&reading(0.0, ReadingQuality::Good)));
        assert!(!filter.matches(&reading(-0.5, ReadingQuality::Good)));
    }

    #[test]
    fn value_equality_tolerates_rounding() {
        let filter = ReadingFilter::new(
            ReadingField::Value,
            FilterOperator::Equals,
            FilterValue::Number(0.3),
        )
        .unwrap();

        assert!(filter.matches(&reading(0.1 + 0.2, ReadingQuality::Good)));
        assert!(!filter.matches(&reading(0.31, ReadingQuality::Good)));
    }

    #[test]
    fn text_value_on_numeric_field_rejected() {
        let result = ReadingFilter::new(
            ReadingField::Value,
            FilterOperator::Equals,
            FilterValue::Text("high".to_string()),
        );
        assert!(matches!(result, Err(MetricsError::InvalidFilter { .. })));
    }

    #[test]
    fn ordering_on_text_field_rejected() {
        let result = ReadingFilter::new(
            ReadingField::Quality,
            FilterOperator::GreaterThan,
            FilterValue::Number(1.0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn membership_requires_list() {
        let result = ReadingFilter::new(
            ReadingField::Unit,
            FilterOperator::In,
            FilterValue::Text("kWh".to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_deserialized_filter_never_matches() {
        let json = r#"{"field":"quality","operator":"equals","value":1.0}"#;
        let filter: ReadingFilter = serde_json::from_str(json).unwrap();

        assert!(filter.validate().is_err());
        assert!(!filter.matches(&reading(1.0, ReadingQuality::Good)));
    }

    #[test]
    fn passes_all_requires_every_filter() {
        let filters = vec![
            ReadingFilter::equals(ReadingField::Quality, "good").unwrap(),
            ReadingFilter::equals(ReadingField::Unit, "kWh").unwrap(),
        ];

        assert!(passes_all(&filters, &reading(1.0, ReadingQuality::Good)));
        assert!(!passes_all(&filters, &reading(1.0, ReadingQuality::Error)));
        assert!(passes_all(&[], &reading(1.0, ReadingQuality::Error)));
    }
}
