//! `PERIOD` values and the entries of `RDATE`/`EXDATE` properties.

use chrono::TimeDelta;
use ical_core::Property;

use crate::datetime::DateTimeValue;
use crate::duration::{format_duration, parse_duration};
use crate::error::{RecurrenceError, Result};

/// The second half of a period: an explicit end or a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEnd {
    End(DateTimeValue),
    Duration(TimeDelta),
}

/// A `PERIOD` value (RFC 5545 §3.3.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTimeValue,
    pub end: PeriodEnd,
}

impl Period {
    pub fn new(start: DateTimeValue, end: PeriodEnd) -> Self {
        Self { start, end }
    }

    /// Parse `start/end` or `start/duration`.
    pub fn parse(value: &str, tzid: Option<&str>) -> Result<Self> {
        let (start, end) = value
            .split_once('/')
            .ok_or_else(|| RecurrenceError::invalid_value("PERIOD", value))?;
        let start = DateTimeValue::parse(start, tzid)?;
        let end = if end.trim_start().starts_with(['P', 'p', '+', '-']) {
            PeriodEnd::Duration(parse_duration(end)?)
        } else {
            PeriodEnd::End(DateTimeValue::parse(end, tzid)?)
        };
        Ok(Self { start, end })
    }

    pub fn to_ical(&self) -> String {
        match &self.end {
            PeriodEnd::End(end) => format!("{}/{}", self.start.to_ical(), end.to_ical()),
            PeriodEnd::Duration(duration) => {
                format!("{}/{}", self.start.to_ical(), format_duration(*duration))
            }
        }
    }

    /// The end of the period, expressed in the start's zone.
    pub fn end(&self) -> DateTimeValue {
        match &self.end {
            PeriodEnd::End(end) => end.convert_to_zone(self.start.zone()),
            PeriodEnd::Duration(duration) => self.start.add_duration(*duration),
        }
    }

    pub fn duration(&self) -> TimeDelta {
        match &self.end {
            PeriodEnd::End(end) => end.subtract(&self.start),
            PeriodEnd::Duration(duration) => *duration,
        }
    }
}

/// One value of an `RDATE` or `EXDATE` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceDate {
    DateTime(DateTimeValue),
    /// Only valid in `RDATE`: an extra instance with its own end.
    Period(Period),
}

impl RecurrenceDate {
    /// The instant at which the occurrence starts.
    pub fn effective_start(&self) -> DateTimeValue {
        match self {
            Self::DateTime(value) => *value,
            Self::Period(period) => period.start,
        }
    }

    pub fn as_period(&self) -> Option<&Period> {
        match self {
            Self::Period(period) => Some(period),
            Self::DateTime(_) => None,
        }
    }

    /// Parse every comma-separated value of an `RDATE`/`EXDATE` property.
    pub fn parse_property(property: &Property) -> Result<Vec<Self>> {
        let tzid = property.param_value("TZID");
        let is_period = property
            .param_value("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("PERIOD"));

        property
            .value
            .split(',')
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                if is_period || v.contains('/') {
                    Period::parse(v, tzid).map(Self::Period)
                } else {
                    DateTimeValue::parse(v, tzid).map(Self::DateTime)
                }
            })
            .collect()
    }

    /// Render as a single-valued property.
    pub fn to_property(&self, name: &str) -> Property {
        match self {
            Self::DateTime(value) => value.to_property(name),
            Self::Period(period) => {
                let mut property =
                    Property::new(name, period.to_ical()).with_param("VALUE", "PERIOD");
                if let Some(tzid) = period.start.tzid() {
                    property = property.with_param("TZID", tzid);
                }
                property
            }
        }
    }
}
