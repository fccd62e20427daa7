//! Date-time values as they appear in iCalendar properties.
//!
//! A [`DateTimeValue`] keeps the wall-clock reading together with its zone so
//! that it can be written back in the same form it was read (`...Z`, local
//! with `TZID`, floating, or a whole `DATE`). Comparison and equality use the
//! absolute instant: the same moment expressed in two zones is the same
//! recurrence identity.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use ical_core::Property;
use tracing::warn;

use crate::error::{RecurrenceError, Result};

const DATE_FORMAT: &str = "%Y%m%d";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Time zone of a [`DateTimeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Utc,
    /// No zone: the wall clock applies wherever the reader is.
    /// Interpreted as UTC for comparisons.
    Floating,
    Named(Tz),
}

impl Zone {
    /// Resolve a `TZID` parameter.
    ///
    /// Unknown identifiers are not an error: they degrade to floating time so
    /// that the wall-clock reading is preserved.
    pub fn from_tzid(tzid: Option<&str>) -> Self {
        let Some(tzid) = tzid else {
            return Self::Floating;
        };
        if tzid.eq_ignore_ascii_case("UTC") || tzid.eq_ignore_ascii_case("Etc/UTC") {
            return Self::Utc;
        }
        match tzid.trim_start_matches('/').parse::<Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(_) => {
                warn!(tzid, "unknown TZID, treating value as floating time");
                Self::Floating
            }
        }
    }

    /// The `TZID` parameter value for this zone, if one is written.
    pub fn tzid(&self) -> Option<&'static str> {
        match self {
            Self::Named(tz) => Some(tz.name()),
            Self::Utc | Self::Floating => None,
        }
    }
}

/// A `DATE` or `DATE-TIME` value with its zone.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeValue {
    local: NaiveDateTime,
    zone: Zone,
    is_date: bool,
}

impl DateTimeValue {
    /// An absolute UTC instant, written with a trailing `Z`.
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        Self {
            local: instant.naive_utc(),
            zone: Zone::Utc,
            is_date: false,
        }
    }

    /// A wall-clock reading in the given zone.
    pub fn from_local(local: NaiveDateTime, zone: Zone) -> Self {
        Self {
            local,
            zone,
            is_date: false,
        }
    }

    /// A whole-day `DATE` value.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            local: date.and_time(chrono::NaiveTime::MIN),
            zone: Zone::Floating,
            is_date: true,
        }
    }

    /// Parse a property value (`YYYYMMDD`, `YYYYMMDDTHHMMSS` or `YYYYMMDDTHHMMSSZ`).
    ///
    /// `tzid` is the `TZID` parameter of the owning property; it is ignored for
    /// UTC and `DATE` values.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidValue` if the text matches none of the forms.
    pub fn parse(value: &str, tzid: Option<&str>) -> Result<Self> {
        let value = value.trim();
        let invalid = || RecurrenceError::invalid_value("DATE-TIME", value);

        if value.len() == 8 {
            let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())?;
            return Ok(Self::from_date(date));
        }

        if let Some(utc) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
            let local = NaiveDateTime::parse_from_str(utc, LOCAL_FORMAT).map_err(|_| invalid())?;
            return Ok(Self::from_local(local, Zone::Utc));
        }

        let local = NaiveDateTime::parse_from_str(value, LOCAL_FORMAT).map_err(|_| invalid())?;
        Ok(Self::from_local(local, Zone::from_tzid(tzid)))
    }

    /// Parse the value of a single-valued date property such as `DTSTART`.
    pub fn from_property(property: &Property) -> Result<Self> {
        Self::parse(&property.value, property.param_value("TZID"))
    }

    /// Render this value as a property, adding `TZID` or `VALUE=DATE` as needed.
    pub fn to_property(&self, name: &str) -> Property {
        let mut property = Property::new(name, self.to_ical());
        if self.is_date {
            property = property.with_param("VALUE", "DATE");
        } else if let Some(tzid) = self.zone.tzid() {
            property = property.with_param("TZID", tzid);
        }
        property
    }

    /// The value text, without any `TZID`.
    pub fn to_ical(&self) -> String {
        if self.is_date {
            return self.local.format(DATE_FORMAT).to_string();
        }
        match self.zone {
            Zone::Utc => format!("{}Z", self.local.format(LOCAL_FORMAT)),
            Zone::Floating | Zone::Named(_) => self.local.format(LOCAL_FORMAT).to_string(),
        }
    }

    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn is_date(&self) -> bool {
        self.is_date
    }

    pub fn tzid(&self) -> Option<&'static str> {
        if self.is_date {
            return None;
        }
        self.zone.tzid()
    }

    /// The absolute instant. Floating and `DATE` values are read as UTC.
    ///
    /// A wall-clock time inside a DST gap moves forward by one hour; an
    /// ambiguous time inside a fold takes the earlier instant.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self.zone {
            Zone::Named(tz) if !self.is_date => resolve_local(&tz, self.local).with_timezone(&Utc),
            _ => Utc.from_utc_datetime(&self.local),
        }
    }

    /// Seconds since the Unix epoch of [`DateTimeValue::to_utc`].
    pub fn unix_time(&self) -> i64 {
        self.to_utc().timestamp()
    }

    /// Shift the wall clock by `duration`, keeping the zone.
    pub fn add_duration(&self, duration: TimeDelta) -> Self {
        let local = self
            .local
            .checked_add_signed(duration)
            .unwrap_or(self.local);
        Self { local, ..*self }
    }

    /// Instant difference `self - other`.
    pub fn subtract(&self, other: &Self) -> TimeDelta {
        self.to_utc() - other.to_utc()
    }

    /// Express the same instant in another zone.
    ///
    /// `DATE` values are returned unchanged. When either side is floating
    /// there is no instant to preserve, so the wall clock is kept and only
    /// the zone changes.
    pub fn convert_to_zone(&self, zone: Zone) -> Self {
        if self.is_date || self.zone == zone {
            return *self;
        }
        if zone == Zone::Floating || self.zone == Zone::Floating {
            return Self { zone, ..*self };
        }
        let instant = self.to_utc();
        let local = match zone {
            Zone::Named(tz) => instant.with_timezone(&tz).naive_local(),
            Zone::Utc | Zone::Floating => instant.naive_utc(),
        };
        Self::from_local(local, zone)
    }

    /// Whether both values are written identically (same wall clock, zone and kind).
    pub fn is_identical(&self, other: &Self) -> bool {
        self.local == other.local && self.zone == other.zone && self.is_date == other.is_date
    }
}

/// Map a wall-clock time in `tz` onto an instant.
pub(crate) fn resolve_local(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = local + TimeDelta::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&local))
        }
    }
}

impl PartialEq for DateTimeValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_utc() == other.to_utc()
    }
}

impl Eq for DateTimeValue {}

impl PartialOrd for DateTimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateTimeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc().cmp(&other.to_utc())
    }
}

impl fmt::Display for DateTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tzid() {
            Some(tzid) => write!(f, "{};TZID={}", self.to_ical(), tzid),
            None => f.write_str(&self.to_ical()),
        }
    }
}
