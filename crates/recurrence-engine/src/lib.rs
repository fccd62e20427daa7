//! # recurrence-engine
//!
//! Recurrence sets for iCalendar events, to-dos and journals.
//!
//! A recurrence set is one master item (carrying `RRULE`, `RDATE` and
//! `EXDATE`) plus the stored exceptions that override single occurrences.
//! The engine answers which occurrences fall into a window, and lets a caller
//! edit or delete one occurrence, or one occurrence and all later ones,
//! without corrupting the rest of the series. Editing a later occurrence
//! "and all future" splits the series into two `UID`s joined by
//! `RELATED-TO;RELTYPE=SIBLING`, since most clients ignore
//! `RANGE=THISANDFUTURE`.
//!
//! Rule expansion wraps the `rrule` crate; time zones come from `chrono-tz`.
//!
//! ## Modules
//!
//! - [`manager`] — per-UID recurrence data, exceptions and enumeration
//! - [`item`] — recurring items with identity and dirty tracking
//! - [`set`] — recurrence sets, calendar loading, exception creation
//! - [`occurrence`] — forking and removing occurrences
//! - [`datetime`], [`duration`], [`period`], [`rule`] — iCalendar value types
//! - [`tracking`] — significant-change property set
//! - [`config`] — engine configuration
//! - [`error`] — Error types
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use recurrence_engine::{parse_calendar, EngineConfig};
//!
//! let ics = "BEGIN:VCALENDAR\r\n\
//!            VERSION:2.0\r\n\
//!            PRODID:-//Example//EN\r\n\
//!            BEGIN:VEVENT\r\n\
//!            UID:standup\r\n\
//!            DTSTART:20190701T090000Z\r\n\
//!            DTEND:20190701T091500Z\r\n\
//!            RRULE:FREQ=DAILY;COUNT=5\r\n\
//!            END:VEVENT\r\n\
//!            END:VCALENDAR\r\n";
//!
//! let sets = parse_calendar(ics, &EngineConfig::default()).unwrap();
//! let start = Utc.with_ymd_and_hms(2019, 7, 1, 0, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2019, 8, 1, 0, 0, 0).unwrap();
//! let occurrences = sets[0].manager().occurrences_between(start, end).unwrap();
//! assert_eq!(occurrences.count(), 5);
//! ```

pub mod config;
pub mod datetime;
pub mod duration;
pub mod error;
pub mod item;
pub mod manager;
pub mod occurrence;
pub mod period;
pub mod rule;
pub mod set;
pub mod tracking;

pub use config::EngineConfig;
pub use datetime::{DateTimeValue, Zone};
pub use error::RecurrenceError;
pub use item::{ItemId, ItemKind, RecurringItem};
pub use manager::{Occurrences, RecurrenceManager};
pub use period::{Period, PeriodEnd, RecurrenceDate};
pub use rule::{Expansion, Frequency, RecurrenceRule};
pub use set::{parse_calendar, ExceptionOutcome, RecurrenceSet};
pub use tracking::SignificantProperties;
