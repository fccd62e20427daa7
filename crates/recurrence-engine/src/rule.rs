//! RRULE values and bounded expansion.
//!
//! Expansion wraps the `rrule` crate the same way the rest of this workspace
//! does: a `DTSTART` line and an `RRULE` line are rendered as text and parsed
//! into an `RRuleSet`, which is then bounded with `after`/`before`.
//!
//! `UNTIL` is never handed to the crate. It insists that `UNTIL` and `DTSTART`
//! agree on UTC vs. local time, which real-world data often violates, so the
//! bound is applied here instead after resolving both sides to instants.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use rrule::RRuleSet;
use tracing::warn;

use crate::datetime::{DateTimeValue, Zone};
use crate::error::{RecurrenceError, Result};

/// `FREQ` rule part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn parse(text: &str) -> Option<Self> {
        Some(match text.to_ascii_uppercase().as_str() {
            "SECONDLY" => Self::Secondly,
            "MINUTELY" => Self::Minutely,
            "HOURLY" => Self::Hourly,
            "DAILY" => Self::Daily,
            "WEEKLY" => Self::Weekly,
            "MONTHLY" => Self::Monthly,
            "YEARLY" => Self::Yearly,
            _ => return None,
        })
    }
}

/// Starts produced by [`RecurrenceRule::expand`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub starts: Vec<DateTimeValue>,
    /// The expansion limit was reached; later starts in the window are missing.
    pub limited: bool,
}

/// A recurrence rule with its parts kept in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    parts: Vec<(String, String)>,
    frequency: Frequency,
}

impl RecurrenceRule {
    /// Parse the value of an `RRULE` property.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidRule` if a part is malformed, `FREQ`
    /// is missing or unknown, or `INTERVAL`/`COUNT` are not positive integers.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for part in text.trim().split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| RecurrenceError::InvalidRule(format!("malformed part '{part}'")))?;
            parts.push((key.trim().to_ascii_uppercase(), value.trim().to_string()));
        }

        let frequency = parts
            .iter()
            .find(|(k, _)| k == "FREQ")
            .and_then(|(_, v)| Frequency::parse(v))
            .ok_or_else(|| RecurrenceError::InvalidRule(format!("missing or unknown FREQ in '{text}'")))?;

        for key in ["INTERVAL", "COUNT"] {
            if let Some((_, v)) = parts.iter().find(|(k, _)| k == key) {
                if !v.parse::<u32>().is_ok_and(|n| n > 0) {
                    return Err(RecurrenceError::InvalidRule(format!("{key}={v}")));
                }
            }
        }

        Ok(Self { parts, frequency })
    }

    fn part(&self, key: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// `INTERVAL`, defaulting to 1.
    pub fn interval(&self) -> u32 {
        self.part("INTERVAL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    pub fn count(&self) -> Option<u32> {
        self.part("COUNT").and_then(|v| v.parse().ok())
    }

    /// `UNTIL` as written. Unparseable values are treated as absent.
    pub fn until(&self) -> Option<DateTimeValue> {
        self.part("UNTIL")
            .and_then(|v| DateTimeValue::parse(v, None).ok())
    }

    /// `UNTIL` as an instant, reading a floating `UNTIL` in the zone of `dtstart`.
    pub(crate) fn until_instant(&self, dtstart: &DateTimeValue) -> Option<DateTime<Utc>> {
        let until = self.until()?;
        let until = match (until.zone(), dtstart.zone()) {
            (Zone::Floating, Zone::Named(_)) if !until.is_date() => {
                DateTimeValue::from_local(until.local(), dtstart.zone())
            }
            _ => until,
        };
        Some(until.to_utc())
    }

    /// Set or clear `UNTIL`. Setting it removes `COUNT`, which may not appear
    /// together with `UNTIL`. The value is stored in UTC unless it is a `DATE`.
    pub fn set_until(&mut self, until: Option<DateTimeValue>) {
        self.parts.retain(|(k, _)| k != "UNTIL");
        if let Some(until) = until {
            self.parts.retain(|(k, _)| k != "COUNT");
            let value = if until.is_date() {
                until
            } else {
                until.convert_to_zone(Zone::Utc)
            };
            self.parts.push(("UNTIL".to_string(), value.to_ical()));
        }
    }

    /// Replace `COUNT` in place, or append it. Any `UNTIL` is removed.
    pub fn set_count(&mut self, count: u32) {
        self.parts.retain(|(k, _)| k != "UNTIL");
        match self.parts.iter_mut().find(|(k, _)| k == "COUNT") {
            Some((_, value)) => *value = count.to_string(),
            None => self.parts.push(("COUNT".to_string(), count.to_string())),
        }
    }

    /// The rule text, e.g. `FREQ=WEEKLY;INTERVAL=2;UNTIL=20190901T000000Z`.
    pub fn to_ical(&self) -> String {
        self.parts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Every start `s` of this rule with `window_start <= s < window_end`
    /// (and `s <= UNTIL`), in the zone of `dtstart`, ascending.
    ///
    /// At most `limit` instances are produced; hitting the limit sets
    /// [`Expansion::limited`] and logs a warning.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidRule` if the `rrule` crate rejects the rule.
    pub fn expand(
        &self,
        dtstart: &DateTimeValue,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        limit: u16,
    ) -> Result<Expansion> {
        let mut upper = window_end;
        if let Some(until) = self.until_instant(dtstart) {
            upper = upper.min(until + TimeDelta::seconds(1));
        }
        if upper <= window_start {
            return Ok(Expansion::default());
        }
        if limit == 0 {
            return Ok(Expansion {
                starts: Vec::new(),
                limited: true,
            });
        }

        // The crate's bounds are exclusive; widen by a second and filter here.
        let after = (window_start - TimeDelta::seconds(1)).with_timezone(&rrule::Tz::UTC);
        let before = upper.with_timezone(&rrule::Tz::UTC);
        let result = self.rrule_set(dtstart)?.after(after).before(before).all(limit);
        if result.limited {
            warn!(rule = %self, limit, %window_start, %window_end, "expansion limit reached, window truncated");
        }

        Ok(Expansion {
            starts: result
                .dates
                .into_iter()
                .map(|dt| reanchor(dt.with_timezone(&Utc), dtstart))
                .filter(|s| {
                    let instant = s.to_utc();
                    instant >= window_start && instant < upper
                })
                .collect(),
            limited: result.limited,
        })
    }

    /// The first `limit` starts of this rule, honoring `UNTIL`. Stopping at
    /// `limit` is the point here, so the crate's limit flag is not reported.
    pub fn first_starts(&self, dtstart: &DateTimeValue, limit: u16) -> Result<Vec<DateTimeValue>> {
        let until = self.until_instant(dtstart);
        Ok(self
            .rrule_set(dtstart)?
            .all(limit)
            .dates
            .into_iter()
            .map(|dt| reanchor(dt.with_timezone(&Utc), dtstart))
            .filter(|s| until.is_none_or(|u| s.to_utc() <= u))
            .collect())
    }

    /// Build the `rrule` crate's view of this rule, without `UNTIL`.
    fn rrule_set(&self, dtstart: &DateTimeValue) -> Result<RRuleSet> {
        let body = self
            .parts
            .iter()
            .filter(|(k, _)| k != "UNTIL")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");

        let dtstart_line = match (dtstart.zone(), dtstart.is_date()) {
            (Zone::Named(tz), false) => format!(
                "DTSTART;TZID={}:{}",
                tz.name(),
                dtstart.local().format("%Y%m%dT%H%M%S")
            ),
            // Floating and DATE values expand on the UTC wall clock.
            _ => format!("DTSTART:{}Z", dtstart.local().format("%Y%m%dT%H%M%S")),
        };

        format!("{dtstart_line}\nRRULE:{body}")
            .parse::<RRuleSet>()
            .map_err(|e| RecurrenceError::InvalidRule(format!("{e}")))
    }
}

/// Express an expanded instant in the same form as `dtstart`.
fn reanchor(instant: DateTime<Utc>, dtstart: &DateTimeValue) -> DateTimeValue {
    if dtstart.is_date() {
        return DateTimeValue::from_date(instant.date_naive());
    }
    match dtstart.zone() {
        Zone::Named(tz) => DateTimeValue::from_local(instant.with_timezone(&tz).naive_local(), dtstart.zone()),
        Zone::Utc => DateTimeValue::from_utc(instant),
        Zone::Floating => DateTimeValue::from_local(instant.naive_utc(), Zone::Floating),
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn parse_preserves_part_order() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;BYDAY=MO,WE;INTERVAL=2").unwrap();
        assert_eq!(rule.frequency(), Frequency::Weekly);
        assert_eq!(rule.interval(), 2);
        assert_eq!(rule.to_ical(), "FREQ=WEEKLY;BYDAY=MO,WE;INTERVAL=2");
    }

    #[test]
    fn parse_rejects_missing_freq() {
        assert!(matches!(
            RecurrenceRule::parse("INTERVAL=2"),
            Err(RecurrenceError::InvalidRule(_))
        ));
        assert!(RecurrenceRule::parse("FREQ=FORTNIGHTLY").is_err());
        assert!(RecurrenceRule::parse("FREQ=DAILY;COUNT=0").is_err());
    }

    #[test]
    fn set_until_drops_count() {
        let mut rule = RecurrenceRule::parse("FREQ=DAILY;COUNT=10").unwrap();
        let until = DateTimeValue::parse("20190705T095959", Some("Europe/Berlin")).unwrap();
        rule.set_until(Some(until));
        assert_eq!(rule.count(), None);
        assert_eq!(rule.to_ical(), "FREQ=DAILY;UNTIL=20190705T075959Z");
    }

    #[test]
    fn set_count_replaces_in_place() {
        let mut rule = RecurrenceRule::parse("FREQ=WEEKLY;COUNT=10;BYDAY=MO").unwrap();
        rule.set_count(4);
        assert_eq!(rule.to_ical(), "FREQ=WEEKLY;COUNT=4;BYDAY=MO");

        let mut open = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20190705T100000Z").unwrap();
        open.set_count(2);
        assert_eq!(open.to_ical(), "FREQ=DAILY;COUNT=2");
    }

    #[test]
    fn expand_is_half_open_and_bounded_by_until() {
        let dtstart = DateTimeValue::parse("20190701T100000Z", None).unwrap();
        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20190705T100000Z").unwrap();

        let all = rule.expand(&dtstart, utc(2019, 7, 1, 10), utc(2019, 8, 1, 0), 100).unwrap();
        assert_eq!(all.starts.len(), 5, "UNTIL is inclusive");
        assert!(!all.limited);

        let window = rule.expand(&dtstart, utc(2019, 7, 2, 10), utc(2019, 7, 4, 10), 100).unwrap();
        let days: Vec<_> = window.starts.iter().map(|d| d.to_ical()).collect();
        assert_eq!(days, vec!["20190702T100000Z", "20190703T100000Z"]);
    }

    #[test]
    fn expand_keeps_wall_clock_across_dst() {
        let dtstart = DateTimeValue::parse("20191021T100000", Some("Europe/Berlin")).unwrap();
        let rule = RecurrenceRule::parse("FREQ=WEEKLY").unwrap();
        let starts = rule
            .expand(&dtstart, utc(2019, 10, 1, 0), utc(2019, 11, 1, 0), 10)
            .unwrap()
            .starts;
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1].to_ical(), "20191028T100000");
        assert_eq!(starts[1].to_utc(), utc(2019, 10, 28, 9));
    }

    #[test]
    fn expand_reports_hitting_the_limit() {
        let dtstart = DateTimeValue::parse("20190701T000000Z", None).unwrap();
        let rule = RecurrenceRule::parse("FREQ=MINUTELY").unwrap();
        let day = rule.expand(&dtstart, utc(2019, 7, 1, 0), utc(2019, 7, 2, 0), 100).unwrap();
        assert!(day.limited);
        assert_eq!(day.starts.len(), 100);
    }

    #[test]
    fn first_starts_respects_until_before_dtstart() {
        let dtstart = DateTimeValue::parse("20190701T100000Z", None).unwrap();
        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20190701T095959Z").unwrap();
        assert!(rule.first_starts(&dtstart, 5).unwrap().is_empty());
    }
}
