//! RFC 5545 §3.3.6 durations (`P2W`, `-P1DT2H30M`, `PT0S`) as `chrono::TimeDelta`.

use chrono::TimeDelta;

use crate::error::{RecurrenceError, Result};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Parse a duration value.
///
/// # Errors
/// Returns `RecurrenceError::InvalidValue` for anything that is not a
/// well-formed `dur-value`.
pub fn parse_duration(text: &str) -> Result<TimeDelta> {
    let invalid = || RecurrenceError::invalid_value("DURATION", text);

    let trimmed = text.trim();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let rest = rest
        .strip_prefix('P')
        .or_else(|| rest.strip_prefix('p'))
        .ok_or_else(invalid)?;

    let mut seconds: i64 = 0;
    let mut digits = String::new();
    let mut in_time = false;
    let mut saw_component = false;
    let mut saw_time_component = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => digits.push(c),
            'T' if !in_time && digits.is_empty() => in_time = true,
            unit => {
                let amount: i64 = digits.parse().map_err(|_| invalid())?;
                digits.clear();
                let scale = match (unit, in_time) {
                    ('W', false) => WEEK,
                    ('D', false) => DAY,
                    ('H', true) => HOUR,
                    ('M', true) => MINUTE,
                    ('S', true) => 1,
                    _ => return Err(invalid()),
                };
                seconds = amount
                    .checked_mul(scale)
                    .and_then(|s| seconds.checked_add(s))
                    .ok_or_else(invalid)?;
                saw_component = true;
                saw_time_component |= in_time;
            }
        }
    }

    if !digits.is_empty() || !saw_component || (in_time && !saw_time_component) {
        return Err(invalid());
    }

    let delta = TimeDelta::try_seconds(seconds).ok_or_else(invalid)?;
    Ok(if negative { -delta } else { delta })
}

/// Format a duration, preferring whole weeks when exact.
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let mut rest = total.abs();

    if rest == 0 {
        return "PT0S".to_string();
    }
    if rest % WEEK == 0 {
        return format!("{sign}P{}W", rest / WEEK);
    }

    let mut out = format!("{sign}P");
    let days = rest / DAY;
    rest %= DAY;
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if rest > 0 {
        out.push('T');
        let (hours, minutes, seconds) = (rest / HOUR, rest % HOUR / MINUTE, rest % MINUTE);
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_examples() {
        assert_eq!(parse_duration("P2W").unwrap(), TimeDelta::weeks(2));
        assert_eq!(parse_duration("PT1H").unwrap(), TimeDelta::hours(1));
        assert_eq!(
            parse_duration("-P1DT2H30M").unwrap(),
            -(TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(30))
        );
        assert_eq!(parse_duration("PT0S").unwrap(), TimeDelta::zero());
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "P", "PT", "1H", "PT1D", "P1H", "P1DT", "PT5"] {
            assert!(parse_duration(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn format_examples() {
        assert_eq!(format_duration(TimeDelta::weeks(1)), "P1W");
        assert_eq!(format_duration(TimeDelta::minutes(90)), "PT1H30M");
        assert_eq!(format_duration(-TimeDelta::minutes(15)), "-PT15M");
        assert_eq!(format_duration(TimeDelta::days(1) + TimeDelta::seconds(5)), "P1DT5S");
        assert_eq!(format_duration(TimeDelta::zero()), "PT0S");
    }
}
