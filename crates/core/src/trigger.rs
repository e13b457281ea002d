//! Step trigger parsing and fire-time computation.
//!
//! A step's trigger is stored as a `(trigger_type, trigger_value)` pair of
//! strings. [`Trigger::parse`] turns that pair into a typed trigger and
//! [`compute_fire_time`] maps it onto a concrete instant given an anchor.

use chrono::{
    Duration, FixedOffset, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Upper bound when walking forward out of a nonexistent local time.
const MAX_GAP_MINUTES: u32 = 24 * 60;

// ---------------------------------------------------------------------------
// Trigger type
// ---------------------------------------------------------------------------

/// The stored discriminant of a step trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Immediate,
    Delay,
    Scheduled,
}

impl TriggerType {
    /// Parse a trigger type string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "delay" => Ok(Self::Delay),
            "scheduled" => Ok(Self::Scheduled),
            _ => Err(CoreError::InvalidTrigger(format!(
                "Unknown trigger type '{s}'. Must be one of: immediate, delay, scheduled"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Delay => "delay",
            Self::Scheduled => "scheduled",
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed trigger
// ---------------------------------------------------------------------------

/// A validated trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fires at the anchor itself.
    Immediate,
    /// Fires a fixed number of minutes after the anchor.
    Delay { minutes: u32 },
    /// Fires at the next occurrence of a wall-clock time at or after the anchor.
    Scheduled { at: NaiveTime },
}

impl Trigger {
    /// Parse the stored `(type, value)` pair.
    ///
    /// `immediate` ignores `value` entirely. `delay` expects a non-negative
    /// whole number of minutes and `scheduled` expects `HH:MM`.
    pub fn parse(trigger_type: TriggerType, value: &str) -> Result<Self, CoreError> {
        let value = value.trim();
        match trigger_type {
            TriggerType::Immediate => Ok(Self::Immediate),
            TriggerType::Delay => {
                if value.is_empty() {
                    return Err(CoreError::InvalidTrigger(
                        "delay trigger requires a value in minutes".into(),
                    ));
                }
                value
                    .parse::<u32>()
                    .map(|minutes| Self::Delay { minutes })
                    .map_err(|_| {
                        CoreError::InvalidTrigger(format!(
                            "delay value '{value}' is not a non-negative whole number of minutes"
                        ))
                    })
            }
            TriggerType::Scheduled => {
                if value.is_empty() {
                    return Err(CoreError::InvalidTrigger(
                        "scheduled trigger requires a time of day (HH:MM)".into(),
                    ));
                }
                NaiveTime::parse_from_str(value, "%H:%M")
                    .map(|at| Self::Scheduled { at })
                    .map_err(|_| {
                        CoreError::InvalidTrigger(format!(
                            "scheduled value '{value}' is not a valid time of day (HH:MM)"
                        ))
                    })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fire time
// ---------------------------------------------------------------------------

/// Compute when a step fires, given the instant it is anchored on.
///
/// `tz` is the schedule timezone used to interpret `scheduled` times of day.
/// The anchor itself qualifies for a `scheduled` trigger only when it falls
/// exactly on the requested wall-clock time.
pub fn compute_fire_time<Tz: TimeZone>(trigger: &Trigger, anchor: Timestamp, tz: &Tz) -> Timestamp {
    match *trigger {
        Trigger::Immediate => anchor,
        Trigger::Delay { minutes } => anchor + Duration::minutes(i64::from(minutes)),
        Trigger::Scheduled { at } => next_occurrence(at, anchor, tz),
    }
}

fn next_occurrence<Tz: TimeZone>(at: NaiveTime, anchor: Timestamp, tz: &Tz) -> Timestamp {
    let local_date = anchor.with_timezone(tz).date_naive();

    let same_day = resolve_local(tz, local_date.and_time(at));
    if same_day >= anchor {
        return same_day;
    }

    match local_date.succ_opt() {
        Some(next_day) => resolve_local(tz, next_day.and_time(at)),
        None => same_day,
    }
}

/// Map a local wall-clock time onto a UTC instant.
///
/// Nonexistent local times (DST gaps) move forward to the first valid
/// minute; ambiguous ones take the earlier instant.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Timestamp {
    let mut probe = naive;
    for _ in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => probe += Duration::minutes(1),
        }
    }
    Utc.from_utc_datetime(&naive)
}

// ---------------------------------------------------------------------------
// Schedule timezone
// ---------------------------------------------------------------------------

/// Parse a fixed UTC offset such as `+07:00`, `-05:30`, `Z` or `UTC`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, CoreError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let invalid = || {
        CoreError::validation(format!(
            "Invalid UTC offset '{value}'. Expected +HH:MM or -HH:MM"
        ))
    };

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_utc()
    }

    fn scheduled(value: &str) -> Trigger {
        Trigger::parse(TriggerType::Scheduled, value).unwrap()
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn immediate_ignores_value() {
        assert_eq!(
            Trigger::parse(TriggerType::Immediate, "garbage").unwrap(),
            Trigger::Immediate
        );
        assert_eq!(Trigger::parse(TriggerType::Immediate, "").unwrap(), Trigger::Immediate);
    }

    #[test]
    fn delay_parses_minutes() {
        assert_eq!(
            Trigger::parse(TriggerType::Delay, " 60 ").unwrap(),
            Trigger::Delay { minutes: 60 }
        );
        assert_eq!(
            Trigger::parse(TriggerType::Delay, "0").unwrap(),
            Trigger::Delay { minutes: 0 }
        );
    }

    #[test]
    fn delay_rejects_empty_negative_and_text() {
        for value in ["", "-5", "ten", "1.5"] {
            assert_matches!(
                Trigger::parse(TriggerType::Delay, value),
                Err(CoreError::InvalidTrigger(_)),
                "value {value:?}"
            );
        }
    }

    #[test]
    fn scheduled_rejects_bad_times() {
        for value in ["", "25:00", "09:60", "nine", "09:00:00"] {
            assert_matches!(
                Trigger::parse(TriggerType::Scheduled, value),
                Err(CoreError::InvalidTrigger(_)),
                "value {value:?}"
            );
        }
    }

    #[test]
    fn trigger_type_round_trips_db_strings() {
        for t in [TriggerType::Immediate, TriggerType::Delay, TriggerType::Scheduled] {
            assert_eq!(TriggerType::from_str_db(t.as_str()).unwrap(), t);
        }
        assert_matches!(
            TriggerType::from_str_db("weekly"),
            Err(CoreError::InvalidTrigger(_))
        );
    }

    // -----------------------------------------------------------------------
    // Fire time
    // -----------------------------------------------------------------------

    #[test]
    fn immediate_fires_at_anchor() {
        let t = utc(2026, 3, 1, 8, 15);
        assert_eq!(compute_fire_time(&Trigger::Immediate, t, &Utc), t);
    }

    #[test]
    fn delay_adds_exact_minutes() {
        let t = utc(2026, 3, 1, 8, 15);
        let fire = compute_fire_time(&Trigger::Delay { minutes: 30 }, t, &Utc);
        assert_eq!(fire, t + Duration::minutes(30));
    }

    #[test]
    fn scheduled_after_time_rolls_to_next_day() {
        let t = utc(2026, 3, 1, 9, 5);
        let fire = compute_fire_time(&scheduled("09:00"), t, &Utc);
        assert_eq!(fire, utc(2026, 3, 2, 9, 0));
    }

    #[test]
    fn scheduled_before_time_fires_same_day() {
        let t = utc(2026, 3, 1, 7, 45);
        let fire = compute_fire_time(&scheduled("09:00"), t, &Utc);
        assert_eq!(fire, utc(2026, 3, 1, 9, 0));
    }

    #[test]
    fn scheduled_exact_anchor_qualifies() {
        let t = utc(2026, 3, 1, 9, 0);
        assert_eq!(compute_fire_time(&scheduled("09:00"), t, &Utc), t);
    }

    #[test]
    fn scheduled_seconds_past_the_minute_rolls_over() {
        let t = utc(2026, 3, 1, 9, 0) + Duration::seconds(1);
        assert_eq!(
            compute_fire_time(&scheduled("09:00"), t, &Utc),
            utc(2026, 3, 2, 9, 0)
        );
    }

    #[test]
    fn scheduled_uses_local_wall_clock() {
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();
        // 01:00 UTC is 08:00 in UTC+7, so 09:00 local is 02:00 UTC the same day.
        let t = utc(2026, 3, 1, 1, 0);
        assert_eq!(
            compute_fire_time(&scheduled("09:00"), t, &bangkok),
            utc(2026, 3, 1, 2, 0)
        );
    }

    #[test]
    fn scheduled_local_date_differs_from_utc_date() {
        let bangkok = FixedOffset::east_opt(7 * 3600).unwrap();
        // 20:00 UTC on Mar 1 is 03:00 Mar 2 local; 06:30 local Mar 2 is 23:30 UTC Mar 1.
        let t = utc(2026, 3, 1, 20, 0);
        assert_eq!(
            compute_fire_time(&scheduled("06:30"), t, &bangkok),
            utc(2026, 3, 1, 23, 30)
        );
    }

    // -----------------------------------------------------------------------
    // UTC offsets
    // -----------------------------------------------------------------------

    #[test]
    fn parses_utc_offsets() {
        assert_eq!(parse_utc_offset("+07:00").unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(
            parse_utc_offset("-05:30").unwrap().local_minus_utc(),
            -(5 * 3600 + 30 * 60)
        );
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_malformed_offsets() {
        for value in ["07:00", "+7", "+24:00", "+07:75", ""] {
            assert_matches!(parse_utc_offset(value), Err(CoreError::Validation(_)));
        }
    }
}
