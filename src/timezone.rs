// src/timezone.rs
//! Calendar-day windows for a requester-chosen IANA timezone.
//!
//! A date key (`YYYY-MM-DD`) is turned into a half-open UTC interval
//! `[start, end_exclusive)` using a guess-and-correct pass: take local
//! midnight as if it were UTC, read that instant back in the zone, and shift
//! the guess by the wall-clock delta. The pass runs twice, plus a retry with
//! the offset in effect a few hours earlier. Among those candidates the
//! earliest one whose local date equals the key wins, so:
//!
//! - a repeated midnight (fall-back at 00:00) resolves to its first occurrence,
//! - a skipped midnight (spring-forward at 00:00) resolves to the first
//!   instant that exists on that local day,
//! - a calendar day the zone skipped entirely is `InvalidDate`; the day
//!   before it ends where the following day starts.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("invalid date key '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),
}

impl WindowError {
    pub fn code(&self) -> &'static str {
        match self {
            WindowError::InvalidDate(_) => "INVALID_DATE",
            WindowError::InvalidTimezone(_) => "INVALID_TIMEZONE",
        }
    }
}

/// Half-open UTC interval covering one or more local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end_exclusive: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end_exclusive
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, WindowError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| WindowError::InvalidTimezone(name.to_string()))
}

/// Strict `YYYY-MM-DD`; chrono alone would also accept signs and short years.
pub fn parse_date_key(date_key: &str) -> Result<NaiveDate, WindowError> {
    let b = date_key.as_bytes();
    let shaped = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b
            .iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !shaped {
        return Err(WindowError::InvalidDate(date_key.to_string()));
    }
    NaiveDate::parse_from_str(date_key, "%Y-%m-%d")
        .map_err(|_| WindowError::InvalidDate(date_key.to_string()))
}

pub fn format_date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// UTC interval of one local calendar day.
pub fn resolve_window(date_key: &str, timezone: &str) -> Result<DayWindow, WindowError> {
    let date = parse_date_key(date_key)?;
    let tz = parse_timezone(timezone)?;
    resolve_window_tz(date, tz)
}

pub fn resolve_window_tz(date: NaiveDate, tz: Tz) -> Result<DayWindow, WindowError> {
    // a date the zone skipped entirely (e.g. Pacific/Apia 2011-12-30) has no window
    let start = local_midnight(date, tz)
        .ok_or_else(|| WindowError::InvalidDate(format_date_key(date)))?;
    let next = date
        .succ_opt()
        .ok_or_else(|| WindowError::InvalidDate(format_date_key(date)))?;
    Ok(DayWindow {
        start,
        end_exclusive: first_midnight_from(next, tz)?,
    })
}

/// `window_days` local days ending with `date_key` (inclusive).
pub fn lookback_window(
    date_key: &str,
    window_days: u8,
    timezone: &str,
) -> Result<DayWindow, WindowError> {
    let tz = parse_timezone(timezone)?;
    let last = parse_date_key(date_key)?;
    let back = i64::from(window_days.max(1)) - 1;
    let first = last
        .checked_sub_signed(Duration::days(back))
        .ok_or_else(|| WindowError::InvalidDate(date_key.to_string()))?;
    Ok(DayWindow {
        start: first_midnight_from(first, tz)?,
        end_exclusive: resolve_window_tz(last, tz)?.end_exclusive,
    })
}

pub fn date_key_in_zone(instant: DateTime<Utc>, timezone: &str) -> Result<String, WindowError> {
    let tz = parse_timezone(timezone)?;
    Ok(format_date_key(instant.with_timezone(&tz).date_naive()))
}

pub fn today_in_zone(now: DateTime<Utc>, timezone: &str) -> Result<String, WindowError> {
    date_key_in_zone(now, timezone)
}

pub fn shift_date_key(date_key: &str, delta_days: i64) -> Result<String, WindowError> {
    let date = parse_date_key(date_key)?;
    date.checked_add_signed(Duration::days(delta_days))
        .map(format_date_key)
        .ok_or_else(|| WindowError::InvalidDate(date_key.to_string()))
}

/// Start of the first local day on or after `date` that exists in `tz`.
fn first_midnight_from(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, WindowError> {
    let mut day = date;
    // no zone has skipped more than one calendar day
    for _ in 0..3 {
        if let Some(m) = local_midnight(day, tz) {
            return Ok(m);
        }
        day = day
            .succ_opt()
            .ok_or_else(|| WindowError::InvalidDate(format_date_key(date)))?;
    }
    Err(WindowError::InvalidDate(format_date_key(date)))
}

/// `None` when no instant in `tz` falls on `date`.
fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let intended = date.and_time(NaiveTime::MIN);
    let guess = intended.and_utc();

    let first = correct(guess, intended, tz);
    let second = correct(first, intended, tz);
    let earlier = correct(second - Duration::hours(3), intended, tz);

    [first, second, earlier]
        .into_iter()
        .filter(|c| c.with_timezone(&tz).date_naive() == date)
        .min()
}

fn correct(guess: DateTime<Utc>, intended: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    let wall = guess.with_timezone(&tz).naive_local();
    guess - (wall - intended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_window_is_plain_midnight_to_midnight() {
        let w = resolve_window("2026-02-22", "UTC").unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 2, 22, 0, 0, 0).unwrap());
        assert_eq!(
            w.end_exclusive,
            Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn non_integer_offsets_are_corrected() {
        // Asia/Kolkata is UTC+05:30 all year.
        let w = resolve_window("2026-02-22", "Asia/Kolkata").unwrap();
        assert_eq!(
            w.start,
            Utc.with_ymd_and_hms(2026, 2, 21, 18, 30, 0).unwrap()
        );
        // Asia/Kathmandu is UTC+05:45.
        let k = resolve_window("2026-02-22", "Asia/Kathmandu").unwrap();
        assert_eq!(
            k.start,
            Utc.with_ymd_and_hms(2026, 2, 21, 18, 15, 0).unwrap()
        );
    }

    #[test]
    fn dst_days_have_23_and_25_hours() {
        let spring = resolve_window("2026-03-08", "America/New_York").unwrap();
        assert_eq!(spring.end_exclusive - spring.start, Duration::hours(23));
        let fall = resolve_window("2026-11-01", "America/New_York").unwrap();
        assert_eq!(fall.end_exclusive - fall.start, Duration::hours(25));
    }

    #[test]
    fn skipped_midnight_starts_at_first_existing_instant() {
        // Sao Paulo jumped from 00:00 to 01:00 on 2018-11-04 (UTC-3 -> UTC-2).
        let w = resolve_window("2018-11-04", "America/Sao_Paulo").unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2018, 11, 4, 3, 0, 0).unwrap());
        assert_eq!(
            date_key_in_zone(w.start, "America/Sao_Paulo").unwrap(),
            "2018-11-04"
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            resolve_window("2026-2-22", "UTC").unwrap_err().code(),
            "INVALID_DATE"
        );
        assert_eq!(
            resolve_window("2026-02-30", "UTC").unwrap_err().code(),
            "INVALID_DATE"
        );
        assert_eq!(
            resolve_window("2026-02-22", "Mars/Olympus").unwrap_err().code(),
            "INVALID_TIMEZONE"
        );
    }

    #[test]
    fn lookback_spans_whole_days() {
        let w = lookback_window("2026-02-22", 3, "UTC").unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap());
        assert_eq!(
            w.end_exclusive,
            Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap()
        );
        assert!(w.contains(Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap()));
        assert!(!w.contains(w.end_exclusive));
    }

    #[test]
    fn shift_crosses_month_and_year() {
        assert_eq!(shift_date_key("2026-03-01", -1).unwrap(), "2026-02-28");
        assert_eq!(shift_date_key("2025-12-31", 1).unwrap(), "2026-01-01");
    }
}
