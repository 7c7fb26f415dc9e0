//! Time utilities for ephemera
//!
//! Wall-clock time drives every expiration decision, so all of it goes
//! through [`now`] rather than `Local::now()`.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `EPHEMERA_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising expiration and retry windows without waiting for them.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! EPHEMERA_MOCK_TIME="2025-12-25 14:30:00" ephemera status -v
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

use crate::ParseError;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "EPHEMERA_MOCK_TIME";

/// Format accepted by `EPHEMERA_MOCK_TIME`
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between the mock time and the real time at process start.
/// Mock time keeps advancing at the real rate.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT)
            else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };
            let offset = mock_dt.signed_duration_since(chrono::Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // the one sanctioned call site
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// `HH:MM`, used for "fires at" hints.
pub fn format_clock_time(dt: &DateTime<Local>) -> String {
    dt.format("%H:%M").to_string()
}

/// `YYYY-MM-DD HH:MM:SS`, used for status output and cleanup summaries.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Time elapsed from `earlier` to `later`, zero if `later` is not after `earlier`.
pub fn saturating_since(later: &DateTime<Local>, earlier: &DateTime<Local>) -> Duration {
    later
        .signed_duration_since(*earlier)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// `dt + d`, or `None` when the result is out of chrono's range.
pub fn checked_add(dt: &DateTime<Local>, d: Duration) -> Option<DateTime<Local>> {
    let delta = chrono::Duration::from_std(d).ok()?;
    dt.checked_add_signed(delta)
}

/// Parse a duration string such as `5m`, `1h30m`, `90s` or `1.5h`.
///
/// Accepts the units `ns`, `us` (`µs`), `ms`, `s`, `m` and `h`, decimal
/// fractions on any component, and a bare `0`. Negative durations are
/// rejected since a TTL can never point into the past.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ParseError::duration(input, "empty duration"));
    }
    if s.starts_with('-') {
        return Err(ParseError::duration(input, "negative durations are not allowed"));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let not_digit = |c: char| !c.is_ascii_digit();
    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let int_end = rest.find(not_digit).unwrap_or(rest.len());
        let int_part = &rest[..int_end];
        rest = &rest[int_end..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_end = after_dot.find(not_digit).unwrap_or(after_dot.len());
            frac_part = &after_dot[..frac_end];
            rest = &after_dot[frac_end..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseError::duration(input, "expected a number"));
        }

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(ParseError::duration(input, "missing unit")),
            other => {
                return Err(ParseError::duration(
                    input,
                    format!("unknown unit '{other}'"),
                ));
            }
        };

        let overflow = || ParseError::duration(input, "duration out of range");

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        if !frac_part.is_empty() {
            // Digits past nanosecond precision for the largest unit cannot matter.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| overflow())?;
            let divisor = 10u128.pow(digits.len() as u32);
            nanos = nanos
                .checked_add(frac * scale / divisor)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
    }

    let total = u64::try_from(total).map_err(|_| ParseError::duration(input, "duration out of range"))?;
    Ok(Duration::from_nanos(total))
}

/// Format a duration the way `parse_duration` reads it, rounded to whole
/// seconds: `1h2m3s`, `4m0s`, `45s`, `0s`.
pub fn format_duration(d: Duration) -> String {
    let mut total_secs = d.as_secs();
    if d.subsec_nanos() >= 500_000_000 {
        total_secs += 1;
    }
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn parses_common_ttls() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2h45m30s").unwrap(), Duration::from_secs(9930));
        assert_eq!(parse_duration(" 10m ").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("+1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parses_sub_second_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["", "5", "abc", "5x", "m", "-5m", "1h-5m", ".s", "5 m"] {
            assert!(
                matches!(parse_duration(bad), Err(ParseError::InvalidDuration { .. })),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflowing_durations() {
        assert!(parse_duration("99999999999999999999h").is_err());
    }

    #[test]
    fn formats_like_it_parses() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(240)), "4m0s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h0m0s");
        assert_eq!(format_duration(Duration::from_millis(59_600)), "1m0s");

        let d = Duration::from_secs(3723);
        assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
    }

    #[test]
    fn saturating_since_clamps_to_zero() {
        let early = Local.with_ymd_and_hms(2025, 12, 25, 14, 0, 0).unwrap();
        let late = Local.with_ymd_and_hms(2025, 12, 25, 14, 5, 0).unwrap();
        assert_eq!(saturating_since(&late, &early), Duration::from_secs(300));
        assert_eq!(saturating_since(&early, &late), Duration::ZERO);
    }

    #[test]
    fn checked_add_moves_forward() {
        let start = Local.with_ymd_and_hms(2025, 12, 25, 14, 0, 0).unwrap();
        let later = checked_add(&start, Duration::from_secs(90)).unwrap();
        assert_eq!(format_datetime_full(&later), "2025-12-25 14:01:30");
    }

    #[test]
    fn test_format_clock_time() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_clock_time(&dt), "14:30");
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:45");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn mock_time_format_parses() {
        assert_eq!(MOCK_TIME_ENV_VAR, "EPHEMERA_MOCK_TIME");
        assert!(NaiveDateTime::parse_from_str("2025-12-25 14:30:00", MOCK_TIME_FORMAT).is_ok());
        assert!(NaiveDateTime::parse_from_str("2025-12-25T14:30:00", MOCK_TIME_FORMAT).is_err());
    }
}
