//! Day/night schedule calculation.
//!
//! Pure functions: no clock access, no host access. Callers pass `now`
//! explicitly, so every decision here is reproducible in tests.
//!
//! A [`ScheduleWindow`] marks the night period. Windows whose start is later
//! than their end wrap midnight (e.g. 22:00-06:00 covers 22:00..=23:59:59
//! and 00:00..=06:00). Both ends are inclusive.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Time format accepted for window boundaries.
pub const TIME_FORMAT: &str = "%H:%M";

/// Night window, built once from door configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ScheduleWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build a window from two `HH:MM` strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeFormat`] naming the first string
    /// that fails to parse.
    pub fn from_strings(start: &str, end: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            start: parse_time_string(start)?,
            end: parse_time_string(end)?,
        })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// True when the window crosses midnight.
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Membership test on the time of day only; the date is ignored.
    pub fn contains<T: Timelike>(&self, now: &T) -> bool {
        let current = time_of_day(now);
        if self.wraps_midnight() {
            current >= self.start || current <= self.end
        } else {
            self.start <= current && current <= self.end
        }
    }
}

/// Day and night countdown lengths in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayPolicy {
    pub day_delay: u32,
    pub night_delay: u32,
}

impl DelayPolicy {
    pub fn new(day_delay: u32, night_delay: u32) -> Self {
        Self {
            day_delay,
            night_delay,
        }
    }
}

/// Parse a `HH:MM` string into a time of day.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTimeFormat`] for anything chrono cannot
/// read with [`TIME_FORMAT`], including out-of-range hours and minutes.
pub fn parse_time_string(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|_| ConfigError::InvalidTimeFormat {
        value: value.to_string(),
    })
}

/// Whether `now` falls inside the night window.
pub fn is_night_time<T: Timelike>(now: &T, window: &ScheduleWindow) -> bool {
    window.contains(now)
}

/// Countdown length in minutes for `now`.
///
/// Without a window the day delay always applies.
pub fn delay_for<T: Timelike>(now: &T, policy: &DelayPolicy, window: Option<&ScheduleWindow>) -> u32 {
    match window {
        Some(window) if window.contains(now) => policy.night_delay,
        _ => policy.day_delay,
    }
}

fn time_of_day<T: Timelike>(now: &T) -> NaiveTime {
    // Leap-second nanos (>= 1e9) are clamped rather than rejected.
    let nanos = now.nanosecond().min(999_999_999);
    NaiveTime::from_num_seconds_from_midnight_opt(now.num_seconds_from_midnight(), nanos)
        .unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn night() -> ScheduleWindow {
        ScheduleWindow::from_strings("22:00", "06:00").unwrap()
    }

    #[test]
    fn test_parse_valid_times() {
        assert_eq!(parse_time_string("22:00").unwrap(), t(22, 0));
        assert_eq!(parse_time_string("06:30").unwrap(), t(6, 30));
        assert_eq!(parse_time_string("00:00").unwrap(), t(0, 0));
        assert_eq!(parse_time_string("23:59").unwrap(), t(23, 59));
    }

    #[test]
    fn test_parse_rejects_malformed_times() {
        for bad in ["25:00", "12:60", "noon", "", "12-30", "12:30:00:00"] {
            let err = parse_time_string(bad).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidTimeFormat {
                    value: bad.to_string()
                },
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_strings_reports_bad_end() {
        let err = ScheduleWindow::from_strings("22:00", "6am").unwrap_err();
        assert!(err.to_string().contains("6am"));
    }

    #[test]
    fn test_wrapping_window_examples() {
        let window = night();
        assert!(window.wraps_midnight());
        assert!(is_night_time(&t(23, 0), &window));
        assert!(is_night_time(&t(2, 0), &window));
        assert!(!is_night_time(&t(12, 0), &window));
    }

    #[test]
    fn test_wrapping_window_boundaries_inclusive() {
        let window = night();
        assert!(is_night_time(&t(22, 0), &window));
        assert!(is_night_time(&t(6, 0), &window));
        assert!(!is_night_time(&t(21, 59), &window));
        assert!(!is_night_time(&t(6, 1), &window));
    }

    #[test]
    fn test_normal_window_boundaries_inclusive() {
        let window = ScheduleWindow::from_strings("09:00", "17:00").unwrap();
        assert!(!window.wraps_midnight());
        assert!(is_night_time(&t(9, 0), &window));
        assert!(is_night_time(&t(17, 0), &window));
        assert!(is_night_time(&t(12, 0), &window));
        assert!(!is_night_time(&t(8, 59), &window));
        assert!(!is_night_time(&t(17, 1), &window));
    }

    #[test]
    fn test_seconds_past_end_are_outside() {
        let window = ScheduleWindow::from_strings("09:00", "17:00").unwrap();
        let just_after = NaiveTime::from_hms_opt(17, 0, 1).unwrap();
        assert!(!window.contains(&just_after));
    }

    #[test]
    fn test_date_is_ignored() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let window = night();
        let new_year = tz.with_ymd_and_hms(2025, 1, 1, 23, 30, 0).unwrap();
        let midsummer = tz.with_ymd_and_hms(2025, 6, 21, 23, 30, 0).unwrap();
        assert!(is_night_time(&new_year, &window));
        assert!(is_night_time(&midsummer, &window));
    }

    #[test]
    fn test_delay_for_selects_by_window() {
        let policy = DelayPolicy::new(5, 2);
        let window = night();
        assert_eq!(delay_for(&t(23, 0), &policy, Some(&window)), 2);
        assert_eq!(delay_for(&t(12, 0), &policy, Some(&window)), 5);
    }

    #[test]
    fn test_delay_for_without_window_is_day_delay() {
        let policy = DelayPolicy::new(7, 1);
        assert_eq!(delay_for(&t(23, 0), &policy, None), 7);
        assert_eq!(delay_for(&t(3, 0), &policy, None), 7);
    }

    fn arb_time() -> impl Strategy<Value = NaiveTime> {
        (0u32..24, 0u32..60, 0u32..60).prop_map(|(h, m, s)| NaiveTime::from_hms_opt(h, m, s).unwrap())
    }

    proptest! {
        #[test]
        fn prop_normal_window_is_closed_interval(a in arb_time(), b in arb_time(), now in arb_time()) {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            let window = ScheduleWindow::new(start, end);
            prop_assert_eq!(is_night_time(&now, &window), start <= now && now <= end);
        }

        #[test]
        fn prop_wrapping_window_is_union(a in arb_time(), b in arb_time(), now in arb_time()) {
            prop_assume!(a != b);
            let (start, end) = if a > b { (a, b) } else { (b, a) };
            let window = ScheduleWindow::new(start, end);
            prop_assert_eq!(is_night_time(&now, &window), now >= start || now <= end);
        }

        #[test]
        fn prop_no_window_always_day(day in 1u32..=240, night in 1u32..=30, now in arb_time()) {
            let policy = DelayPolicy::new(day, night);
            prop_assert_eq!(delay_for(&now, &policy, None), day);
        }
    }
}
