//! Checkpoint-based window planning.
//!
//! `compute_windows` is a pure function of the last checkpoint, the interval
//! and the clock; all measuring and persisting happens in the engine.

use chrono::{DateTime, Duration, Utc};

use crate::db::entities::monitor_config;
use crate::db::enums::IntervalUnit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub unit: IntervalUnit,
    pub value: i32,
}

impl Interval {
    pub fn new(unit: IntervalUnit, value: i32) -> Self {
        Self { unit, value }
    }

    pub fn from_config(config: &monitor_config::Model) -> Self {
        Self::new(config.interval_unit(), config.interval_value)
    }

    pub fn minutes(&self) -> i64 {
        i64::from(self.value) * self.unit.minutes_per_unit()
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }
}

/// Half-open measurement range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Plans the windows still to be measured.
///
/// A configuration that never ran gets the single window `[now - interval, now]`.
/// Otherwise windows are sliced from the checkpoint up to `now`, the last one
/// clipped to `now`. A checkpoint at or after `now` yields nothing.
pub fn compute_windows(
    last_checkpoint: Option<DateTime<Utc>>,
    interval: &Interval,
    now: DateTime<Utc>,
) -> Vec<TimeWindow> {
    if interval.minutes() <= 0 {
        return Vec::new();
    }
    let step = interval.duration();

    let Some(checkpoint) = last_checkpoint else {
        return match now.checked_sub_signed(step) {
            Some(start) => vec![TimeWindow { start, end: now }],
            None => Vec::new(),
        };
    };

    let mut windows = Vec::new();
    let mut segment = checkpoint;
    while segment < now {
        let end = segment
            .checked_add_signed(step)
            .map_or(now, |candidate| candidate.min(now));
        windows.push(TimeWindow { start: segment, end });
        segment = end;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
    }

    fn minutes(value: i32) -> Interval {
        Interval::new(IntervalUnit::Minutes, value)
    }

    #[test]
    fn test_first_run_emits_one_trailing_window() {
        let now = t0();
        let windows = compute_windows(None, &minutes(10), now);

        assert_eq!(
            windows,
            vec![TimeWindow {
                start: now - Duration::minutes(10),
                end: now,
            }]
        );
    }

    #[test]
    fn test_catch_up_slices_full_windows() {
        let windows = compute_windows(Some(t0()), &minutes(10), t0() + Duration::hours(2));

        assert_eq!(windows.len(), 12);
        assert_eq!(windows[0].start, t0());
        assert_eq!(windows[11].end, t0() + Duration::hours(2));
        assert!(windows.iter().all(|w| w.duration() == Duration::minutes(10)));
        assert!(windows.windows(2).all(|pair| pair[0].end == pair[1].start));
    }

    #[test]
    fn test_partial_tail_window_is_clipped_to_now() {
        let windows = compute_windows(Some(t0()), &minutes(10), t0() + Duration::minutes(15));

        assert_eq!(
            windows,
            vec![
                TimeWindow {
                    start: t0(),
                    end: t0() + Duration::minutes(10),
                },
                TimeWindow {
                    start: t0() + Duration::minutes(10),
                    end: t0() + Duration::minutes(15),
                },
            ]
        );
    }

    #[test]
    fn test_checkpoint_at_or_after_now_is_a_no_op() {
        assert!(compute_windows(Some(t0()), &minutes(10), t0()).is_empty());
        assert!(compute_windows(Some(t0()), &minutes(10), t0() - Duration::minutes(3)).is_empty());
    }

    #[test]
    fn test_units_convert_to_minutes() {
        assert_eq!(Interval::new(IntervalUnit::Hours, 2).minutes(), 120);
        assert_eq!(Interval::new(IntervalUnit::Days, 1).minutes(), 1440);
        assert_eq!(
            Interval::new(IntervalUnit::Unrecognized("WEEKS".into()), 7).minutes(),
            7
        );

        let windows = compute_windows(
            Some(t0()),
            &Interval::new(IntervalUnit::Hours, 1),
            t0() + Duration::hours(3),
        );
        assert_eq!(windows.len(), 3);
    }

    #[test]
    fn test_non_positive_interval_plans_nothing() {
        assert!(compute_windows(None, &minutes(0), t0()).is_empty());
        assert!(compute_windows(Some(t0()), &minutes(-5), t0() + Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_repeated_runs_tile_the_timeline() {
        let interval = minutes(7);
        let mut checkpoint = None;
        let mut covered: Vec<TimeWindow> = Vec::new();

        for tick in [0i64, 5, 19, 19, 40, 41, 90] {
            let now = t0() + Duration::minutes(tick);
            let windows = compute_windows(checkpoint, &interval, now);
            if let Some(last) = windows.last() {
                checkpoint = Some(last.end);
            }
            covered.extend(windows);
        }

        assert_eq!(covered[0].start, t0() - Duration::minutes(7));
        assert_eq!(covered.last().map(|w| w.end), Some(t0() + Duration::minutes(90)));
        assert!(covered.windows(2).all(|pair| pair[0].end == pair[1].start));
        assert!(covered.iter().all(|w| w.start < w.end));
    }
}
