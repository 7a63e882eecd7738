//! Break time detection
//!
//! Classifies every recorded interval as moving or break. Four methods are
//! available:
//! - Time and distance: the position stays within a radius for a minimum time
//! - Slice speed: the speed between two samples is too low
//! - Average speed: the speed over a short time window is too low
//! - Average and slice speed: both speeds are too low for a minimum time
//!
//! Speeds are compared in tenths of km/h so values on a threshold are not
//! subject to floating point noise.

use tracing::debug;

use crate::config::BreakMethod;
use crate::error::ComputeError;
use crate::smoothing::min_time_slice_window;
use crate::types::{BreakClassification, TimeSeries};

/// Time span of the average speed window (seconds)
pub const AVG_SPEED_WINDOW_SECONDS: u32 = 20;

/// Speed in km/h as an integer number of 0.1 km/h
fn quantize_speed(speed_kmh: f64) -> i64 {
    (speed_kmh * 10.0).round() as i64
}

/// Break time detector
pub struct BreakTimeDetector;

impl BreakTimeDetector {
    /// Classify the intervals of `series`, every method requires the distance channel
    pub fn detect(
        series: &TimeSeries,
        method: &BreakMethod,
    ) -> Result<BreakClassification, ComputeError> {
        let distance = series.require_distance()?;
        let time = series.time();

        let flags = match *method {
            BreakMethod::TimeAndDistance {
                shortest_break_seconds,
                max_distance_meters,
                slice_diff_minutes,
            } => {
                let mut flags =
                    stationary_flags(time, distance, shortest_break_seconds, max_distance_meters);
                merge_short_gaps(series, &mut flags, slice_diff_minutes.saturating_mul(60));
                flags
            }
            BreakMethod::SliceSpeed { min_slice_speed } => {
                slice_speed_flags(time, distance, min_slice_speed)
            }
            BreakMethod::AvgSpeed { min_avg_speed } => {
                avg_speed_flags(time, distance, min_avg_speed)
            }
            BreakMethod::AvgAndSliceSpeed {
                min_avg_speed,
                min_slice_speed,
                min_slice_time_seconds,
            } => {
                let slice = slice_speed_flags(time, distance, min_slice_speed);
                let avg = avg_speed_flags(time, distance, min_avg_speed);
                let mut flags: Vec<bool> = slice.iter().zip(&avg).map(|(&s, &a)| s && a).collect();
                clear_short_breaks(series, &mut flags, min_slice_time_seconds);
                flags
            }
        };

        let classification = BreakClassification::from_flags(series, flags);

        debug!(
            method = method.id(),
            samples = series.len(),
            breaks = classification.break_count(),
            break_seconds = classification.total_break_seconds(),
            "break time detection"
        );

        Ok(classification)
    }
}

/// Break iff the speed of the interval ending at `i` is below the threshold.
///
/// Intervals without elapsed time take over the state of the previous interval.
fn slice_speed_flags(time: &[u32], distance: &[f64], min_slice_speed: f64) -> Vec<bool> {
    let threshold = quantize_speed(min_slice_speed);
    let mut flags = vec![false; time.len()];

    for index in 1..time.len() {
        let dt = time[index] - time[index - 1];
        flags[index] = if dt == 0 {
            flags[index - 1]
        } else {
            let speed = (distance[index] - distance[index - 1]) / dt as f64 * 3.6;
            quantize_speed(speed) < threshold
        };
    }

    flags
}

/// Break iff the average speed over a window of about 20 s is below the threshold
fn avg_speed_flags(time: &[u32], distance: &[f64], min_avg_speed: f64) -> Vec<bool> {
    let threshold = quantize_speed(min_avg_speed);
    let mut flags = vec![false; time.len()];

    for index in 1..time.len() {
        let (low, high) = min_time_slice_window(time, index, AVG_SPEED_WINDOW_SECONDS);
        let dt = time[high] - time[low];
        flags[index] = if dt == 0 {
            flags[index - 1]
        } else {
            let speed = (distance[high] - distance[low]) / dt as f64 * 3.6;
            quantize_speed(speed) < threshold
        };
    }

    flags
}

/// Mark every window `[start, end]` which stays within `max_distance` for at
/// least `shortest_break` seconds.
///
/// Distance is non-decreasing, so the farthest reachable end only moves
/// forward with the start and both pointers walk the series once.
fn stationary_flags(
    time: &[u32],
    distance: &[f64],
    shortest_break: u32,
    max_distance: f64,
) -> Vec<bool> {
    let len = time.len();
    let mut flags = vec![false; len];
    let mut end = 0;
    // intervals up to this index are already marked
    let mut marked = 0;

    for start in 0..len {
        end = end.max(start);
        while end + 1 < len && distance[end + 1] - distance[start] <= max_distance {
            end += 1;
        }

        if end > start && time[end] - time[start] >= shortest_break {
            for flag in flags.iter_mut().take(end + 1).skip(marked.max(start) + 1) {
                *flag = true;
            }
            marked = marked.max(end);
        }
    }

    flags
}

/// Consecutive equal flags as `(is_break, first, last)`, starting at interval 1
fn runs(flags: &[bool]) -> Vec<(bool, usize, usize)> {
    let mut runs: Vec<(bool, usize, usize)> = Vec::new();

    for (index, &flag) in flags.iter().enumerate().skip(1) {
        match runs.last_mut() {
            Some((state, _, last)) if *state == flag => *last = index,
            _ => runs.push((flag, index, index)),
        }
    }

    runs
}

fn run_seconds(series: &TimeSeries, first: usize, last: usize) -> u32 {
    (first..=last).map(|index| series.elapsed(index)).sum()
}

/// Turn moving gaps shorter than `max_gap` seconds between two breaks into break
fn merge_short_gaps(series: &TimeSeries, flags: &mut [bool], max_gap: u32) {
    let runs = runs(flags);

    for window in runs.windows(3) {
        let (before, gap, after) = (window[0], window[1], window[2]);
        if before.0 && !gap.0 && after.0 && run_seconds(series, gap.1, gap.2) < max_gap {
            for flag in &mut flags[gap.1..=gap.2] {
                *flag = true;
            }
        }
    }
}

/// Clear break runs lasting less than `min_seconds`
fn clear_short_breaks(series: &TimeSeries, flags: &mut [bool], min_seconds: u32) {
    for (is_break, first, last) in runs(flags) {
        if is_break && run_seconds(series, first, last) < min_seconds {
            for flag in &mut flags[first..=last] {
                *flag = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn series(time: Vec<u32>, distance: Vec<f64>) -> TimeSeries {
        TimeSeries::new(time).unwrap().with_distance(distance).unwrap()
    }

    fn detect(series: &TimeSeries, method: BreakMethod) -> BreakClassification {
        BreakTimeDetector::detect(series, &method).unwrap()
    }

    #[test]
    fn test_slice_speed_stationary_tail() {
        let series = series(vec![0, 10, 20, 30, 40], vec![0.0, 50.0, 100.0, 100.0, 100.0]);
        let breaks = detect(&series, BreakMethod::slice_speed());

        assert_eq!(breaks.flags(), &[false, false, false, true, true]);
        assert_eq!(breaks.total_break_seconds(), 20);
        assert_eq!(breaks.break_count(), 1);
    }

    #[test]
    fn test_speed_on_threshold_is_moving() {
        // 10 m in 36 s is 1.0 km/h and 9.9 m in 36 s rounds to it
        let series = series(vec![0, 36, 72], vec![0.0, 10.0, 19.9]);
        let breaks = detect(&series, BreakMethod::SliceSpeed { min_slice_speed: 1.0 });

        assert_eq!(breaks.flags(), &[false, false, false]);
    }

    #[test]
    fn test_missing_distance() {
        let series = TimeSeries::new(vec![0, 1, 2]).unwrap();
        let result = BreakTimeDetector::detect(&series, &BreakMethod::default());

        assert!(matches!(
            result,
            Err(ComputeError::MissingChannel(Channel::Distance))
        ));
    }

    #[test]
    fn test_single_sample() {
        let series = series(vec![0], vec![0.0]);
        let breaks = detect(&series, BreakMethod::default());

        assert_eq!(breaks.flags(), &[false]);
        assert_eq!(breaks.total_break_seconds(), 0);
    }

    #[test]
    fn test_avg_speed_smooths_single_slow_slice() {
        // one slow 5 s slice inside a ride at 18 km/h
        let time: Vec<u32> = (0..13).map(|i| i * 5).collect();
        let mut distance = vec![0.0];
        for i in 1..13 {
            let step = if i == 6 { 0.5 } else { 25.0 };
            distance.push(distance[i - 1] + step);
        }
        let series = series(time, distance);

        let slice = detect(&series, BreakMethod::SliceSpeed { min_slice_speed: 2.0 });
        let avg = detect(&series, BreakMethod::AvgSpeed { min_avg_speed: 2.0 });

        assert!(slice.is_break(6));
        assert_eq!(avg.total_break_seconds(), 0);
    }

    #[test]
    fn test_avg_and_slice_speed_requires_min_time() {
        let time = vec![0, 10, 20, 21, 30, 40, 50, 60, 70, 80];
        let distance = vec![0.0, 100.0, 200.0, 200.0, 300.0, 300.0, 300.0, 300.0, 300.0, 300.0];
        let series = series(time, distance);

        let method = BreakMethod::AvgAndSliceSpeed {
            min_avg_speed: 40.0,
            min_slice_speed: 1.0,
            min_slice_time_seconds: 2,
        };
        let breaks = detect(&series, method);

        // the 1 s stop at sample 3 is too short, the final stop is kept
        assert!(!breaks.is_break(3));
        assert!(breaks.is_break(5));
        assert!(breaks.is_break(9));
    }

    #[test]
    fn test_time_and_distance_detects_stop() {
        let time: Vec<u32> = (0..10).map(|i| i * 10).collect();
        let distance = vec![0.0, 100.0, 200.0, 205.0, 210.0, 212.0, 215.0, 300.0, 400.0, 500.0];
        let series = series(time, distance);

        let method = BreakMethod::TimeAndDistance {
            shortest_break_seconds: 30,
            max_distance_meters: 20.0,
            slice_diff_minutes: 0,
        };
        let breaks = detect(&series, method);

        assert_eq!(
            breaks.flags(),
            &[false, false, false, true, true, true, true, false, false, false]
        );
        assert_eq!(breaks.total_break_seconds(), 40);
    }

    #[test]
    fn test_time_and_distance_merges_short_gap() {
        let time: Vec<u32> = (0..9).map(|i| i * 60).collect();
        let distance = vec![0.0, 0.0, 0.0, 500.0, 500.0, 500.0, 1500.0, 2500.0, 3500.0];
        let series = series(time, distance);

        let separate = detect(
            &series,
            BreakMethod::TimeAndDistance {
                shortest_break_seconds: 60,
                max_distance_meters: 10.0,
                slice_diff_minutes: 0,
            },
        );
        assert_eq!(separate.break_count(), 2);
        assert!(!separate.is_break(3));

        let merged = detect(
            &series,
            BreakMethod::TimeAndDistance {
                shortest_break_seconds: 60,
                max_distance_meters: 10.0,
                slice_diff_minutes: 5,
            },
        );
        assert_eq!(merged.break_count(), 1);
        assert!(merged.is_break(3));
        assert_eq!(merged.total_break_seconds(), 300);
    }

    #[test]
    fn test_fully_stationary_series() {
        let time = vec![0, 15, 30, 45, 60, 75, 90];
        let series = series(time, vec![42.0; 7]);

        for method in [
            BreakMethod::time_and_distance(),
            BreakMethod::slice_speed(),
            BreakMethod::avg_speed(),
            BreakMethod::default(),
        ] {
            let breaks = detect(&series, method);
            assert_eq!(
                breaks.total_break_seconds(),
                series.recording_time(),
                "{}",
                method.id()
            );
        }
    }

    proptest! {
        #[test]
        fn prop_total_matches_flags(
            steps in prop::collection::vec((0u32..60, 0.0f64..200.0), 1..120),
            method_index in 0usize..4,
        ) {
            let mut t = 0;
            let mut d = 0.0;
            let mut time = vec![0];
            let mut distance = vec![0.0];
            for (dt, dd) in &steps {
                t += dt;
                d += dd;
                time.push(t);
                distance.push(d);
            }
            let series = series(time, distance);

            let method = [
                BreakMethod::time_and_distance(),
                BreakMethod::slice_speed(),
                BreakMethod::avg_speed(),
                BreakMethod::default(),
            ][method_index];
            let breaks = detect(&series, method);

            let expected: u32 = (0..series.len())
                .filter(|&i| breaks.is_break(i))
                .map(|i| series.elapsed(i))
                .sum();
            prop_assert_eq!(breaks.total_break_seconds(), expected);
            prop_assert!(!breaks.is_break(0));
            prop_assert!(breaks.total_break_seconds() <= series.recording_time());
        }

        #[test]
        fn prop_fast_series_has_no_breaks(
            steps in prop::collection::vec((1u32..30, 20.0f64..40.0), 1..80),
        ) {
            // at least 20 m/s on every slice, far above every default threshold
            let mut t = 0;
            let mut d = 0.0;
            let mut time = vec![0];
            let mut distance = vec![0.0];
            for (dt, speed) in &steps {
                t += dt;
                d += speed * *dt as f64;
                time.push(t);
                distance.push(d);
            }
            let series = series(time, distance);

            for method in [BreakMethod::slice_speed(), BreakMethod::avg_speed(), BreakMethod::default()] {
                prop_assert_eq!(detect(&series, method).total_break_seconds(), 0);
            }
        }
    }
}
