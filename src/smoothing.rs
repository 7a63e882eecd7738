//! Signal smoothing
//!
//! This module derives smoothed channels from the raw samples of a tour:
//! - Jamet: time-aware first-order exponential filter with optional repeated passes
//! - Initial: speed over a window covering a minimum time slice
//!
//! Inputs are never modified, every call returns new arrays.

use tracing::debug;

use crate::config::{SmoothingAlgorithm, SmoothingConfig};
use crate::types::{SmoothedSeries, TimeSeries};

/// Window time above which a short distance counts as standing (seconds)
const STANDING_WINDOW_SECONDS: u32 = 20;
/// Window distance below which a long window counts as standing (meters)
const STANDING_WINDOW_METERS: f64 = 10.0;
/// Speeds below this have no pace (km/h)
const MIN_PACE_SPEED: f64 = 1.0;

/// Apply the exponential filter once.
///
/// `y[0] = x[0]` and `y[i] = y[i-1] + alpha * (x[i] - y[i-1])` with
/// `alpha = 1 - exp(-dt / tau)`. Samples with equal time keep the previous output.
pub fn jamet_filter(time: &[u32], values: &[f64], tau: f64) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return smoothed;
    };
    smoothed.push(first);

    for index in 1..values.len() {
        let dt = time[index].saturating_sub(time[index - 1]) as f64;
        let alpha = if tau > 0.0 {
            1.0 - (-dt / tau).exp()
        } else {
            1.0
        };

        let previous = smoothed[index - 1];
        smoothed.push(previous + alpha * (values[index] - previous));
    }

    smoothed
}

/// Filter with `tau`, then pass the output `repeat_count` more times with `repeat_tau`
pub fn smooth_repeated(
    time: &[u32],
    values: &[f64],
    tau: f64,
    repeat_count: u32,
    repeat_tau: f64,
) -> Vec<f64> {
    let mut smoothed = jamet_filter(time, values, tau);
    for _ in 0..repeat_count {
        smoothed = jamet_filter(time, &smoothed, repeat_tau);
    }
    smoothed
}

/// Smallest index window around `index` covering `min_time_slice` seconds.
///
/// Starts with the interval ending at `index` and grows alternately forward
/// and backward until the window is long enough or hits either end.
pub(crate) fn min_time_slice_window(time: &[u32], index: usize, min_time_slice: u32) -> (usize, usize) {
    let last = time.len().saturating_sub(1);
    let mut low = index.saturating_sub(1);
    let mut high = index.min(last);
    let mut grow_forward = true;

    while time[high] - time[low] < min_time_slice {
        if grow_forward {
            if high == last {
                break;
            }
            high += 1;
        } else {
            if low == 0 {
                break;
            }
            low -= 1;
        }
        grow_forward = !grow_forward;
    }

    (low, high)
}

/// Speed in km/h at `index` over its minimum time slice window.
///
/// Long windows with almost no distance are standing and report 0, as do
/// windows containing samples with repeated timestamps.
pub(crate) fn window_speed(time: &[u32], distance: &[f64], index: usize, min_time_slice: u32) -> f64 {
    if index == 0 {
        return 0.0;
    }

    let (low, high) = min_time_slice_window(time, index, min_time_slice);
    let time_diff = time[high] - time[low];
    let distance_diff = distance[high] - distance[low];

    let has_repeated_time = time[low..=high].windows(2).any(|w| w[0] == w[1]);
    if has_repeated_time || time_diff == 0 {
        return 0.0;
    }

    if time_diff > STANDING_WINDOW_SECONDS && distance_diff < STANDING_WINDOW_METERS {
        return 0.0;
    }

    (distance_diff * 3.6 / time_diff as f64).max(0.0)
}

/// Seconds per kilometer for a speed in km/h
fn pace_from_speed(speed: f64) -> f64 {
    if speed < MIN_PACE_SPEED {
        0.0
    } else {
        3600.0 / speed
    }
}

/// Per-interval rate of `values`, the last sample repeats the previous rate.
///
/// Samples with equal time repeat the previous rate (0 at the start).
fn interval_rates(time: &[u32], values: &[f64]) -> Vec<f64> {
    let size = values.len();
    let mut rates = vec![0.0; size];

    for index in 0..size.saturating_sub(1) {
        let dt = time[index + 1] - time[index];
        rates[index] = if dt == 0 {
            if index == 0 {
                0.0
            } else {
                rates[index - 1]
            }
        } else {
            (values[index + 1] - values[index]) / dt as f64
        };
    }

    if size >= 2 {
        rates[size - 1] = rates[size - 2];
    }

    rates
}

/// Signal smoother for tour channels
pub struct SignalSmoother;

impl SignalSmoother {
    /// Derive the smoothed channels of `series` with the selected algorithm
    pub fn smooth(series: &TimeSeries, algorithm: &SmoothingAlgorithm) -> SmoothedSeries {
        match algorithm {
            SmoothingAlgorithm::Initial { min_time_slice } => {
                Self::smooth_initial(series, *min_time_slice)
            }
            SmoothingAlgorithm::Jamet(config) => Self::smooth_jamet(series, config),
        }
    }

    fn smooth_jamet(series: &TimeSeries, config: &SmoothingConfig) -> SmoothedSeries {
        let time = series.time();
        let size = series.len();
        let smooth = |values: &[f64], tau: f64| {
            smooth_repeated(time, values, tau, config.repeat_count, config.repeat_tau)
        };

        let mut smoothed = SmoothedSeries::default();

        // vertical speed always needs the smoothed altitude
        let altitude_smoothed = series
            .altitude()
            .map(|altitude| smooth(altitude, config.gradient_tau));

        smoothed.altitude = match (series.altitude(), &altitude_smoothed) {
            (Some(_), Some(filtered)) if config.altitude_enabled => Some(filtered.clone()),
            (Some(raw), _) => Some(raw.to_vec()),
            _ => None,
        };

        smoothed.pulse = series.pulse().map(|pulse| {
            if config.pulse_enabled {
                smooth(pulse, config.pulse_tau)
            } else {
                pulse.to_vec()
            }
        });

        let Some(distance) = series.distance() else {
            debug!(samples = size, "jamet smoothing without distance");
            return smoothed;
        };

        if size < 2 {
            smoothed.speed = Some(vec![0.0; size]);
            smoothed.pace = Some(vec![0.0; size]);
            return smoothed;
        }

        let distance_smoothed = smooth(distance, config.speed_tau);
        let horizontal = interval_rates(time, &distance_smoothed);
        let horizontal_smoothed = smooth(&horizontal, config.speed_tau);

        let speed: Vec<f64> = horizontal.iter().map(|vh| vh * 3.6).collect();
        smoothed.pace = Some(speed.iter().map(|&s| pace_from_speed(s)).collect());
        smoothed.speed = Some(speed);

        if let Some(altitude_smoothed) = &altitude_smoothed {
            let vertical = interval_rates(time, altitude_smoothed);
            let vertical_smoothed = smooth(&vertical, config.gradient_tau);

            smoothed.gradient = Some(
                horizontal_smoothed
                    .iter()
                    .zip(&vertical_smoothed)
                    .map(|(&vh, &vv)| if vh == 0.0 { 0.0 } else { vv / vh * 100.0 })
                    .collect(),
            );
            smoothed.altimeter = Some(vertical_smoothed.iter().map(|vv| vv * 3600.0).collect());
        }

        debug!(
            samples = size,
            speed_tau = config.speed_tau,
            gradient_tau = config.gradient_tau,
            repeat_count = config.repeat_count,
            "jamet smoothing"
        );

        smoothed
    }

    fn smooth_initial(series: &TimeSeries, min_time_slice: u32) -> SmoothedSeries {
        let time = series.time();
        let size = series.len();

        let mut smoothed = SmoothedSeries {
            altitude: series.altitude().map(<[f64]>::to_vec),
            pulse: series.pulse().map(<[f64]>::to_vec),
            ..SmoothedSeries::default()
        };

        let Some(distance) = series.distance() else {
            return smoothed;
        };

        let speed: Vec<f64> = (0..size)
            .map(|index| window_speed(time, distance, index, min_time_slice))
            .collect();
        smoothed.pace = Some(speed.iter().map(|&s| pace_from_speed(s)).collect());
        smoothed.speed = Some(speed);

        if let Some(altitude) = series.altitude() {
            let mut gradient = vec![0.0; size];
            let mut altimeter = vec![0.0; size];

            for index in 1..size {
                let (low, high) = min_time_slice_window(time, index, min_time_slice);
                let time_diff = time[high] - time[low];
                let distance_diff = distance[high] - distance[low];
                let altitude_diff = altitude[high] - altitude[low];

                if distance_diff > 0.0 {
                    gradient[index] = altitude_diff / distance_diff * 100.0;
                }
                if time_diff > 0 {
                    altimeter[index] = altitude_diff / time_diff as f64 * 3600.0;
                }
            }

            smoothed.gradient = Some(gradient);
            smoothed.altimeter = Some(altimeter);
        }

        debug!(samples = size, min_time_slice, "initial smoothing");

        smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_filter_keeps_first_value() {
        let smoothed = jamet_filter(&[0, 5, 10], &[3.0, 9.0, -4.0], 10.0);
        assert_eq!(smoothed[0], 3.0);
    }

    #[test]
    fn test_filter_empty_input() {
        assert!(jamet_filter(&[], &[], 10.0).is_empty());
    }

    #[test]
    fn test_filter_constant_signal_unchanged() {
        let time = [0, 1, 3, 7, 20, 21];
        let values = [412.5; 6];

        assert_eq!(jamet_filter(&time, &values, 4.0), values.to_vec());
        assert_eq!(smooth_repeated(&time, &values, 4.0, 3, 0.5), values.to_vec());
    }

    #[test]
    fn test_filter_time_aware_alpha() {
        let smoothed = jamet_filter(&[0, 10], &[0.0, 100.0], 10.0);
        let alpha = 1.0 - (-1.0_f64).exp();

        assert!(approx(smoothed[1], 100.0 * alpha));
    }

    #[test]
    fn test_filter_repeated_timestamp_holds_value() {
        let smoothed = jamet_filter(&[0, 5, 5], &[0.0, 10.0, 1000.0], 5.0);
        assert_eq!(smoothed[2], smoothed[1]);
    }

    #[test]
    fn test_min_time_slice_window_grows_alternately() {
        let time = [0, 2, 4, 6, 8, 10];

        assert_eq!(min_time_slice_window(&time, 3, 2), (2, 3));
        assert_eq!(min_time_slice_window(&time, 3, 4), (2, 4));
        assert_eq!(min_time_slice_window(&time, 3, 6), (1, 4));
        // the end of the series stops the growth
        assert_eq!(min_time_slice_window(&time, 5, 100), (4, 5));
    }

    #[test]
    fn test_window_speed() {
        let time = [0, 10, 20, 30];
        let distance = [0.0, 100.0, 200.0, 300.0];

        assert_eq!(window_speed(&time, &distance, 0, 10), 0.0);
        assert!(approx(window_speed(&time, &distance, 2, 10), 36.0));
    }

    #[test]
    fn test_window_speed_standing() {
        let time = [0, 30, 60];
        let distance = [0.0, 5.0, 8.0];

        assert_eq!(window_speed(&time, &distance, 1, 10), 0.0);
    }

    #[test]
    fn test_jamet_without_distance_keeps_raw_altitude() {
        let series = TimeSeries::new(vec![0, 10, 20])
            .unwrap()
            .with_altitude(vec![100.0, 110.0, 90.0])
            .unwrap();

        let smoothed = SignalSmoother::smooth(&series, &SmoothingAlgorithm::default());

        assert_eq!(smoothed.altitude, Some(vec![100.0, 110.0, 90.0]));
        assert_eq!(smoothed.speed, None);
        assert_eq!(smoothed.gradient, None);
    }

    #[test]
    fn test_jamet_smoothed_altitude_when_enabled() {
        let series = TimeSeries::new(vec![0, 10, 20])
            .unwrap()
            .with_altitude(vec![100.0, 110.0, 90.0])
            .unwrap();
        let config = SmoothingConfig::default().with_altitude(true);

        let smoothed = SignalSmoother::smooth(&series, &SmoothingAlgorithm::Jamet(config));
        let altitude = smoothed.altitude.unwrap();

        assert_eq!(altitude[0], 100.0);
        assert!(altitude[1] > 100.0 && altitude[1] < 110.0);
    }

    #[test]
    fn test_jamet_derived_channels() {
        let time: Vec<u32> = (0..60).map(|i| i * 5).collect();
        let distance: Vec<f64> = (0..60).map(|i| i as f64 * 25.0).collect();
        let altitude: Vec<f64> = (0..60).map(|i| 500.0 + i as f64 * 2.5).collect();
        let series = TimeSeries::new(time)
            .unwrap()
            .with_distance(distance)
            .unwrap()
            .with_altitude(altitude)
            .unwrap();

        let smoothed = SignalSmoother::smooth(&series, &SmoothingAlgorithm::default());
        let speed = smoothed.speed.unwrap();
        let pace = smoothed.pace.unwrap();
        let gradient = smoothed.gradient.unwrap();

        assert_eq!(speed.len(), 60);
        // the filter converges towards the constant 18 km/h and 10 %
        assert!((speed[59] - 18.0).abs() < 0.5);
        assert!((pace[59] - 200.0).abs() < 6.0);
        assert!((gradient[59] - 10.0).abs() < 0.5);
        assert!(smoothed.altimeter.is_some());
    }

    #[test]
    fn test_jamet_pulse_only_when_enabled() {
        let series = TimeSeries::new(vec![0, 1, 2])
            .unwrap()
            .with_pulse(vec![100.0, 160.0, 100.0])
            .unwrap();

        let raw = SignalSmoother::smooth(&series, &SmoothingAlgorithm::default());
        assert_eq!(raw.pulse, Some(vec![100.0, 160.0, 100.0]));

        let config = SmoothingConfig::default().with_pulse(true);
        let filtered = SignalSmoother::smooth(&series, &SmoothingAlgorithm::Jamet(config));
        let pulse = filtered.pulse.unwrap();
        assert!(pulse[1] < 160.0);
    }

    #[test]
    fn test_smoother_does_not_modify_input() {
        let series = TimeSeries::new(vec![0, 10, 20])
            .unwrap()
            .with_distance(vec![0.0, 10.0, 50.0])
            .unwrap();
        let before = series.clone();

        let _ = SignalSmoother::smooth(&series, &SmoothingAlgorithm::default());
        let _ = SignalSmoother::smooth(&series, &SmoothingAlgorithm::initial());

        assert_eq!(series, before);
    }

    #[test]
    fn test_initial_speed() {
        let series = TimeSeries::new(vec![0, 5, 10, 15, 20])
            .unwrap()
            .with_distance(vec![0.0, 50.0, 100.0, 150.0, 200.0])
            .unwrap();

        let smoothed = SignalSmoother::smooth(&series, &SmoothingAlgorithm::initial());
        let speed = smoothed.speed.unwrap();

        assert_eq!(speed[0], 0.0);
        for value in &speed[1..] {
            assert!(approx(*value, 36.0));
        }
        assert_eq!(smoothed.pace.unwrap()[2], 100.0);
    }

    proptest! {
        #[test]
        fn prop_single_pass_stays_in_range(
            samples in prop::collection::vec((0u32..30, -500.0f64..500.0), 1..100),
            tau in 0.1f64..500.0,
        ) {
            let mut t = 0;
            let time: Vec<u32> = samples.iter().map(|(dt, _)| { t += dt; t }).collect();
            let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();

            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            let smoothed = jamet_filter(&time, &values, tau);
            prop_assert_eq!(smoothed.len(), values.len());
            prop_assert_eq!(smoothed[0], values[0]);
            for value in smoothed {
                prop_assert!(value >= min - 1e-9 && value <= max + 1e-9);
            }
        }
    }
}
