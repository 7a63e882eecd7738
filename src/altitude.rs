//! Altitude up/down analysis
//!
//! Walks the altitude channel and cuts it at direction reversals whose
//! preceding climb or descent reached a minimum altitude difference. Smaller
//! reversals are treated as noise and stay inside the current segment.

use serde::{Deserialize, Serialize};

/// Result of an altitude walk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AltitudeUpDown {
    /// Segment boundaries, first 0 and last the final sample
    pub boundaries: Vec<usize>,
    /// Signed min/max altitude span of each segment
    pub segment_diffs: Vec<f64>,
    /// Sum of all ascending segment spans
    pub altitude_up: f64,
    /// Sum of all descending segment spans (negative or 0)
    pub altitude_down: f64,
}

/// Segment `altitude` at climbs and descents of at least `min_diff` meters
pub fn altitude_up_down(altitude: &[f64], min_diff: f64) -> AltitudeUpDown {
    let mut result = AltitudeUpDown::default();
    let Some(&first) = altitude.first() else {
        return result;
    };

    result.boundaries.push(0);
    let last = altitude.len() - 1;
    if last == 0 {
        return result;
    }

    let mut segment_min = first;
    let mut segment_max = first;
    let mut segment_start_altitude = first;
    let mut previous_altitude = first;
    let mut previous_diff = 0.0;
    let mut climb = 0.0;
    let mut descent = 0.0;

    for (index, &value) in altitude.iter().enumerate().take(last).skip(1) {
        let diff = value - previous_altitude;

        if diff > 0.0 {
            if previous_diff >= 0.0 {
                climb += diff;
                segment_max = segment_max.max(value);
            } else {
                if descent <= -min_diff {
                    let span = segment_min - segment_max;
                    result.altitude_down += span;
                    result.boundaries.push(index - 1);
                    result.segment_diffs.push(span);

                    segment_min = previous_altitude;
                    segment_max = value;
                    segment_start_altitude = previous_altitude;
                } else {
                    segment_max = segment_max.max(value);
                }
                climb = diff;
                descent = 0.0;
            }
        } else if diff < 0.0 {
            if previous_diff <= 0.0 {
                descent += diff;
                segment_min = segment_min.min(value);
            } else {
                if climb >= min_diff {
                    let span = segment_max - segment_min;
                    result.altitude_up += span;
                    result.boundaries.push(index - 1);
                    result.segment_diffs.push(span);

                    segment_min = value;
                    segment_max = previous_altitude;
                    segment_start_altitude = previous_altitude;
                } else {
                    segment_min = segment_min.min(value);
                }
                climb = 0.0;
                descent = diff;
            }
        }

        if diff != 0.0 {
            previous_diff = diff;
        }
        previous_altitude = value;
    }

    let end_altitude = altitude[last];
    let span = segment_max.max(end_altitude) - segment_min.min(end_altitude);
    let span = if end_altitude < segment_start_altitude {
        -span
    } else {
        span
    };

    if span > 0.0 {
        result.altitude_up += span;
    } else {
        result.altitude_down += span;
    }
    result.boundaries.push(last);
    result.segment_diffs.push(span);

    result
}

/// Sum of ascending and descending deltas between consecutive values
pub fn sum_up_down<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut values = values.into_iter();
    let Some(mut previous) = values.next() else {
        return (0.0, 0.0);
    };

    let mut up = 0.0;
    let mut down = 0.0;
    for value in values {
        let delta = value - previous;
        if delta > 0.0 {
            up += delta;
        } else {
            down += delta;
        }
        previous = value;
    }

    (up, down)
}
