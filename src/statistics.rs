//! Segment statistics
//!
//! Turns segment boundaries and the tour channels into per-segment records
//! and a totals row. Divisions by a zero time or distance yield 0 instead of
//! NaN or infinity; values without a previous segment are `None`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::altitude::sum_up_down;
use crate::error::ComputeError;
use crate::segmenter::Segmentation;
use crate::types::{
    BreakClassification, Channel, SegmentBoundary, SegmentTotals, TimeSeries, TourSegment,
};

/// Per-segment records and their totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTable {
    pub segments: Vec<TourSegment>,
    pub totals: SegmentTotals,
}

/// Builder for segment statistics of one tour
#[derive(Debug, Clone, Copy)]
pub struct SegmentStatisticsBuilder<'a> {
    series: &'a TimeSeries,
    breaks: Option<&'a BreakClassification>,
    altitude: Option<&'a [f64]>,
    computed_altitude_diffs: Option<&'a [f64]>,
    inner_points: Option<&'a [usize]>,
}

impl<'a> SegmentStatisticsBuilder<'a> {
    pub fn new(series: &'a TimeSeries) -> Self {
        Self {
            series,
            breaks: None,
            altitude: series.altitude(),
            computed_altitude_diffs: None,
            inner_points: None,
        }
    }

    /// Break classification for the break and driving times
    pub fn with_breaks(self, breaks: &'a BreakClassification) -> Self {
        Self {
            breaks: Some(breaks),
            ..self
        }
    }

    /// Altitude values to use instead of the raw channel, e.g. smoothed altitude
    pub fn with_altitude(self, altitude: &'a [f64]) -> Self {
        Self {
            altitude: Some(altitude),
            ..self
        }
    }

    /// One altitude difference per segment, computed by the segmenter
    pub fn with_computed_altitude_diffs(self, diffs: &'a [f64]) -> Self {
        Self {
            computed_altitude_diffs: Some(diffs),
            ..self
        }
    }

    /// Points between which altitude up/down is accumulated
    pub fn with_inner_points(self, points: &'a [usize]) -> Self {
        Self {
            inner_points: Some(points),
            ..self
        }
    }

    /// Take over everything a segmentation run produced besides the boundaries
    pub fn with_segmentation(self, segmentation: &'a Segmentation) -> Self {
        let mut builder = self;
        if let Some(breaks) = &segmentation.breaks {
            builder = builder.with_breaks(breaks);
        }
        if let Some(diffs) = &segmentation.computed_altitude_diffs {
            builder = builder.with_computed_altitude_diffs(diffs);
        }
        if let Some(points) = &segmentation.inner_points {
            builder = builder.with_inner_points(points);
        }
        builder
    }

    /// Validate raw indices as boundaries and build the table
    pub fn build_from_indices(&self, indices: &[usize]) -> Result<SegmentTable, ComputeError> {
        let boundaries = SegmentBoundary::new(indices.to_vec(), self.series.len())?;
        self.build(&boundaries)
    }

    pub fn build(&self, boundaries: &SegmentBoundary) -> Result<SegmentTable, ComputeError> {
        self.validate(boundaries)?;

        let series = self.series;
        let time = series.time();
        let distance = series.distance();
        let altitude = self.altitude;
        let pulse = series.pulse();

        let mut segments: Vec<TourSegment> = Vec::with_capacity(boundaries.segment_count());
        let mut time_total = 0;
        let mut distance_total = 0.0;

        for (segment_index, (start, end)) in boundaries.pairs().enumerate() {
            let recording_time = time[end] - time[start];
            let break_time = self
                .breaks
                .map(|breaks| breaks.break_seconds_between(series, start, end))
                .unwrap_or(0);
            let driving_time = recording_time.saturating_sub(break_time);

            time_total += recording_time;

            let distance_delta = distance.map(|d| d[end] - d[start]).unwrap_or(0.0);
            distance_total += distance_delta;

            let (altitude_diff_border, altitude_diff_computed, altitude_up, altitude_down) =
                match altitude {
                    Some(altitude) => {
                        let border = altitude[end] - altitude[start];
                        let computed = match self.computed_altitude_diffs {
                            Some(diffs) => diffs[segment_index],
                            None => signed_span(&altitude[start..=end]),
                        };
                        let (up, down) = self.altitude_up_down(altitude, start, end);
                        (border, computed, up, down)
                    }
                    None => (0.0, 0.0, 0.0, 0.0),
                };

            let avg_pulse = pulse.map(|p| mean(&p[start..=end]));

            let previous = segments.last();
            let avg_pace = ratio(driving_time as f64, distance_delta);
            let pace_diff = previous.map(|p| avg_pace - p.avg_pace);
            let pulse_diff = match (avg_pulse, previous.and_then(|p| p.avg_pulse)) {
                (Some(current), Some(previous)) => Some(current - previous),
                _ => None,
            };

            segments.push(TourSegment {
                start_index: start,
                end_index: end,
                recording_time,
                driving_time,
                break_time,
                time_total,
                distance_delta,
                distance_total,
                altitude_diff_border,
                altitude_diff_computed,
                altitude_up,
                altitude_down,
                altimeter: ratio(altitude_diff_border, driving_time as f64) * 3600.0,
                avg_speed: ratio(distance_delta, driving_time as f64),
                avg_pace,
                avg_pulse,
                gradient: ratio(altitude_diff_border, distance_delta) * 100.0,
                pace_diff,
                pulse_diff,
            });
        }

        let totals = totals(&segments, pulse);

        debug!(
            segments = segments.len(),
            recording_time = totals.recording_time,
            distance = totals.distance,
            "segment statistics"
        );

        Ok(SegmentTable { segments, totals })
    }

    fn validate(&self, boundaries: &SegmentBoundary) -> Result<(), ComputeError> {
        let len = self.series.len();

        if boundaries.as_slice().last() != Some(&self.series.last_index()) {
            return Err(ComputeError::InvalidBoundary(format!(
                "boundaries do not end at the last of {len} samples"
            )));
        }

        if let Some(altitude) = self.altitude {
            if altitude.len() != len {
                return Err(ComputeError::ChannelLengthMismatch {
                    channel: Channel::Altitude,
                    expected: len,
                    actual: altitude.len(),
                });
            }
        }

        if let Some(breaks) = self.breaks {
            if breaks.flags().len() != len {
                return Err(ComputeError::ValidationError(format!(
                    "break classification covers {} samples, expected {len}",
                    breaks.flags().len()
                )));
            }
        }

        if let Some(diffs) = self.computed_altitude_diffs {
            if diffs.len() != boundaries.segment_count() {
                return Err(ComputeError::InvalidBoundary(format!(
                    "{} computed altitude differences for {} segments",
                    diffs.len(),
                    boundaries.segment_count()
                )));
            }
        }

        if let Some(points) = self.inner_points {
            let increasing = points.windows(2).all(|w| w[0] < w[1]);
            if !increasing || points.last().is_some_and(|&last| last >= len) {
                return Err(ComputeError::InvalidBoundary(
                    "inner points must be increasing sample indices".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Up/down over the inner points inside `(start, end]`, or over every sample
    fn altitude_up_down(&self, altitude: &[f64], start: usize, end: usize) -> (f64, f64) {
        match self.inner_points {
            Some(points) => {
                let inside = points
                    .iter()
                    .copied()
                    .filter(|&index| index > start && index <= end);
                sum_up_down(std::iter::once(start).chain(inside).map(|index| altitude[index]))
            }
            None => sum_up_down(altitude[start..=end].iter().copied()),
        }
    }
}

fn totals(segments: &[TourSegment], pulse: Option<&[f64]>) -> SegmentTotals {
    let mut totals = SegmentTotals {
        segment_count: segments.len(),
        avg_pulse: pulse.map(mean),
        ..SegmentTotals::default()
    };

    for segment in segments {
        totals.recording_time += segment.recording_time;
        totals.driving_time += segment.driving_time;
        totals.break_time += segment.break_time;
        totals.distance += segment.distance_delta;
        totals.altitude_up += segment.altitude_up;
        totals.altitude_down += segment.altitude_down;
    }

    totals.avg_speed = ratio(totals.distance, totals.driving_time as f64);
    totals.avg_pace = ratio(totals.driving_time as f64, totals.distance);
    totals
}

/// `numerator / denominator`, 0 for a zero denominator
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

/// Min/max span of `values`, negative when the last value is below the first
fn signed_span(values: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
        return 0.0;
    };

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    if last < first {
        -span
    } else {
        span
    }
}
