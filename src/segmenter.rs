//! Tour segmentation
//!
//! This module cuts a tour into segments with one of eight strategies:
//! - Douglas-Peucker over altitude, plain or merged by vertical direction
//! - Markers, optionally with merged altitude points for the up/down sums
//! - Douglas-Peucker over pulse
//! - Fixed distance
//! - Altitude reversals
//! - Moving/break transitions
//!
//! Every strategy declares the channels it needs. Callers are expected to
//! offer only the strategies reported by [`available_segmenters`]; invoking
//! an unavailable strategy returns [`ComputeError::SegmenterUnavailable`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::altitude::altitude_up_down;
use crate::breaks::BreakTimeDetector;
use crate::config::{BreakMethod, SegmenterConfig, ALTITUDE_STEPS};
use crate::error::ComputeError;
use crate::simplify::{DouglasPeucker, DpPoint};
use crate::types::{
    BoundaryBuilder, BreakClassification, Channel, Channels, MarkerSet, SegmentBoundary,
    TimeSeries,
};

/// Segmentation strategies in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterKind {
    ByAltitudeDp,
    ByAltitudeDpMerged,
    ByAltitudeWithMarker,
    ByMarker,
    ByDistance,
    ByBreakTime,
    ByPulseDp,
    ByAltitudeUpDown,
}

impl SegmenterKind {
    pub const ALL: [SegmenterKind; 8] = [
        SegmenterKind::ByAltitudeDp,
        SegmenterKind::ByAltitudeDpMerged,
        SegmenterKind::ByAltitudeWithMarker,
        SegmenterKind::ByMarker,
        SegmenterKind::ByDistance,
        SegmenterKind::ByBreakTime,
        SegmenterKind::ByPulseDp,
        SegmenterKind::ByAltitudeUpDown,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            SegmenterKind::ByAltitudeDp => "by_altitude_dp",
            SegmenterKind::ByAltitudeDpMerged => "by_altitude_dp_merged",
            SegmenterKind::ByAltitudeWithMarker => "by_altitude_with_marker",
            SegmenterKind::ByMarker => "by_marker",
            SegmenterKind::ByDistance => "by_distance",
            SegmenterKind::ByBreakTime => "by_break_time",
            SegmenterKind::ByPulseDp => "by_pulse_dp",
            SegmenterKind::ByAltitudeUpDown => "by_altitude_up_down",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SegmenterKind::ByAltitudeDp => "Altitude - Douglas Peucker",
            SegmenterKind::ByAltitudeDpMerged => "Altitude - Douglas Peucker (merged)",
            SegmenterKind::ByAltitudeWithMarker => "Altitude - Marker",
            SegmenterKind::ByMarker => "Marker",
            SegmenterKind::ByDistance => "Distance",
            SegmenterKind::ByBreakTime => "Break Time",
            SegmenterKind::ByPulseDp => "Pulse - Douglas Peucker",
            SegmenterKind::ByAltitudeUpDown => "Altitude - Up/Down",
        }
    }

    pub fn required_channels(&self) -> Channels {
        match self {
            SegmenterKind::ByAltitudeDp | SegmenterKind::ByAltitudeDpMerged => {
                Channels::ALTITUDE | Channels::DISTANCE
            }
            SegmenterKind::ByAltitudeWithMarker => {
                Channels::ALTITUDE | Channels::DISTANCE | Channels::MARKER
            }
            SegmenterKind::ByMarker => Channels::MARKER,
            SegmenterKind::ByDistance | SegmenterKind::ByBreakTime => Channels::DISTANCE,
            SegmenterKind::ByPulseDp => Channels::PULSE,
            SegmenterKind::ByAltitudeUpDown => Channels::ALTITUDE,
        }
    }

    pub fn is_available(&self, channels: Channels) -> bool {
        channels.contains(self.required_channels())
    }

    /// Default configuration of this strategy
    pub fn default_config(&self) -> SegmenterConfig {
        let tolerance = SegmenterConfig::default_tolerance();
        match self {
            SegmenterKind::ByAltitudeDp => SegmenterConfig::ByAltitudeDp { tolerance },
            SegmenterKind::ByAltitudeDpMerged => SegmenterConfig::ByAltitudeDpMerged { tolerance },
            SegmenterKind::ByAltitudeWithMarker => {
                SegmenterConfig::ByAltitudeWithMarker { tolerance }
            }
            SegmenterKind::ByMarker => SegmenterConfig::ByMarker,
            SegmenterKind::ByDistance => SegmenterConfig::ByDistance {
                segment_distance: SegmenterConfig::DEFAULT_SEGMENT_DISTANCE,
            },
            SegmenterKind::ByBreakTime => SegmenterConfig::ByBreakTime {
                method: BreakMethod::default(),
            },
            SegmenterKind::ByPulseDp => SegmenterConfig::ByPulseDp { tolerance },
            SegmenterKind::ByAltitudeUpDown => SegmenterConfig::ByAltitudeUpDown {
                altitude_step: SegmenterConfig::DEFAULT_ALTITUDE_STEP,
            },
        }
    }
}

impl SegmenterConfig {
    pub fn kind(&self) -> SegmenterKind {
        match self {
            SegmenterConfig::ByAltitudeDp { .. } => SegmenterKind::ByAltitudeDp,
            SegmenterConfig::ByAltitudeDpMerged { .. } => SegmenterKind::ByAltitudeDpMerged,
            SegmenterConfig::ByAltitudeWithMarker { .. } => SegmenterKind::ByAltitudeWithMarker,
            SegmenterConfig::ByPulseDp { .. } => SegmenterKind::ByPulseDp,
            SegmenterConfig::ByDistance { .. } => SegmenterKind::ByDistance,
            SegmenterConfig::ByMarker => SegmenterKind::ByMarker,
            SegmenterConfig::ByAltitudeUpDown { .. } => SegmenterKind::ByAltitudeUpDown,
            SegmenterConfig::ByBreakTime { .. } => SegmenterKind::ByBreakTime,
        }
    }

    pub fn required_channels(&self) -> Channels {
        self.kind().required_channels()
    }

    pub fn is_available(&self, channels: Channels) -> bool {
        self.kind().is_available(channels)
    }
}

/// Capability listing entry of one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterInfo {
    pub kind: SegmenterKind,
    pub name: String,
    pub requires: Vec<Channel>,
    pub available: bool,
}

/// All strategies with their requirements and availability for `channels`
pub fn describe_segmenters(channels: Channels) -> Vec<SegmenterInfo> {
    SegmenterKind::ALL
        .iter()
        .map(|kind| SegmenterInfo {
            kind: *kind,
            name: kind.display_name().to_string(),
            requires: kind.required_channels().iter().collect(),
            available: kind.is_available(channels),
        })
        .collect()
}

/// Strategies whose required channels are present, in display order
pub fn available_segmenters(series: &TimeSeries, markers: &MarkerSet) -> Vec<SegmenterKind> {
    let channels = Channels::of(series, markers);
    SegmenterKind::ALL
        .into_iter()
        .filter(|kind| kind.is_available(channels))
        .collect()
}

/// Output of a segmentation run
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub boundaries: SegmentBoundary,
    /// Per-segment altitude difference computed by the strategy
    pub computed_altitude_diffs: Option<Vec<f64>>,
    /// Break classification computed by the strategy
    pub breaks: Option<BreakClassification>,
    /// Secondary points used to accumulate altitude up/down inside segments
    pub inner_points: Option<Vec<usize>>,
}

impl Segmentation {
    fn from_boundaries(boundaries: SegmentBoundary) -> Self {
        Self {
            boundaries,
            computed_altitude_diffs: None,
            breaks: None,
            inner_points: None,
        }
    }
}

/// Segmenter dispatching to the configured strategy
pub struct Segmenter;

impl Segmenter {
    pub fn segment(
        series: &TimeSeries,
        markers: &MarkerSet,
        config: &SegmenterConfig,
    ) -> Result<Segmentation, ComputeError> {
        markers.validate(series.len())?;

        let kind = config.kind();
        let channels = Channels::of(series, markers);
        let missing = channels.missing(kind.required_channels());
        if !missing.is_empty() {
            warn!(segmenter = kind.id(), %missing, "segmenter unavailable");
            return Err(ComputeError::SegmenterUnavailable {
                segmenter: kind.id().to_string(),
                missing: missing.to_string(),
            });
        }

        let segmentation = match *config {
            SegmenterConfig::ByAltitudeDp { tolerance } => {
                let points = altitude_points(series)?;
                let simplified = DouglasPeucker::new(tolerance).simplify(&points);
                Segmentation::from_boundaries(boundaries_from_points(series, &simplified))
            }
            SegmenterConfig::ByAltitudeDpMerged { tolerance } => {
                let merged = merged_altitude_points(series, tolerance, &BTreeSet::new())?;
                Segmentation::from_boundaries(merged)
            }
            SegmenterConfig::ByAltitudeWithMarker { tolerance } => {
                let boundaries = marker_boundaries(series.len(), markers);
                let forced: BTreeSet<usize> = boundaries.as_slice().iter().copied().collect();
                let inner = merged_altitude_points(series, tolerance, &forced)?;
                Segmentation {
                    inner_points: Some(inner.into_inner()),
                    ..Segmentation::from_boundaries(boundaries)
                }
            }
            SegmenterConfig::ByPulseDp { tolerance } => {
                let pulse = series.require_pulse()?;
                let points: Vec<DpPoint> = series
                    .time()
                    .iter()
                    .zip(pulse)
                    .enumerate()
                    .map(|(index, (&time, &pulse))| DpPoint::new(time as f64, pulse, index))
                    .collect();
                let simplified = DouglasPeucker::new(tolerance).simplify(&points);
                Segmentation::from_boundaries(boundaries_from_points(series, &simplified))
            }
            SegmenterConfig::ByDistance { segment_distance } => {
                Segmentation::from_boundaries(distance_boundaries(series, segment_distance)?)
            }
            SegmenterConfig::ByMarker => {
                Segmentation::from_boundaries(marker_boundaries(series.len(), markers))
            }
            SegmenterConfig::ByAltitudeUpDown { altitude_step } => {
                let altitude = series.require_altitude()?;
                let min_diff = ALTITUDE_STEPS[altitude_step.min(ALTITUDE_STEPS.len() - 1)];
                let walk = altitude_up_down(altitude, min_diff);
                Segmentation {
                    computed_altitude_diffs: Some(walk.segment_diffs),
                    ..Segmentation::from_boundaries(SegmentBoundary::new(
                        walk.boundaries,
                        series.len(),
                    )?)
                }
            }
            SegmenterConfig::ByBreakTime { method } => {
                let breaks = BreakTimeDetector::detect(series, &method)?;
                let boundaries = break_boundaries(series.len(), breaks.flags());
                Segmentation {
                    breaks: Some(breaks),
                    ..Segmentation::from_boundaries(boundaries)
                }
            }
        };

        debug!(
            segmenter = kind.id(),
            samples = series.len(),
            segments = segmentation.boundaries.segment_count(),
            "tour segmented"
        );

        Ok(segmentation)
    }
}

fn altitude_points(series: &TimeSeries) -> Result<Vec<DpPoint>, ComputeError> {
    let distance = series.require_distance()?;
    let altitude = series.require_altitude()?;

    Ok(distance
        .iter()
        .zip(altitude)
        .enumerate()
        .map(|(index, (&distance, &altitude))| DpPoint::new(distance, altitude, index))
        .collect())
}

fn boundaries_from_points(series: &TimeSeries, points: &[DpPoint]) -> SegmentBoundary {
    let mut builder = BoundaryBuilder::new(series.len());
    for point in points {
        builder.push(point.index);
    }
    builder.finish()
}

/// Douglas-Peucker points over altitude, consecutive points with the same
/// vertical direction merged into one segment.
///
/// Forced points always stay.
fn merged_altitude_points(
    series: &TimeSeries,
    tolerance: f64,
    forced: &BTreeSet<usize>,
) -> Result<SegmentBoundary, ComputeError> {
    let points = altitude_points(series)?;
    let simplified = DouglasPeucker::new(tolerance).simplify_with_forced(&points, forced);

    let mut builder = BoundaryBuilder::new(series.len());
    let mut ascending: Option<bool> = None;

    for pair in simplified.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        let is_ascending = current.y - previous.y >= 0.0;

        let direction_changed = ascending.is_some_and(|was_ascending| was_ascending != is_ascending);
        if direction_changed || forced.contains(&previous.index) {
            builder.push(previous.index);
        }
        ascending = Some(is_ascending);
    }

    Ok(builder.finish())
}

/// A boundary at the first sample reaching every multiple of `segment_distance`
fn distance_boundaries(
    series: &TimeSeries,
    segment_distance: f64,
) -> Result<SegmentBoundary, ComputeError> {
    let distance = series.require_distance()?;
    let start = distance[0];
    let mut builder = BoundaryBuilder::new(series.len());

    if segment_distance > 0.0 {
        let mut next = segment_distance;
        for (index, &value) in distance.iter().enumerate() {
            let covered = value - start;
            if covered >= next {
                builder.push(index);
                next = ((covered / segment_distance).floor() + 1.0) * segment_distance;
            }
        }
    }

    Ok(builder.finish())
}

/// `{0} ∪ markers ∪ {len - 1}` without duplicates, markers must be validated
pub fn marker_boundaries(len: usize, markers: &MarkerSet) -> SegmentBoundary {
    let mut builder = BoundaryBuilder::new(len);
    for index in markers.iter() {
        builder.push(index);
    }
    builder.finish()
}

/// Boundaries at moving/break transitions.
///
/// A single interval whose state differs from both neighbouring runs takes
/// over the state of the run before it. A transition at interval `i` places
/// the boundary at sample `i - 1`.
fn break_boundaries(len: usize, flags: &[bool]) -> SegmentBoundary {
    let mut states = flags.to_vec();
    for index in 2..states.len().saturating_sub(1) {
        if states[index] != states[index - 1] && states[index + 1] == states[index - 1] {
            states[index] = states[index - 1];
        }
    }

    let mut builder = BoundaryBuilder::new(len);
    for index in 2..states.len() {
        if states[index] != states[index - 1] {
            builder.push(index - 1);
        }
    }
    builder.finish()
}
