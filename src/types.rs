//! Core types for the tour segmenter
//!
//! This module defines the data structures that flow between the engine
//! components: the raw sample arrays of a tour, marker indices, segment
//! boundaries, break classifications, smoothed channels and segment records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitOr;

use crate::error::ComputeError;

/// Identifies one data channel of a tour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Time,
    Distance,
    Altitude,
    Pulse,
    Marker,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Time => "time",
            Channel::Distance => "distance",
            Channel::Altitude => "altitude",
            Channel::Pulse => "pulse",
            Channel::Marker => "marker",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit set of the optional channels a tour provides or a segmenter requires.
///
/// Time is always present and therefore never part of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channels(u8);

impl Channels {
    pub const NONE: Channels = Channels(0);
    pub const ALTITUDE: Channels = Channels(1 << 0);
    pub const DISTANCE: Channels = Channels(1 << 1);
    pub const PULSE: Channels = Channels(1 << 2);
    pub const MARKER: Channels = Channels(1 << 3);

    const ALL: [(Channels, Channel); 4] = [
        (Channels::ALTITUDE, Channel::Altitude),
        (Channels::DISTANCE, Channel::Distance),
        (Channels::PULSE, Channel::Pulse),
        (Channels::MARKER, Channel::Marker),
    ];

    /// Channels available for a tour and its markers
    pub fn of(series: &TimeSeries, markers: &MarkerSet) -> Channels {
        let mut channels = series.channels();
        if !markers.is_empty() {
            channels = channels | Channels::MARKER;
        }
        channels
    }

    pub fn contains(self, other: Channels) -> bool {
        self.0 & other.0 == other.0
    }

    /// Channels of `required` which are not in `self`
    pub fn missing(self, required: Channels) -> Channels {
        Channels(required.0 & !self.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Self::ALL
            .into_iter()
            .filter(move |(bit, _)| self.contains(*bit))
            .map(|(_, channel)| channel)
    }
}

impl BitOr for Channels {
    type Output = Channels;

    fn bitor(self, rhs: Channels) -> Channels {
        Channels(self.0 | rhs.0)
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|c| c.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

/// Parallel sample arrays of one recorded tour.
///
/// `time` is always present. Every other channel is either present for all
/// samples or absent. Instances are validated on construction and immutable
/// afterwards; derived series are produced as new values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    /// Seconds relative to the tour start, non-decreasing
    time: Vec<u32>,
    /// Meters, non-decreasing
    distance: Option<Vec<f64>>,
    /// Meters
    altitude: Option<Vec<f64>>,
    /// Beats per minute
    pulse: Option<Vec<f64>>,
}

impl TimeSeries {
    /// Create a series from the time channel
    pub fn new(time: Vec<u32>) -> Result<Self, ComputeError> {
        if time.is_empty() {
            return Err(ComputeError::InvalidSeries(
                "time channel must contain at least one sample".to_string(),
            ));
        }

        if let Some(index) = time.windows(2).position(|w| w[1] < w[0]) {
            return Err(ComputeError::InvalidSeries(format!(
                "time decreases at sample {}",
                index + 1
            )));
        }

        Ok(Self {
            time,
            distance: None,
            altitude: None,
            pulse: None,
        })
    }

    /// Attach the distance channel (meters, non-decreasing)
    pub fn with_distance(mut self, distance: Vec<f64>) -> Result<Self, ComputeError> {
        self.check_channel(Channel::Distance, &distance)?;

        if let Some(index) = distance.windows(2).position(|w| w[1] < w[0]) {
            return Err(ComputeError::InvalidSeries(format!(
                "distance decreases at sample {}",
                index + 1
            )));
        }

        self.distance = Some(distance);
        Ok(self)
    }

    /// Attach the altitude channel (meters)
    pub fn with_altitude(mut self, altitude: Vec<f64>) -> Result<Self, ComputeError> {
        self.check_channel(Channel::Altitude, &altitude)?;
        self.altitude = Some(altitude);
        Ok(self)
    }

    /// Attach the pulse channel (bpm)
    pub fn with_pulse(mut self, pulse: Vec<f64>) -> Result<Self, ComputeError> {
        self.check_channel(Channel::Pulse, &pulse)?;
        self.pulse = Some(pulse);
        Ok(self)
    }

    fn check_channel(&self, channel: Channel, values: &[f64]) -> Result<(), ComputeError> {
        if values.len() != self.time.len() {
            return Err(ComputeError::ChannelLengthMismatch {
                channel,
                expected: self.time.len(),
                actual: values.len(),
            });
        }

        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ComputeError::InvalidSeries(format!(
                "{channel} is not finite at sample {index}"
            )));
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Always false, a series holds at least one sample
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.time.len() - 1
    }

    pub fn time(&self) -> &[u32] {
        &self.time
    }

    pub fn distance(&self) -> Option<&[f64]> {
        self.distance.as_deref()
    }

    pub fn altitude(&self) -> Option<&[f64]> {
        self.altitude.as_deref()
    }

    pub fn pulse(&self) -> Option<&[f64]> {
        self.pulse.as_deref()
    }

    pub fn require_distance(&self) -> Result<&[f64], ComputeError> {
        self.distance()
            .ok_or(ComputeError::MissingChannel(Channel::Distance))
    }

    pub fn require_altitude(&self) -> Result<&[f64], ComputeError> {
        self.altitude()
            .ok_or(ComputeError::MissingChannel(Channel::Altitude))
    }

    pub fn require_pulse(&self) -> Result<&[f64], ComputeError> {
        self.pulse().ok_or(ComputeError::MissingChannel(Channel::Pulse))
    }

    /// Seconds elapsed between the previous sample and `index` (0 for the first sample)
    pub fn elapsed(&self, index: usize) -> u32 {
        if index == 0 {
            0
        } else {
            self.time[index] - self.time[index - 1]
        }
    }

    /// Seconds between the first and the last sample
    pub fn recording_time(&self) -> u32 {
        self.time[self.last_index()] - self.time[0]
    }

    /// Meters between the first and the last sample, 0 without distance
    pub fn total_distance(&self) -> f64 {
        self.distance()
            .map(|d| d[d.len() - 1] - d[0])
            .unwrap_or(0.0)
    }

    /// Optional channels present in this series
    pub fn channels(&self) -> Channels {
        let mut channels = Channels::NONE;
        if self.distance.is_some() {
            channels = channels | Channels::DISTANCE;
        }
        if self.altitude.is_some() {
            channels = channels | Channels::ALTITUDE;
        }
        if self.pulse.is_some() {
            channels = channels | Channels::PULSE;
        }
        channels
    }

    /// Copy of this series with the altitude channel replaced
    pub fn replace_altitude(&self, altitude: Vec<f64>) -> Result<Self, ComputeError> {
        let mut series = self.clone();
        series.altitude = None;
        series.with_altitude(altitude)
    }
}

/// Set of sample indices carrying a tour marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerSet {
    indices: BTreeSet<usize>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, index: usize) -> bool {
        self.indices.insert(index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Marker indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Check that every marker lies inside a series of `len` samples
    pub fn validate(&self, len: usize) -> Result<(), ComputeError> {
        match self.indices.iter().next_back() {
            Some(&index) if index >= len => Err(ComputeError::InvalidMarker { index, len }),
            _ => Ok(()),
        }
    }
}

/// Strictly increasing sample indices which start at 0 and end at the last sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SegmentBoundary(Vec<usize>);

impl SegmentBoundary {
    /// Validate an index sequence for a series of `len` samples
    pub fn new(indices: Vec<usize>, len: usize) -> Result<Self, ComputeError> {
        if len == 0 {
            return Err(ComputeError::InvalidBoundary(
                "series has no samples".to_string(),
            ));
        }

        match (indices.first(), indices.last()) {
            (Some(&0), Some(&last)) if last == len - 1 => {}
            (Some(&first), Some(&last)) => {
                return Err(ComputeError::InvalidBoundary(format!(
                    "boundaries must span 0..={}, got {first}..={last}",
                    len - 1
                )));
            }
            _ => {
                return Err(ComputeError::InvalidBoundary(
                    "boundary sequence is empty".to_string(),
                ));
            }
        }

        if let Some(pos) = indices.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ComputeError::InvalidBoundary(format!(
                "index {} at position {} does not increase",
                indices[pos + 1],
                pos + 1
            )));
        }

        Ok(Self(indices))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Consecutive `(start, end)` index pairs
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.windows(2).map(|w| (w[0], w[1]))
    }
}

/// Collects boundary indices while keeping the boundary invariants.
///
/// Index 0 is pushed on creation, indices which do not increase are ignored
/// and `finish` appends the last sample when it is missing.
#[derive(Debug)]
pub(crate) struct BoundaryBuilder {
    indices: Vec<usize>,
    last_index: usize,
}

impl BoundaryBuilder {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            indices: vec![0],
            last_index: len.saturating_sub(1),
        }
    }

    pub(crate) fn push(&mut self, index: usize) -> bool {
        let is_new = index <= self.last_index
            && self.indices.last().map_or(true, |&last| index > last);
        if is_new {
            self.indices.push(index);
        }
        is_new
    }

    pub(crate) fn finish(mut self) -> SegmentBoundary {
        let last_index = self.last_index;
        self.push(last_index);
        SegmentBoundary(self.indices)
    }
}

/// Moving/break state of every sample.
///
/// Flag `i` describes the interval between sample `i - 1` and sample `i`; the
/// first sample carries no time and is never a break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakClassification {
    flags: Vec<bool>,
    total_break_seconds: u32,
}

impl BreakClassification {
    pub(crate) fn from_flags(series: &TimeSeries, mut flags: Vec<bool>) -> Self {
        debug_assert_eq!(flags.len(), series.len());

        if let Some(first) = flags.first_mut() {
            *first = false;
        }

        let total_break_seconds = (0..flags.len())
            .filter(|&index| flags[index])
            .map(|index| series.elapsed(index))
            .sum();

        Self {
            flags,
            total_break_seconds,
        }
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    pub fn is_break(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    pub fn total_break_seconds(&self) -> u32 {
        self.total_break_seconds
    }

    /// Break seconds of the intervals inside `[start, end]`
    pub fn break_seconds_between(&self, series: &TimeSeries, start: usize, end: usize) -> u32 {
        let end = end.min(self.flags.len().saturating_sub(1));
        ((start + 1)..=end)
            .filter(|&index| self.flags[index])
            .map(|index| series.elapsed(index))
            .sum()
    }

    /// Number of separate break runs
    pub fn break_count(&self) -> usize {
        self.flags
            .windows(2)
            .filter(|w| !w[0] && w[1])
            .count()
    }
}

/// Channels derived by a smoothing algorithm.
///
/// A channel is `None` when the raw series lacks its inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSeries {
    /// Meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<Vec<f64>>,
    /// km/h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<Vec<f64>>,
    /// Seconds per kilometer, 0 when standing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace: Option<Vec<f64>>,
    /// Percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<Vec<f64>>,
    /// Vertical speed in m/h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altimeter: Option<Vec<f64>>,
    /// bpm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse: Option<Vec<f64>>,
}

/// Aggregates of one segment between two boundary indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourSegment {
    pub start_index: usize,
    pub end_index: usize,

    /// Seconds
    pub recording_time: u32,
    /// Seconds
    pub driving_time: u32,
    /// Seconds
    pub break_time: u32,
    /// Recording time of this and all previous segments
    pub time_total: u32,

    /// Meters
    pub distance_delta: f64,
    /// Distance of this and all previous segments
    pub distance_total: f64,

    /// Altitude at the end minus altitude at the start
    pub altitude_diff_border: f64,
    /// Altitude difference computed from the altitude walk inside the segment
    pub altitude_diff_computed: f64,
    /// Sum of ascending altitude deltas
    pub altitude_up: f64,
    /// Sum of descending altitude deltas (negative or 0)
    pub altitude_down: f64,
    /// Border altitude difference per driving hour (m/h)
    pub altimeter: f64,

    /// Meters per second
    pub avg_speed: f64,
    /// Seconds per meter
    pub avg_pace: f64,
    /// bpm, `None` without a pulse channel
    pub avg_pulse: Option<f64>,
    /// Percent
    pub gradient: f64,

    /// Pace difference to the previous segment, `None` for the first segment
    pub pace_diff: Option<f64>,
    /// Pulse difference to the previous segment, `None` for the first segment
    pub pulse_diff: Option<f64>,
}

impl TourSegment {
    pub fn avg_speed_kmh(&self) -> f64 {
        self.avg_speed * 3.6
    }

    /// Seconds per kilometer
    pub fn avg_pace_per_km(&self) -> f64 {
        self.avg_pace * 1000.0
    }
}

/// Summary row over all segments of a tour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentTotals {
    pub segment_count: usize,
    pub recording_time: u32,
    pub driving_time: u32,
    pub break_time: u32,
    pub distance: f64,
    pub altitude_up: f64,
    pub altitude_down: f64,
    /// Meters per second
    pub avg_speed: f64,
    /// Seconds per meter
    pub avg_pace: f64,
    pub avg_pulse: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn series() -> TimeSeries {
        TimeSeries::new(vec![0, 5, 5, 20])
            .unwrap()
            .with_distance(vec![0.0, 10.0, 10.0, 80.0])
            .unwrap()
    }

    #[test]
    fn test_series_construction() {
        let series = series();

        assert_eq!(series.len(), 4);
        assert_eq!(series.elapsed(0), 0);
        assert_eq!(series.elapsed(2), 0);
        assert_eq!(series.elapsed(3), 15);
        assert_eq!(series.recording_time(), 20);
        assert_eq!(series.total_distance(), 80.0);
        assert_eq!(series.channels(), Channels::DISTANCE);
        assert!(matches!(
            series.require_altitude(),
            Err(ComputeError::MissingChannel(Channel::Altitude))
        ));
    }

    #[test]
    fn test_series_rejects_invalid_channels() {
        assert!(TimeSeries::new(vec![]).is_err());
        assert!(TimeSeries::new(vec![0, 10, 9]).is_err());

        let time = TimeSeries::new(vec![0, 10, 20]).unwrap();
        assert!(matches!(
            time.clone().with_pulse(vec![90.0]),
            Err(ComputeError::ChannelLengthMismatch {
                channel: Channel::Pulse,
                expected: 3,
                actual: 1
            })
        ));
        assert!(time
            .clone()
            .with_altitude(vec![1.0, f64::INFINITY, 2.0])
            .is_err());
        assert!(time.with_distance(vec![0.0, 5.0, 4.0]).is_err());
    }

    #[test]
    fn test_replace_altitude() {
        let series = series().with_altitude(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let replaced = series.replace_altitude(vec![0.0; 4]).unwrap();

        assert_eq!(replaced.altitude(), Some(&[0.0; 4][..]));
        assert_eq!(replaced.distance(), series.distance());
        assert!(series.replace_altitude(vec![0.0; 2]).is_err());
    }

    #[test]
    fn test_channels() {
        let markers = MarkerSet::from_indices([1]);
        let channels = Channels::of(&series(), &markers);

        assert!(channels.contains(Channels::DISTANCE | Channels::MARKER));
        assert_eq!(
            channels.missing(Channels::ALTITUDE | Channels::DISTANCE),
            Channels::ALTITUDE
        );
        assert_eq!(channels.to_string(), "distance, marker");
        assert_eq!(Channels::NONE.to_string(), "none");
    }

    #[test]
    fn test_marker_validation() {
        let mut markers = MarkerSet::from_indices([3, 1, 3]);
        assert_eq!(markers.len(), 2);
        assert!(markers.validate(4).is_ok());

        markers.insert(4);
        assert!(matches!(
            markers.validate(4),
            Err(ComputeError::InvalidMarker { index: 4, len: 4 })
        ));
    }

    #[test]
    fn test_segment_boundary() {
        let boundary = SegmentBoundary::new(vec![0, 2, 3], 4).unwrap();
        assert_eq!(boundary.segment_count(), 2);
        assert_eq!(boundary.pairs().collect::<Vec<_>>(), vec![(0, 2), (2, 3)]);

        assert!(SegmentBoundary::new(vec![0], 1).is_ok());
        assert!(SegmentBoundary::new(vec![0, 3], 3).is_err());
        assert!(SegmentBoundary::new(vec![1, 2], 3).is_err());
        assert!(SegmentBoundary::new(vec![0, 1, 1, 2], 3).is_err());
        assert!(SegmentBoundary::new(vec![], 3).is_err());
    }

    #[test]
    fn test_boundary_builder() {
        let mut builder = BoundaryBuilder::new(6);
        assert!(builder.push(2));
        assert!(!builder.push(2));
        assert!(!builder.push(1));
        assert!(!builder.push(9));

        assert_eq!(builder.finish().as_slice(), &[0, 2, 5]);
        assert_eq!(BoundaryBuilder::new(1).finish().as_slice(), &[0]);
    }

    #[test]
    fn test_break_classification() {
        let series = series();
        let breaks = BreakClassification::from_flags(&series, vec![true, false, true, true]);

        assert!(!breaks.is_break(0));
        assert_eq!(breaks.total_break_seconds(), 15);
        assert_eq!(breaks.break_seconds_between(&series, 0, 2), 0);
        assert_eq!(breaks.break_seconds_between(&series, 2, 3), 15);
        assert_eq!(breaks.break_count(), 1);
    }
}
