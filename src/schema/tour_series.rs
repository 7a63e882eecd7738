//! tour.series.v1 schema definition
//!
//! A self-contained JSON document carrying one recorded tour:
//! - the sample channels (time plus optional distance, altitude and pulse)
//! - marker indices set by the user
//! - an optional analysis configuration
//! - optional information about the recording device

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::ComputeError;
use crate::types::{Channel, MarkerSet, TimeSeries};

/// Current schema version
pub const SCHEMA_VERSION: &str = "tour.series.v1";

/// Where the samples were recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TourSource {
    /// Device name, e.g. "Edge 530"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Wall clock time of the first sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// One tour as exchanged over JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourSeriesDocument {
    /// Schema version (must be "tour.series.v1")
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TourSource>,
    /// Seconds since the tour start
    pub time: Vec<u32>,
    /// Meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<Vec<f64>>,
    /// Meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<Vec<f64>>,
    /// bpm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<Vec<f64>>,
    /// Sample indices of the tour markers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AnalysisConfig>,
}

/// The parts of a document the engine works on
#[derive(Debug, Clone)]
pub struct TourInput {
    pub series: TimeSeries,
    pub markers: MarkerSet,
    pub config: AnalysisConfig,
    pub source: Option<TourSource>,
}

impl TourSeriesDocument {
    /// Create a document with only the time channel
    pub fn new(time: Vec<u32>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            source: None,
            time,
            distance: None,
            altitude: None,
            pulse: None,
            markers: Vec::new(),
            config: None,
        }
    }

    pub fn with_distance(mut self, distance: Vec<f64>) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_altitude(mut self, altitude: Vec<f64>) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_pulse(mut self, pulse: Vec<f64>) -> Self {
        self.pulse = Some(pulse);
        self
    }

    pub fn with_markers(mut self, markers: Vec<usize>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_source(mut self, source: TourSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Parse a document from JSON without validating it
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the document schema and channel contents
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if self.time.is_empty() {
            return Err(ValidationError::EmptyTime);
        }

        if let Some(index) = self.time.windows(2).position(|w| w[1] < w[0]) {
            return Err(ValidationError::NotMonotonic {
                channel: Channel::Time,
                index: index + 1,
            });
        }

        let len = self.time.len();
        for (channel, values) in self.channels() {
            if values.len() != len {
                return Err(ValidationError::LengthMismatch {
                    channel,
                    expected: len,
                    actual: values.len(),
                });
            }

            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                return Err(ValidationError::NonFinite { channel, index });
            }
        }

        if let Some(distance) = &self.distance {
            if let Some(index) = distance.windows(2).position(|w| w[1] < w[0]) {
                return Err(ValidationError::NotMonotonic {
                    channel: Channel::Distance,
                    index: index + 1,
                });
            }
        }

        if let Some(&index) = self.markers.iter().find(|&&index| index >= len) {
            return Err(ValidationError::MarkerOutOfRange { index, len });
        }

        Ok(())
    }

    /// Validate and convert into engine inputs.
    ///
    /// A missing configuration falls back to `default_config`; the result is
    /// always clamped.
    pub fn into_input(self, default_config: AnalysisConfig) -> Result<TourInput, ComputeError> {
        self.validate()
            .map_err(|e| ComputeError::ValidationError(e.to_string()))?;

        let mut series = TimeSeries::new(self.time)?;
        if let Some(distance) = self.distance {
            series = series.with_distance(distance)?;
        }
        if let Some(altitude) = self.altitude {
            series = series.with_altitude(altitude)?;
        }
        if let Some(pulse) = self.pulse {
            series = series.with_pulse(pulse)?;
        }

        Ok(TourInput {
            series,
            markers: MarkerSet::from_indices(self.markers),
            config: self.config.unwrap_or(default_config).clamped(),
            source: self.source,
        })
    }

    fn channels(&self) -> impl Iterator<Item = (Channel, &Vec<f64>)> {
        [
            (Channel::Distance, self.distance.as_ref()),
            (Channel::Altitude, self.altitude.as_ref()),
            (Channel::Pulse, self.pulse.as_ref()),
        ]
        .into_iter()
        .filter_map(|(channel, values)| values.map(|v| (channel, v)))
    }
}

/// Validation errors for tour documents
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Time channel is empty")]
    EmptyTime,

    #[error("Channel {channel} has {actual} samples, expected {expected}")]
    LengthMismatch {
        channel: Channel,
        expected: usize,
        actual: usize,
    },

    #[error("Channel {channel} decreases at sample {index}")]
    NotMonotonic { channel: Channel, index: usize },

    #[error("Channel {channel} has a non-finite value at sample {index}")]
    NonFinite { channel: Channel, index: usize },

    #[error("Marker {index} is outside of {len} samples")]
    MarkerOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmenterConfig;
    use pretty_assertions::assert_eq;

    fn document() -> TourSeriesDocument {
        TourSeriesDocument::new(vec![0, 10, 20, 30])
            .with_distance(vec![0.0, 40.0, 90.0, 150.0])
            .with_altitude(vec![200.0, 204.0, 210.0, 205.0])
            .with_markers(vec![2])
    }

    #[test]
    fn test_deserialize_document() {
        let json = r#"{
            "schema_version": "tour.series.v1",
            "source": { "device": "Edge 530", "started_at": "2024-06-01T07:30:00Z" },
            "time": [0, 5, 10],
            "distance": [0.0, 20.0, 45.0],
            "markers": [1],
            "config": { "segmenter": { "segmenter": "by_marker" } }
        }"#;

        let doc = TourSeriesDocument::from_json(json).unwrap();
        assert_eq!(doc.schema_version, SCHEMA_VERSION);
        assert_eq!(doc.time, vec![0, 5, 10]);
        assert_eq!(doc.altitude, None);
        assert_eq!(doc.markers, vec![1]);
        assert!(doc.validate().is_ok());

        let started = doc.source.as_ref().and_then(|s| s.started_at).unwrap();
        assert_eq!(started.to_rfc3339(), "2024-06-01T07:30:00+00:00");
        assert_eq!(
            doc.config.map(|c| c.segmenter),
            Some(SegmenterConfig::ByMarker)
        );
    }

    #[test]
    fn test_serialize_skips_absent_channels() {
        let json = serde_json::to_string(&TourSeriesDocument::new(vec![0, 1])).unwrap();

        assert!(json.contains("tour.series.v1"));
        assert!(!json.contains("distance"));
        assert!(!json.contains("markers"));
    }

    #[test]
    fn test_validation_errors() {
        let mut doc = document();
        doc.schema_version = "tour.series.v0".to_string();
        assert!(matches!(
            doc.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));

        assert_eq!(
            TourSeriesDocument::new(vec![]).validate(),
            Err(ValidationError::EmptyTime)
        );

        assert_eq!(
            TourSeriesDocument::new(vec![0, 10, 5]).validate(),
            Err(ValidationError::NotMonotonic {
                channel: Channel::Time,
                index: 2
            })
        );

        let doc = document().with_pulse(vec![90.0, 95.0]);
        assert_eq!(
            doc.validate(),
            Err(ValidationError::LengthMismatch {
                channel: Channel::Pulse,
                expected: 4,
                actual: 2
            })
        );

        let doc = document().with_altitude(vec![200.0, f64::NAN, 210.0, 205.0]);
        assert_eq!(
            doc.validate(),
            Err(ValidationError::NonFinite {
                channel: Channel::Altitude,
                index: 1
            })
        );

        let doc = document().with_distance(vec![0.0, 40.0, 30.0, 150.0]);
        assert_eq!(
            doc.validate(),
            Err(ValidationError::NotMonotonic {
                channel: Channel::Distance,
                index: 2
            })
        );

        let doc = document().with_markers(vec![1, 4]);
        assert_eq!(
            doc.validate(),
            Err(ValidationError::MarkerOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn test_into_input() {
        let input = document().into_input(AnalysisConfig::default()).unwrap();

        assert_eq!(input.series.len(), 4);
        assert!(input.series.distance().is_some());
        assert!(input.series.pulse().is_none());
        assert_eq!(input.markers.iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(input.config, AnalysisConfig::default());
    }

    #[test]
    fn test_into_input_rejects_invalid_document() {
        let result = document()
            .with_markers(vec![9])
            .into_input(AnalysisConfig::default());

        assert!(matches!(result, Err(ComputeError::ValidationError(_))));
    }
}
