//! Report encoding
//!
//! This module turns a finished tour analysis into the JSON report handed to
//! callers of the JSON, FFI and CLI surfaces. Every report names its producer
//! and the time it was computed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ComputeError;
use crate::pipeline::TourAnalysis;
use crate::schema::TourSource;
use crate::types::{Channel, SegmentTotals, SmoothedSeries, TourSegment};
use crate::{ENGINE_VERSION, PRODUCER_NAME};

/// Current report schema version
pub const REPORT_VERSION: &str = "tour.report.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProvenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Wall clock start of the tour, when the input carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tour_started_at_utc: Option<String>,
    pub computed_at_utc: String,
}

/// Break totals of the whole tour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakSummary {
    pub method: String,
    pub total_break_seconds: u32,
    pub break_count: usize,
    /// Share of the recording time spent in breaks (0.0 - 1.0)
    pub break_ratio: f64,
}

/// Analysis report of one tour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub segmenter: String,
    pub sample_count: usize,
    pub channels: Vec<Channel>,
    pub boundaries: Vec<usize>,
    pub segments: Vec<TourSegment>,
    pub totals: SegmentTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_summary: Option<BreakSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothed: Option<SmoothedSeries>,
}

/// Report encoder carrying the producer instance id
#[derive(Debug, Clone)]
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(
        &self,
        analysis: &TourAnalysis,
        source: Option<&TourSource>,
    ) -> Result<TourReport, ComputeError> {
        self.encode_at(analysis, source, Utc::now())
    }

    /// Encode to a pretty printed JSON string
    pub fn encode_to_json(
        &self,
        analysis: &TourAnalysis,
        source: Option<&TourSource>,
    ) -> Result<String, ComputeError> {
        let report = self.encode(analysis, source)?;
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }

    fn encode_at(
        &self,
        analysis: &TourAnalysis,
        source: Option<&TourSource>,
        computed_at: DateTime<Utc>,
    ) -> Result<TourReport, ComputeError> {
        let boundaries = analysis.boundaries.as_slice();
        if boundaries.last().map(|&last| last + 1) != Some(analysis.sample_count) {
            return Err(ComputeError::EncodingError(format!(
                "boundaries do not cover {} samples",
                analysis.sample_count
            )));
        }
        if analysis.segments.len() != analysis.boundaries.segment_count() {
            return Err(ComputeError::EncodingError(format!(
                "{} segments for {} boundaries",
                analysis.segments.len(),
                boundaries.len()
            )));
        }

        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            device: source.and_then(|s| s.device.clone()),
            tour_started_at_utc: source.and_then(|s| s.started_at).map(|t| t.to_rfc3339()),
            computed_at_utc: computed_at.to_rfc3339(),
        };

        Ok(TourReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            segmenter: analysis.segmenter.id().to_string(),
            sample_count: analysis.sample_count,
            channels: analysis.channels.iter().collect(),
            boundaries: boundaries.to_vec(),
            segments: analysis.segments.clone(),
            totals: analysis.totals.clone(),
            break_summary: self.build_break_summary(analysis),
            smoothed: analysis.smoothed.clone(),
        })
    }

    fn build_break_summary(&self, analysis: &TourAnalysis) -> Option<BreakSummary> {
        let breaks = analysis.breaks.as_ref()?;
        let method = analysis.break_method?;

        let recording_time = analysis.totals.recording_time;
        let break_ratio = if recording_time == 0 {
            0.0
        } else {
            breaks.total_break_seconds() as f64 / recording_time as f64
        };

        Some(BreakSummary {
            method: method.id().to_string(),
            total_break_seconds: breaks.total_break_seconds(),
            break_count: breaks.break_count(),
            break_ratio,
        })
    }
}
