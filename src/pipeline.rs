//! Pipeline orchestration
//!
//! This module provides the public API of the tour segmenter. It runs one tour
//! through the engine stages and wraps the JSON entry points used by the FFI
//! and the CLI.
//!
//! Pipeline stages:
//! 1. SignalSmoother - derive smoothed channels (optional)
//! 2. Segmenter - compute segment boundaries with the selected strategy
//! 3. BreakTimeDetector - classify breaks unless the strategy already did
//! 4. SegmentStatisticsBuilder - per-segment records and totals

use serde::Serialize;
use tracing::debug;

use crate::breaks::BreakTimeDetector;
use crate::config::{AnalysisConfig, BreakMethod, SegmenterConfig};
use crate::encoder::ReportEncoder;
use crate::error::ComputeError;
use crate::schema::TourSeriesDocument;
use crate::segmenter::{describe_segmenters, Segmenter, SegmenterKind};
use crate::smoothing::SignalSmoother;
use crate::statistics::SegmentStatisticsBuilder;
use crate::types::{
    BreakClassification, Channels, MarkerSet, SegmentBoundary, SegmentTotals, SmoothedSeries,
    TimeSeries, TourSegment,
};

/// Everything computed for one tour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourAnalysis {
    pub segmenter: SegmenterKind,
    pub sample_count: usize,
    pub channels: Channels,
    pub boundaries: SegmentBoundary,
    pub segments: Vec<TourSegment>,
    pub totals: SegmentTotals,
    /// `None` when the tour has no distance channel
    pub breaks: Option<BreakClassification>,
    pub break_method: Option<BreakMethod>,
    pub smoothed: Option<SmoothedSeries>,
}

/// Analyze one tour.
///
/// The configuration is clamped first. With `use_smoothed_altitude` the
/// segmenter and the statistics see the smoothed altitude channel.
pub fn analyze_tour(
    series: &TimeSeries,
    markers: &MarkerSet,
    config: &AnalysisConfig,
) -> Result<TourAnalysis, ComputeError> {
    let config = config.clamped();

    // Stage 1: smoothing
    let smoothed = (config.use_smoothed_altitude || config.include_smoothed)
        .then(|| SignalSmoother::smooth(series, &config.smoothing));

    let smoothed_altitude_series;
    let working = match smoothed.as_ref().and_then(|s| s.altitude.as_ref()) {
        Some(altitude) if config.use_smoothed_altitude => {
            smoothed_altitude_series = series.replace_altitude(altitude.clone())?;
            &smoothed_altitude_series
        }
        _ => series,
    };

    // Stage 2: segmentation
    let mut segmentation = Segmenter::segment(working, markers, &config.segmenter)?;

    // Stage 3: breaks
    let (breaks, break_method) = match (segmentation.breaks.take(), config.segmenter) {
        (Some(breaks), SegmenterConfig::ByBreakTime { method }) => (Some(breaks), Some(method)),
        (Some(breaks), _) => (Some(breaks), None),
        (None, _) if working.distance().is_some() => (
            Some(BreakTimeDetector::detect(working, &config.break_method)?),
            Some(config.break_method),
        ),
        (None, _) => (None, None),
    };

    // Stage 4: statistics
    let mut builder = SegmentStatisticsBuilder::new(working).with_segmentation(&segmentation);
    if let Some(breaks) = &breaks {
        builder = builder.with_breaks(breaks);
    }
    let table = builder.build(&segmentation.boundaries)?;

    debug!(
        segmenter = config.segmenter.kind().id(),
        segments = table.segments.len(),
        break_seconds = breaks.as_ref().map_or(0, |b| b.total_break_seconds()),
        "tour analyzed"
    );

    Ok(TourAnalysis {
        segmenter: config.segmenter.kind(),
        sample_count: series.len(),
        channels: Channels::of(series, markers),
        boundaries: segmentation.boundaries,
        segments: table.segments,
        totals: table.totals,
        breaks,
        break_method,
        smoothed: smoothed.filter(|_| config.include_smoothed),
    })
}

/// Analyze a `tour.series.v1` JSON document and return the JSON report.
///
/// # Example
/// ```ignore
/// let report = analyze_tour_json(document_json)?;
/// ```
pub fn analyze_tour_json(json: String) -> Result<String, ComputeError> {
    TourAnalyzer::new().analyze_json(&json)
}

/// Describe every segmenter and whether the document's channels support it
pub fn available_segmenters_json(json: String) -> Result<String, ComputeError> {
    let input = TourSeriesDocument::from_json(&json)?.into_input(AnalysisConfig::default())?;
    let channels = Channels::of(&input.series, &input.markers);

    serde_json::to_string_pretty(&describe_segmenters(channels)).map_err(ComputeError::JsonError)
}

/// Smooth a `tour.series.v1` document with its configured algorithm
pub fn smooth_tour_json(json: String) -> Result<String, ComputeError> {
    let input = TourSeriesDocument::from_json(&json)?.into_input(AnalysisConfig::default())?;
    let smoothed = SignalSmoother::smooth(&input.series, &input.config.smoothing);

    serde_json::to_string_pretty(&smoothed).map_err(ComputeError::JsonError)
}

/// JSON analyzer with a fixed report producer and fallback configuration.
///
/// Holds no per-tour state; one analyzer can serve any number of tours.
#[derive(Debug, Clone)]
pub struct TourAnalyzer {
    encoder: ReportEncoder,
    default_config: AnalysisConfig,
}

impl Default for TourAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TourAnalyzer {
    pub fn new() -> Self {
        Self {
            encoder: ReportEncoder::new(),
            default_config: AnalysisConfig::default(),
        }
    }

    /// Configuration for documents which carry none
    pub fn with_default_config(mut self, config: AnalysisConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Load the fallback configuration from JSON
    pub fn load_default_config(&mut self, json: &str) -> Result<(), ComputeError> {
        self.default_config = AnalysisConfig::from_json(json)?;
        Ok(())
    }

    pub fn default_config(&self) -> &AnalysisConfig {
        &self.default_config
    }

    pub fn analyze_document(
        &self,
        document: TourSeriesDocument,
    ) -> Result<TourAnalysis, ComputeError> {
        let input = document.into_input(self.default_config)?;
        analyze_tour(&input.series, &input.markers, &input.config)
    }

    pub fn analyze_json(&self, json: &str) -> Result<String, ComputeError> {
        let document = TourSeriesDocument::from_json(json)?;
        let input = document.into_input(self.default_config)?;
        let analysis = analyze_tour(&input.series, &input.markers, &input.config)?;

        self.encoder.encode_to_json(&analysis, input.source.as_ref())
    }
}
