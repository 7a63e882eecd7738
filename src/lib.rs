//! Tour Segmenter - compute engine for recorded tour time series
//!
//! The engine splits a tour into segments and derives per-segment statistics
//! through a deterministic pipeline: smoothing → segmentation → break
//! detection → segment statistics → report encoding.
//!
//! ## Modules
//!
//! - **Algorithms**: Douglas-Peucker simplification, Jamet and min-time-slice
//!   smoothing, break time detection, altitude up/down analysis
//! - **Segmenters**: altitude, pulse, distance, marker and break time strategies
//! - **Surfaces**: JSON documents, C bindings and the `tourseg` CLI

pub mod altitude;
pub mod breaks;
pub mod config;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod segmenter;
pub mod simplify;
pub mod smoothing;
pub mod statistics;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use breaks::BreakTimeDetector;
pub use config::{
    AnalysisConfig, BreakMethod, SegmenterConfig, SmoothingAlgorithm, SmoothingConfig,
};
pub use error::ComputeError;
pub use pipeline::{
    analyze_tour, analyze_tour_json, available_segmenters_json, TourAnalysis, TourAnalyzer,
};
pub use segmenter::{available_segmenters, Segmentation, Segmenter, SegmenterKind};
pub use simplify::{DouglasPeucker, DpPoint};
pub use smoothing::SignalSmoother;
pub use statistics::{SegmentStatisticsBuilder, SegmentTable};
pub use types::{
    BreakClassification, MarkerSet, SegmentBoundary, SmoothedSeries, TimeSeries, TourSegment,
};

// Schema exports
pub use schema::{TourSeriesDocument, SCHEMA_VERSION};

/// Engine version embedded in every report
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "tour-segmenter";
