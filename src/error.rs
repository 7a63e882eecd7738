//! Error types for the tour segmenter

use thiserror::Error;

use crate::types::Channel;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid time series: {0}")]
    InvalidSeries(String),

    #[error("Channel {channel} has {actual} samples, expected {expected}")]
    ChannelLengthMismatch {
        channel: Channel,
        expected: usize,
        actual: usize,
    },

    #[error("Missing required channel: {0}")]
    MissingChannel(Channel),

    #[error("Segmenter {segmenter} is unavailable, missing: {missing}")]
    SegmenterUnavailable { segmenter: String, missing: String },

    #[error("Invalid segment boundary: {0}")]
    InvalidBoundary(String),

    #[error("Marker index {index} is outside of a series with {len} samples")]
    InvalidMarker { index: usize, len: usize },

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
