//! Unified tour.series.v1 schema
//!
//! This module defines the JSON input document for one recorded tour.

mod tour_series;

pub use tour_series::*;
