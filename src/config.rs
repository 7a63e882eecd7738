//! Analysis configuration
//!
//! Every tunable of the engine is an immutable value passed on each call.
//! Values loaded from JSON or received over FFI are brought into their
//! documented ranges with `clamped()` before they reach an algorithm; the
//! algorithms themselves do not re-validate.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ComputeError;

/// Smallest and largest time constant of the Jamet filter (seconds)
pub const TAU_RANGE: (f64, f64) = (0.1, 500.0);
/// Maximum number of additional smoothing passes
pub const MAX_REPEAT_COUNT: u32 = 10;
/// Time constant range of the additional smoothing passes (seconds)
pub const REPEAT_TAU_RANGE: (f64, f64) = (0.1, 1.0);
/// Minimum time slice range of the initial algorithm (seconds)
pub const MIN_TIME_SLICE_RANGE: (u32, u32) = (1, 3600);

/// Douglas-Peucker tolerance range (meters)
pub const TOLERANCE_RANGE: (f64, f64) = (0.0, 1000.0);
/// Highest position of the tolerance slider
pub const MAX_TOLERANCE_SLIDER: u32 = 100;
/// Segment length range of the distance segmenter (meters)
pub const SEGMENT_DISTANCE_RANGE: (f64, f64) = (1.0, 1_000_000.0);
/// Minimum altitude differences selectable for the up/down segmenter (meters)
pub const ALTITUDE_STEPS: [f64; 5] = [1.0, 3.0, 5.0, 10.0, 20.0];

/// Speed threshold range (km/h)
pub const SPEED_RANGE: (f64, f64) = (0.0, 500.0);
/// Shortest break range (seconds)
pub const SHORTEST_BREAK_RANGE: (u32, u32) = (1, 86_400);
/// Maximum break distance range (meters)
pub const BREAK_DISTANCE_RANGE: (f64, f64) = (0.0, 10_000.0);
/// Break merge gap range (minutes)
pub const SLICE_DIFF_RANGE: (u32, u32) = (0, 1440);
/// Minimum sustained break range of the combined speed method (seconds)
pub const MIN_SLICE_TIME_RANGE: (u32, u32) = (0, 3600);

const TOLERANCE_SLIDER_EXPONENT: f64 = 2.05;
const TOLERANCE_SLIDER_DIVISOR: f64 = 50.0;

/// Map a tolerance slider position (0..=100) to a DP tolerance in meters
pub fn tolerance_from_slider(slider: u32) -> f64 {
    let slider = slider.min(MAX_TOLERANCE_SLIDER) as f64;
    (slider.powf(TOLERANCE_SLIDER_EXPONENT) / TOLERANCE_SLIDER_DIVISOR).floor()
}

/// Slider position which maps back to `tolerance`.
///
/// Returns the smallest position `s` with `tolerance_from_slider(s) >= tolerance`,
/// so stored tolerances produced by the slider survive a round trip.
pub fn slider_from_tolerance(tolerance: f64) -> u32 {
    if tolerance.is_nan() || tolerance <= 0.0 {
        return 0;
    }

    let estimate = (tolerance * TOLERANCE_SLIDER_DIVISOR).powf(1.0 / TOLERANCE_SLIDER_EXPONENT);
    let mut slider = (estimate.ceil() as u32).min(MAX_TOLERANCE_SLIDER);

    // float error in powf can place the estimate one step off
    while slider < MAX_TOLERANCE_SLIDER && tolerance_from_slider(slider) < tolerance {
        slider += 1;
    }
    while slider > 0 && tolerance_from_slider(slider - 1) >= tolerance {
        slider -= 1;
    }

    slider
}

fn clamp_f64(name: &str, value: f64, (min, max): (f64, f64)) -> f64 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        warn!(parameter = name, value, clamped, "configuration value clamped");
    }
    clamped
}

fn clamp_u32(name: &str, value: u32, (min, max): (u32, u32)) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(parameter = name, value, clamped, "configuration value clamped");
    }
    clamped
}

/// Jamet smoothing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Time constant for distance and horizontal speed (seconds)
    pub speed_tau: f64,
    /// Time constant for altitude and vertical speed (seconds)
    pub gradient_tau: f64,
    /// Time constant for pulse (seconds)
    pub pulse_tau: f64,
    /// Editing one tau sets all three
    pub synchronize_taus: bool,
    /// Output the smoothed altitude instead of the raw altitude
    pub altitude_enabled: bool,
    /// Smooth the pulse channel
    pub pulse_enabled: bool,
    /// Additional passes over the filtered output
    pub repeat_count: u32,
    /// Time constant of the additional passes (seconds)
    pub repeat_tau: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            speed_tau: 10.0,
            gradient_tau: 10.0,
            pulse_tau: 10.0,
            synchronize_taus: true,
            altitude_enabled: false,
            pulse_enabled: false,
            repeat_count: 1,
            repeat_tau: 1.0,
        }
    }
}

impl SmoothingConfig {
    pub fn with_speed_tau(self, tau: f64) -> Self {
        if self.synchronize_taus {
            return self.with_all_taus(tau);
        }
        Self {
            speed_tau: tau,
            ..self
        }
    }

    pub fn with_gradient_tau(self, tau: f64) -> Self {
        if self.synchronize_taus {
            return self.with_all_taus(tau);
        }
        Self {
            gradient_tau: tau,
            ..self
        }
    }

    pub fn with_pulse_tau(self, tau: f64) -> Self {
        if self.synchronize_taus {
            return self.with_all_taus(tau);
        }
        Self {
            pulse_tau: tau,
            ..self
        }
    }

    fn with_all_taus(self, tau: f64) -> Self {
        Self {
            speed_tau: tau,
            gradient_tau: tau,
            pulse_tau: tau,
            ..self
        }
    }

    /// Enabling synchronization adopts the speed tau for all channels
    pub fn with_synchronized_taus(self, synchronize: bool) -> Self {
        let config = Self {
            synchronize_taus: synchronize,
            ..self
        };
        if synchronize {
            config.with_all_taus(self.speed_tau)
        } else {
            config
        }
    }

    pub fn with_altitude(self, enabled: bool) -> Self {
        Self {
            altitude_enabled: enabled,
            ..self
        }
    }

    pub fn with_pulse(self, enabled: bool) -> Self {
        Self {
            pulse_enabled: enabled,
            ..self
        }
    }

    pub fn with_repeated_smoothing(self, count: u32, tau: f64) -> Self {
        Self {
            repeat_count: count,
            repeat_tau: tau,
            ..self
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            speed_tau: clamp_f64("speed_tau", self.speed_tau, TAU_RANGE),
            gradient_tau: clamp_f64("gradient_tau", self.gradient_tau, TAU_RANGE),
            pulse_tau: clamp_f64("pulse_tau", self.pulse_tau, TAU_RANGE),
            repeat_count: clamp_u32("repeat_count", self.repeat_count, (0, MAX_REPEAT_COUNT)),
            repeat_tau: clamp_f64("repeat_tau", self.repeat_tau, REPEAT_TAU_RANGE),
            ..self
        }
    }
}

/// Smoothing algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum SmoothingAlgorithm {
    /// Speed over windows covering a minimum time slice, no filtering
    Initial {
        /// Seconds
        min_time_slice: u32,
    },
    /// Time-aware exponential filter
    Jamet(SmoothingConfig),
}

impl Default for SmoothingAlgorithm {
    fn default() -> Self {
        SmoothingAlgorithm::Jamet(SmoothingConfig::default())
    }
}

impl SmoothingAlgorithm {
    pub const DEFAULT_MIN_TIME_SLICE: u32 = 10;

    pub fn initial() -> Self {
        SmoothingAlgorithm::Initial {
            min_time_slice: Self::DEFAULT_MIN_TIME_SLICE,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            SmoothingAlgorithm::Initial { .. } => "initial",
            SmoothingAlgorithm::Jamet(_) => "jamet",
        }
    }

    pub fn clamped(self) -> Self {
        match self {
            SmoothingAlgorithm::Initial { min_time_slice } => SmoothingAlgorithm::Initial {
                min_time_slice: clamp_u32("min_time_slice", min_time_slice, MIN_TIME_SLICE_RANGE),
            },
            SmoothingAlgorithm::Jamet(config) => SmoothingAlgorithm::Jamet(config.clamped()),
        }
    }
}

/// Break time detection method and its thresholds.
///
/// Speeds are in km/h.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BreakMethod {
    /// Break when the position stays within a distance for a minimum time
    TimeAndDistance {
        shortest_break_seconds: u32,
        max_distance_meters: f64,
        slice_diff_minutes: u32,
    },
    /// Break when the speed between two samples is too low
    SliceSpeed { min_slice_speed: f64 },
    /// Break when the windowed average speed is too low
    AvgSpeed { min_avg_speed: f64 },
    /// Break when slice and average speed are too low for a minimum time
    AvgAndSliceSpeed {
        min_avg_speed: f64,
        min_slice_speed: f64,
        min_slice_time_seconds: u32,
    },
}

impl Default for BreakMethod {
    fn default() -> Self {
        BreakMethod::AvgAndSliceSpeed {
            min_avg_speed: 1.0,
            min_slice_speed: 1.0,
            min_slice_time_seconds: 2,
        }
    }
}

impl BreakMethod {
    pub fn time_and_distance() -> Self {
        BreakMethod::TimeAndDistance {
            shortest_break_seconds: 20,
            max_distance_meters: 20.0,
            slice_diff_minutes: 5,
        }
    }

    pub fn slice_speed() -> Self {
        BreakMethod::SliceSpeed {
            min_slice_speed: 1.0,
        }
    }

    pub fn avg_speed() -> Self {
        BreakMethod::AvgSpeed { min_avg_speed: 1.0 }
    }

    pub fn id(&self) -> &'static str {
        match self {
            BreakMethod::TimeAndDistance { .. } => "time_and_distance",
            BreakMethod::SliceSpeed { .. } => "slice_speed",
            BreakMethod::AvgSpeed { .. } => "avg_speed",
            BreakMethod::AvgAndSliceSpeed { .. } => "avg_and_slice_speed",
        }
    }

    pub fn clamped(self) -> Self {
        match self {
            BreakMethod::TimeAndDistance {
                shortest_break_seconds,
                max_distance_meters,
                slice_diff_minutes,
            } => BreakMethod::TimeAndDistance {
                shortest_break_seconds: clamp_u32(
                    "shortest_break_seconds",
                    shortest_break_seconds,
                    SHORTEST_BREAK_RANGE,
                ),
                max_distance_meters: clamp_f64(
                    "max_distance_meters",
                    max_distance_meters,
                    BREAK_DISTANCE_RANGE,
                ),
                slice_diff_minutes: clamp_u32(
                    "slice_diff_minutes",
                    slice_diff_minutes,
                    SLICE_DIFF_RANGE,
                ),
            },
            BreakMethod::SliceSpeed { min_slice_speed } => BreakMethod::SliceSpeed {
                min_slice_speed: clamp_f64("min_slice_speed", min_slice_speed, SPEED_RANGE),
            },
            BreakMethod::AvgSpeed { min_avg_speed } => BreakMethod::AvgSpeed {
                min_avg_speed: clamp_f64("min_avg_speed", min_avg_speed, SPEED_RANGE),
            },
            BreakMethod::AvgAndSliceSpeed {
                min_avg_speed,
                min_slice_speed,
                min_slice_time_seconds,
            } => BreakMethod::AvgAndSliceSpeed {
                min_avg_speed: clamp_f64("min_avg_speed", min_avg_speed, SPEED_RANGE),
                min_slice_speed: clamp_f64("min_slice_speed", min_slice_speed, SPEED_RANGE),
                min_slice_time_seconds: clamp_u32(
                    "min_slice_time_seconds",
                    min_slice_time_seconds,
                    MIN_SLICE_TIME_RANGE,
                ),
            },
        }
    }
}

/// Segmenter strategy and its parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "segmenter", rename_all = "snake_case")]
pub enum SegmenterConfig {
    /// Douglas-Peucker over (distance, altitude)
    ByAltitudeDp { tolerance: f64 },
    /// Douglas-Peucker over (distance, altitude), same-direction runs merged
    ByAltitudeDpMerged { tolerance: f64 },
    /// Marker boundaries, merged DP points for the altitude up/down sums
    ByAltitudeWithMarker { tolerance: f64 },
    /// Douglas-Peucker over (time, pulse)
    ByPulseDp { tolerance: f64 },
    /// Fixed distance segments (meters)
    ByDistance { segment_distance: f64 },
    /// Tour markers
    ByMarker,
    /// Altitude reversals exceeding `ALTITUDE_STEPS[altitude_step]`
    ByAltitudeUpDown { altitude_step: usize },
    /// Moving/break transitions
    ByBreakTime { method: BreakMethod },
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        SegmenterConfig::ByAltitudeDp {
            tolerance: Self::default_tolerance(),
        }
    }
}

impl SegmenterConfig {
    pub const DEFAULT_TOLERANCE_SLIDER: u32 = 50;
    pub const DEFAULT_SEGMENT_DISTANCE: f64 = 1000.0;
    pub const DEFAULT_ALTITUDE_STEP: usize = 2;

    pub fn default_tolerance() -> f64 {
        tolerance_from_slider(Self::DEFAULT_TOLERANCE_SLIDER)
    }

    pub fn clamped(self) -> Self {
        let tolerance = |t: f64| clamp_f64("tolerance", t, TOLERANCE_RANGE);

        match self {
            SegmenterConfig::ByAltitudeDp { tolerance: t } => SegmenterConfig::ByAltitudeDp {
                tolerance: tolerance(t),
            },
            SegmenterConfig::ByAltitudeDpMerged { tolerance: t } => {
                SegmenterConfig::ByAltitudeDpMerged {
                    tolerance: tolerance(t),
                }
            }
            SegmenterConfig::ByAltitudeWithMarker { tolerance: t } => {
                SegmenterConfig::ByAltitudeWithMarker {
                    tolerance: tolerance(t),
                }
            }
            SegmenterConfig::ByPulseDp { tolerance: t } => SegmenterConfig::ByPulseDp {
                tolerance: tolerance(t),
            },
            SegmenterConfig::ByDistance { segment_distance } => SegmenterConfig::ByDistance {
                segment_distance: clamp_f64(
                    "segment_distance",
                    segment_distance,
                    SEGMENT_DISTANCE_RANGE,
                ),
            },
            SegmenterConfig::ByMarker => SegmenterConfig::ByMarker,
            SegmenterConfig::ByAltitudeUpDown { altitude_step } => {
                let max_step = ALTITUDE_STEPS.len() - 1;
                if altitude_step > max_step {
                    warn!(
                        parameter = "altitude_step",
                        value = altitude_step,
                        clamped = max_step,
                        "configuration value clamped"
                    );
                }
                SegmenterConfig::ByAltitudeUpDown {
                    altitude_step: altitude_step.min(max_step),
                }
            }
            SegmenterConfig::ByBreakTime { method } => SegmenterConfig::ByBreakTime {
                method: method.clamped(),
            },
        }
    }
}

/// Everything one analysis request needs besides the tour data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub segmenter: SegmenterConfig,
    pub smoothing: SmoothingAlgorithm,
    /// Break method for the per-segment break time of segmenters which do
    /// not classify breaks themselves
    pub break_method: BreakMethod,
    /// Segment and compute altitude values from the smoothed altitude
    pub use_smoothed_altitude: bool,
    /// Attach the smoothed channels to the analysis result
    pub include_smoothed: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            smoothing: SmoothingAlgorithm::default(),
            break_method: BreakMethod::default(),
            use_smoothed_altitude: false,
            include_smoothed: false,
        }
    }
}

impl AnalysisConfig {
    pub fn with_segmenter(self, segmenter: SegmenterConfig) -> Self {
        Self { segmenter, ..self }
    }

    pub fn with_smoothing(self, smoothing: SmoothingAlgorithm) -> Self {
        Self { smoothing, ..self }
    }

    pub fn with_break_method(self, break_method: BreakMethod) -> Self {
        Self {
            break_method,
            ..self
        }
    }

    pub fn clamped(self) -> Self {
        Self {
            segmenter: self.segmenter.clamped(),
            smoothing: self.smoothing.clamped(),
            break_method: self.break_method.clamped(),
            ..self
        }
    }

    /// Load a configuration from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        Ok(config.clamped())
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tolerance_slider_mapping() {
        assert_eq!(tolerance_from_slider(0), 0.0);
        assert_eq!(tolerance_from_slider(10), 2.0);
        assert_eq!(tolerance_from_slider(100), 251.0);
        // positions above the slider range map like the top position
        assert_eq!(tolerance_from_slider(250), 251.0);
    }

    #[test]
    fn test_tolerance_slider_round_trip() {
        for slider in 0..=MAX_TOLERANCE_SLIDER {
            let tolerance = tolerance_from_slider(slider);
            let restored = slider_from_tolerance(tolerance);
            assert_eq!(
                tolerance_from_slider(restored),
                tolerance,
                "slider {slider} restored as {restored}"
            );
        }
    }

    #[test]
    fn test_synchronized_taus_follow_last_edit() {
        let config = SmoothingConfig::default()
            .with_synchronized_taus(true)
            .with_gradient_tau(42.0);

        assert_eq!(config.speed_tau, 42.0);
        assert_eq!(config.gradient_tau, 42.0);
        assert_eq!(config.pulse_tau, 42.0);

        let config = config.with_synchronized_taus(false).with_pulse_tau(5.0);
        assert_eq!(config.speed_tau, 42.0);
        assert_eq!(config.pulse_tau, 5.0);
    }

    #[test]
    fn test_smoothing_config_clamped() {
        let config = SmoothingConfig::default()
            .with_synchronized_taus(false)
            .with_speed_tau(0.0)
            .with_pulse_tau(9000.0)
            .with_repeated_smoothing(25, 3.0)
            .clamped();

        assert_eq!(config.speed_tau, 0.1);
        assert_eq!(config.pulse_tau, 500.0);
        assert_eq!(config.repeat_count, 10);
        assert_eq!(config.repeat_tau, 1.0);
    }

    #[test]
    fn test_segmenter_config_clamped() {
        let config = SegmenterConfig::ByAltitudeUpDown { altitude_step: 9 }.clamped();
        assert_eq!(config, SegmenterConfig::ByAltitudeUpDown { altitude_step: 4 });

        let config = SegmenterConfig::ByDistance {
            segment_distance: -5.0,
        }
        .clamped();
        assert_eq!(
            config,
            SegmenterConfig::ByDistance {
                segment_distance: 1.0
            }
        );

        let config = SegmenterConfig::ByBreakTime {
            method: BreakMethod::SliceSpeed {
                min_slice_speed: f64::NAN,
            },
        }
        .clamped();
        assert_eq!(
            config,
            SegmenterConfig::ByBreakTime {
                method: BreakMethod::SliceSpeed {
                    min_slice_speed: 0.0
                }
            }
        );
    }

    #[test]
    fn test_analysis_config_json() {
        let json = r#"{
            "segmenter": { "segmenter": "by_distance", "segment_distance": 500.0 },
            "smoothing": { "algorithm": "initial", "min_time_slice": 5 },
            "break_method": { "method": "slice_speed", "min_slice_speed": 2.5 }
        }"#;

        let config = AnalysisConfig::from_json(json).unwrap();
        assert_eq!(
            config.segmenter,
            SegmenterConfig::ByDistance {
                segment_distance: 500.0
            }
        );
        assert_eq!(
            config.smoothing,
            SmoothingAlgorithm::Initial { min_time_slice: 5 }
        );
        assert_eq!(
            config.break_method,
            BreakMethod::SliceSpeed {
                min_slice_speed: 2.5
            }
        );
        assert!(!config.use_smoothed_altitude);

        let restored = AnalysisConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_jamet_config_json_defaults() {
        let json = r#"{ "smoothing": { "algorithm": "jamet", "speed_tau": 20.0 } }"#;
        let config = AnalysisConfig::from_json(json).unwrap();

        match config.smoothing {
            SmoothingAlgorithm::Jamet(smoothing) => {
                assert_eq!(smoothing.speed_tau, 20.0);
                assert_eq!(smoothing.gradient_tau, 10.0);
                assert_eq!(smoothing.repeat_count, 1);
            }
            other => panic!("unexpected algorithm {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_json() {
        assert!(AnalysisConfig::from_json("{ not json").is_err());
    }
}
