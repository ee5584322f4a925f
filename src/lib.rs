//! # Track Analytics
//!
//! Derived metrics and features for recorded GPS tracks.
//!
//! This library provides:
//! - Per-point distance, segment grade, velocity and cumulative climb
//! - Prominence-based peak detection
//! - Climb detection with iterative merging of nearby climbs
//! - The single most difficult stretch of a given length
//! - Resampling that keeps detected peaks and climbs anchored
//!
//! Parsing input files and rendering output are left to the caller: a parser
//! pushes [`Point`]s into a [`Track`], a renderer reads the track back.
//!
//! ## Quick Start
//!
//! ```rust
//! use track_analytics::{ClimbConfig, Point, Track};
//!
//! // A steady 6% ramp sampled every ~111 m
//! let mut track: Track = (0..40)
//!     .map(|i| Point::new(45.0 + i as f64 * 0.001, 7.0).with_elevation(i as f64 * 6.67))
//!     .collect();
//!
//! track.calculate_length();
//! track.calculate_segment_grade(100.0).unwrap();
//! let total = track.calculate_climb(10.0);
//! track.calculate_climbs(&ClimbConfig::default());
//!
//! assert!(total > 200.0);
//! assert_eq!(track.climbs().len(), 1);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackError};

// Geographic utilities (distance, bounds)
pub mod geo_utils;

// Ordered point buffer with stable seq identity
pub mod track;
pub use track::Track;

// Distance, grade, velocity, climb, burr removal and summary metrics
pub mod metrics;

// Prominence-based peak detection
pub mod peaks;
pub use peaks::{Peak, PeakConfig};

// Extract / merge / prune climb detection
pub mod climbs;
pub use climbs::{Climb, ClimbConfig};

// Sliding-window hardest segment
pub mod difficulty;
pub use difficulty::DifficultSegment;

// Decimating and averaging resamplers
pub mod resample;

// Configurable end-to-end pipeline and serializable summary
pub mod analysis;
pub use analysis::{
    analyze, AnalysisConfig, ClimbSummary, DifficultSummary, MaskBounds, PeakSummary, TrackSummary,
};

// ============================================================================
// Core Types
// ============================================================================

/// Sentinel for an unset air temperature.
pub const INVALID_TEMP: f64 = -1000.0;

/// One recorded sample of a track.
///
/// Parsers fill in position, elevation, time and sensor values. The derived
/// fields (`length`, `grade`, `velocity`, `climb`) are annotated in place by
/// the [`metrics`] operations.
///
/// # Example
/// ```
/// use track_analytics::Point;
///
/// let p = Point::new(46.52, 6.63)
///     .with_elevation(372.0)
///     .with_timestamp(1_700_000_000)
///     .with_hr(132);
/// assert!(!p.valid_temp());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Elevation in meters
    pub elevation: f64,
    /// Distance from the first point of the track, in meters
    pub length: f64,
    /// Unix timestamp in seconds (0 when absent)
    pub timestamp: i64,
    /// Stable identity, assigned by the track when the point is appended
    pub seq: usize,
    /// Heart rate in beats/minute (0 when absent)
    pub hr: u16,
    /// Air temperature in °C, or [`INVALID_TEMP`]
    pub atemp: f64,
    /// Grade in percent
    pub grade: f64,
    /// Velocity in m/s
    pub velocity: f64,
    /// Accumulated climb up to and including this point, in meters
    pub climb: f64,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            elevation: 0.0,
            length: 0.0,
            timestamp: 0,
            seq: 0,
            hr: 0,
            atemp: INVALID_TEMP,
            grade: 0.0,
            velocity: 0.0,
            climb: 0.0,
        }
    }
}

impl Point {
    /// Create a point at the given position; everything else is unset.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Self::default()
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation;
        self
    }

    /// Pre-populate the cumulative distance (some formats record it).
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_hr(mut self, hr: u16) -> Self {
        self.hr = hr;
        self
    }

    pub fn with_atemp(mut self, atemp: f64) -> Self {
        self.atemp = atemp;
        self
    }

    /// Whether an air temperature was recorded.
    pub fn valid_temp(&self) -> bool {
        self.atemp != INVALID_TEMP
    }

    /// Great-circle distance to another point, in meters.
    pub fn distance(&self, other: &Point) -> f64 {
        geo_utils::haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

// ============================================================================
// Tests
// ============================================================================
