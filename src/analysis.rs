//! End-to-end track analysis.
//!
//! [`analyze`] runs every stage in a fixed order, each one optional or
//! parameterized through [`AnalysisConfig`]:
//!
//! 1. burr removal
//! 2. length (when requested or missing)
//! 3. elevation smoothing, point averaging
//! 4. segment grade, cumulative climb, velocity
//! 5. summary metrics
//! 6. privacy mask
//! 7. peaks, climbs, most difficult stretch
//! 8. decimation
//!
//! Metrics are summarized before masking so that totals describe the whole
//! ride. Features are summarized after decimation, as the caller will see
//! the track.

use chrono::{DateTime, Utc};
use geo::{coord, Rect};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::metrics::{speed, DEFAULT_MOVING_VELOCITY};
use crate::{ClimbConfig, PeakConfig, Track};

// ============================================================================
// Configuration
// ============================================================================

/// A lon/lat rectangle whose interior is removed from the track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl MaskBounds {
    /// Check the corners are on the globe and in order.
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64, limit: f64| v.is_finite() && (-limit..=limit).contains(&v);
        if !in_range(self.min_lon, 180.0) || !in_range(self.max_lon, 180.0) {
            return Err(config_error("mask longitude must be within -180..180"));
        }
        if !in_range(self.min_lat, 90.0) || !in_range(self.max_lat, 90.0) {
            return Err(config_error("mask latitude must be within -90..90"));
        }
        if self.max_lon < self.min_lon {
            return Err(config_error("mask max_lon is less than min_lon"));
        }
        if self.max_lat < self.min_lat {
            return Err(config_error("mask max_lat is less than min_lat"));
        }
        Ok(())
    }

    /// As a `geo` rectangle (x = longitude, y = latitude).
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_lon, y: self.min_lat },
            coord! { x: self.max_lon, y: self.max_lat },
        )
    }
}

/// Configuration for [`analyze`].
///
/// `None` on an optional stage skips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Truncate the track at long recording gaps.
    /// Default: true
    pub remove_burrs: bool,

    /// Recompute cumulative length even if the points carry one.
    /// Length is always computed when the track has none.
    /// Default: false
    pub recalculate_length: bool,

    /// Smooth elevation over this many samples.
    /// Default: None
    pub decay_samples: Option<u32>,

    /// Average the track down to this many points before any metrics.
    /// Drops any feature data carried in.
    /// Default: None
    pub average_points: Option<usize>,

    /// Target segment length for grade.
    /// Default: 100.0 meters
    pub segment_length: f64,

    /// Rises of this size or less are not counted as climb.
    /// Default: 10.0 meters
    pub climb_threshold: f64,

    /// Samples in the velocity average.
    /// Default: 10
    pub velocity_samples: u32,

    /// Speed below which the rider counts as stopped.
    /// Default: 0.55556 m/s (about 2 km/h)
    pub min_moving_velocity: f64,

    /// Remove points inside this rectangle after the metrics.
    /// Default: None
    pub mask: Option<MaskBounds>,

    /// Peak detection.
    /// Default: None (peaks are not detected)
    pub peaks: Option<PeakConfig>,

    /// Climb detection.
    /// Default: Some(ClimbConfig::default())
    pub climbs: Option<ClimbConfig>,

    /// Window for the most difficult stretch.
    /// Default: Some(1000.0) meters
    pub difficult_window: Option<f64>,

    /// Decimate the finished track to about this many points.
    /// Default: None
    pub sample_points: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            remove_burrs: true,
            recalculate_length: false,
            decay_samples: None,
            average_points: None,
            segment_length: 100.0,
            climb_threshold: 10.0,
            velocity_samples: 10,
            min_moving_velocity: DEFAULT_MOVING_VELOCITY,
            mask: None,
            peaks: None,
            climbs: Some(ClimbConfig::default()),
            difficult_window: Some(1000.0),
            sample_points: None,
        }
    }
}

fn config_error(message: impl Into<String>) -> TrackError {
    TrackError::Config {
        message: message.into(),
    }
}

impl AnalysisConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    /// The result is validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can run with.
    pub fn validate(&self) -> Result<()> {
        if self.decay_samples == Some(0) {
            return Err(config_error("decay_samples must be at least 1"));
        }
        if self.average_points == Some(0) {
            return Err(config_error("average_points must be at least 1"));
        }
        if !(self.segment_length > 0.0) {
            return Err(config_error("segment_length must be positive"));
        }
        if !self.climb_threshold.is_finite() {
            return Err(config_error("climb_threshold must be finite"));
        }
        if self.velocity_samples == 0 {
            return Err(config_error("velocity_samples must be at least 1"));
        }
        if !(self.min_moving_velocity >= 0.0) {
            return Err(config_error("min_moving_velocity must not be negative"));
        }
        if let Some(mask) = &self.mask {
            mask.validate()?;
        }
        if let Some(peaks) = &self.peaks {
            if !(peaks.min_range >= 0.0 && peaks.min_prominence >= 0.0) {
                return Err(config_error("peak thresholds must not be negative"));
            }
        }
        if let Some(climbs) = &self.climbs {
            if !(climbs.twixt_ratio >= 0.0 && climbs.grade_ratio >= 0.0) {
                return Err(config_error("climb merge ratios must not be negative"));
            }
        }
        if let Some(window) = self.difficult_window {
            if !(window > 0.0) {
                return Err(config_error("difficult_window must be positive"));
            }
        }
        if self.sample_points == Some(0) {
            return Err(config_error("sample_points must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Summary
// ============================================================================

/// A detected peak, resolved against the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakSummary {
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
    /// Distance from the start, in meters
    pub distance: f64,
    pub prominence: f64,
    pub range: f64,
}

/// A detected climb, resolved against the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimbSummary {
    pub start_index: usize,
    pub end_index: usize,
    /// Distance from the start to the foot of the climb, in meters
    pub start_distance: f64,
    pub length: f64,
    pub climb: f64,
    pub grade: f64,
    pub difficulty: f64,
}

/// The most difficult stretch, by distance rather than index so it stays
/// meaningful after decimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultSummary {
    pub start_distance: f64,
    pub end_distance: f64,
    pub elevation_gain: f64,
    pub grade: f64,
    pub score: f64,
}

/// Everything a renderer needs to report on an analyzed track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub name: String,
    /// Points left after all removals
    pub point_count: usize,
    /// Meters
    pub distance: f64,
    /// Meters climbed, above the configured threshold
    pub total_climb: f64,
    pub difficulty: f64,
    pub maximum_elevation: f64,
    pub minimum_elevation: f64,
    /// Seconds
    pub total_time: f64,
    /// Seconds
    pub moving_time: f64,
    /// m/s
    pub average_speed: f64,
    /// m/s
    pub moving_speed: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub peaks: Vec<PeakSummary>,
    pub climbs: Vec<ClimbSummary>,
    pub most_difficult: Option<DifficultSummary>,
}

impl TrackSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn describe_features(&mut self, track: &Track) {
        self.point_count = track.len();
        self.peaks = track
            .peaks()
            .iter()
            .map(|peak| {
                let p = &track[peak.index];
                PeakSummary {
                    index: peak.index,
                    lat: p.lat,
                    lon: p.lon,
                    elevation: p.elevation,
                    distance: p.length,
                    prominence: peak.prominence,
                    range: peak.range,
                }
            })
            .collect();
        self.climbs = track
            .climbs()
            .iter()
            .map(|c| ClimbSummary {
                start_index: c.start_index,
                end_index: c.end_index,
                start_distance: c.start(track).length,
                length: c.length(track),
                climb: c.climb(track),
                grade: c.grade(track),
                difficulty: c.difficulty(track),
            })
            .collect();
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run the configured analysis over `track`, modifying it in place.
///
/// Fails on an empty track or an invalid configuration. After return the
/// track holds the annotated, possibly masked and decimated points, and its
/// `peaks()`/`climbs()` match the summary.
pub fn analyze(track: &mut Track, config: &AnalysisConfig) -> Result<TrackSummary> {
    config.validate()?;
    track.first()?;

    let loaded = track.len();
    info!("[Analysis] '{}': analyzing {} points", track.name(), loaded);

    if config.remove_burrs {
        track.remove_burrs();
    }

    if config.recalculate_length || !has_length(track) {
        track.calculate_length();
    }

    if let Some(samples) = config.decay_samples {
        track.decay_elevation(samples)?;
    }
    if let Some(points) = config.average_points {
        track.shrink_by_average(points)?;
    }

    track.calculate_segment_grade(config.segment_length)?;
    let total_climb = track.calculate_climb(config.climb_threshold);
    track.calculate_velocity(config.velocity_samples)?;

    let mut summary = summarize(track, total_climb, config.min_moving_velocity)?;

    if let Some(mask) = &config.mask {
        track.mask(&mask.to_rect());
        if track.is_empty() {
            info!("[Analysis] '{}': mask removed every point", track.name());
        }
    }

    if let Some(peaks) = &config.peaks {
        track.calculate_peaks(peaks);
    }
    if let Some(climbs) = &config.climbs {
        track.calculate_climbs(climbs);
    }
    if let Some(window) = config.difficult_window {
        summary.most_difficult = track.most_difficult(window)?.map(|segment| DifficultSummary {
            start_distance: track[segment.start].length,
            end_distance: track[segment.end].length,
            elevation_gain: segment.elevation_gain(track),
            grade: segment.grade(track),
            score: segment.score,
        });
    }

    if let Some(points) = config.sample_points {
        track.shrink_by_sample(points)?;
    }

    summary.describe_features(track);
    info!(
        "[Analysis] '{}': {} -> {} points, {:.0}m, {:.0}m climbed, {} climbs, {} peaks",
        summary.name,
        loaded,
        summary.point_count,
        summary.distance,
        summary.total_climb,
        summary.climbs.len(),
        summary.peaks.len()
    );
    Ok(summary)
}

/// True when any point past the first carries a cumulative length.
fn has_length(track: &Track) -> bool {
    track.iter().skip(1).any(|p| p.length > 0.0)
}

fn summarize(track: &Track, total_climb: f64, min_moving_velocity: f64) -> Result<TrackSummary> {
    let moving_time = track.calculate_moving_time(min_moving_velocity);
    let distance = track.total_distance();
    let moving_speed = speed(distance, moving_time);
    debug!(
        "[Analysis] '{}': moving {:.0}s of {:.0}s",
        track.name(),
        moving_time,
        track.calculate_total_time()
    );

    Ok(TrackSummary {
        name: track.name().to_string(),
        point_count: track.len(),
        distance,
        total_climb,
        difficulty: track.calculate_difficulty(),
        maximum_elevation: track.maximum_elevation()?,
        minimum_elevation: track.minimum_elevation()?,
        total_time: track.calculate_total_time(),
        moving_time,
        average_speed: track.calculate_average_speed(),
        moving_speed,
        start_time: track.start_time(),
        end_time: track.end_time(),
        peaks: Vec::new(),
        climbs: Vec::new(),
        most_difficult: None,
    })
}
