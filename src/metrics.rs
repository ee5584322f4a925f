//! Per-point metrics and whole-track summaries.
//!
//! The annotating operations (`calculate_length`, `decay_elevation`,
//! `calculate_segment_grade`, `calculate_velocity`, `calculate_climb`) write
//! into the existing points and never change the point count. Everything
//! downstream (peaks, climbs, difficulty) reads these fields, so run them
//! first.
//!
//! ## Example
//! ```rust
//! use track_analytics::{Point, Track};
//!
//! let mut track: Track = [100.0, 105.0, 95.0, 120.0]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &ele)| Point::new(45.0 + i as f64 * 0.001, 7.0).with_elevation(ele))
//!     .collect();
//!
//! track.calculate_length();
//! assert_eq!(track.calculate_climb(10.0), 25.0);
//! ```

use chrono::{DateTime, Utc};
use log::debug;

use crate::error::{Result, TrackError};
use crate::Track;

/// Velocity below which a point counts as stopped (about 2 km/h), in m/s.
pub const DEFAULT_MOVING_VELOCITY: f64 = 0.55556;

/// Segment window bounds as fractions of the target segment length.
const SEGMENT_WINDOW_START: f64 = 0.9;
const SEGMENT_WINDOW_END: f64 = 1.1;

/// Exponential smoothing step: `(sample + previous × (samples − 1)) / samples`.
#[inline]
pub(crate) fn decay(previous: f64, sample: f64, samples: f64) -> f64 {
    (sample + previous * (samples - 1.0)) / samples
}

fn check_samples(samples: u32) -> Result<f64> {
    if samples == 0 {
        return Err(TrackError::invalid("samples", "must be at least 1"));
    }
    Ok(samples as f64)
}

impl Track {
    /// Set every point's `length` to the running great-circle distance from
    /// the first point. Overwrites lengths supplied by the parser.
    pub fn calculate_length(&mut self) {
        let points = self.points_mut();
        let mut running = 0.0;

        for i in 0..points.len() {
            if i > 0 {
                running += points[i].distance(&points[i - 1]);
            }
            points[i].length = running;
        }
    }

    /// Smooth elevation with a decaying average over `samples` points.
    ///
    /// GPS elevation is noisy; barometric elevation rarely needs this.
    pub fn decay_elevation(&mut self, samples: u32) -> Result<()> {
        let n = check_samples(samples)?;
        let points = self.points_mut();
        let Some(first) = points.first() else {
            return Ok(());
        };

        let mut running = first.elevation;
        for p in points.iter_mut().skip(1) {
            running = decay(running, p.elevation, n);
            p.elevation = running;
        }
        Ok(())
    }

    /// Assign each point the average grade of the segment it falls in.
    ///
    /// Segments target `segment_length` meters. A segment closes at the first
    /// point at least 110% of the target away, or earlier, once past 90%, at a
    /// point that finishes three strictly rising or falling elevations. This
    /// keeps a segment from straddling the start or end of a climb.
    pub fn calculate_segment_grade(&mut self, segment_length: f64) -> Result<()> {
        if !(segment_length > 0.0) {
            return Err(TrackError::invalid(
                "segment_length",
                format!("must be positive, got {}", segment_length),
            ));
        }

        let window_start = segment_length * SEGMENT_WINDOW_START;
        let window_end = segment_length * SEGMENT_WINDOW_END;

        let points = self.points_mut();
        if points.is_empty() {
            return Ok(());
        }

        let mut segment_start = 0;
        let mut start_elevation = points[0].elevation;
        let mut start_length = points[0].length;
        let mut segments = 0;

        for i in 1..points.len() {
            let delta_d = points[i].length - start_length;
            if delta_d >= window_end || (delta_d >= window_start && is_monotonic_run(points, i)) {
                let grade = (points[i].elevation - start_elevation) / delta_d * 100.0;
                for p in &mut points[segment_start..i] {
                    p.grade = grade;
                }

                segment_start = i;
                start_elevation = points[i].elevation;
                start_length = points[i].length;
                segments += 1;
            }
        }

        // Close out the partial segment with the last point
        let last = points[points.len() - 1];
        let delta_d = last.length - start_length;
        let grade = if delta_d == 0.0 {
            0.0
        } else {
            (last.elevation - start_elevation) / delta_d * 100.0
        };
        for p in &mut points[segment_start..] {
            p.grade = grade;
        }

        debug!(
            "[Metrics] Segment grade over {}m: {} segments",
            segment_length,
            segments + 1
        );
        Ok(())
    }

    /// Set each point's velocity from a decaying average of point-to-point
    /// speed over `samples` points.
    ///
    /// Steps with a non-positive time delta (missing or repeated timestamps)
    /// carry the previous velocity forward.
    pub fn calculate_velocity(&mut self, samples: u32) -> Result<()> {
        let n = check_samples(samples)?;
        let points = self.points_mut();
        if points.is_empty() {
            return Ok(());
        }

        points[0].velocity = 0.0;
        let mut running = 0.0;

        for i in 1..points.len() {
            let distance = points[i].length - points[i - 1].length;
            let dt = points[i].timestamp - points[i - 1].timestamp;

            if dt > 0 {
                running = decay(running, distance / dt as f64, n);
            }
            points[i].velocity = running;
        }
        Ok(())
    }

    /// Accumulate climb, ignoring rises of `threshold` meters or less.
    ///
    /// A base elevation follows the terrain down; a rise is only counted once
    /// it clears the base by more than the threshold, and then in full. Every
    /// point is annotated with the climb so far. Returns the total.
    pub fn calculate_climb(&mut self, threshold: f64) -> f64 {
        let points = self.points_mut();
        let Some(first) = points.first_mut() else {
            return 0.0;
        };
        first.climb = 0.0;
        let mut base = first.elevation;
        let mut climb = 0.0;

        for p in points.iter_mut().skip(1) {
            let elevation = p.elevation;
            if elevation > base + threshold {
                climb += elevation - base;
                base = elevation;
            }
            if elevation < base {
                base = elevation;
            }
            p.climb = climb;
        }

        climb
    }

    /// An arbitrary effort number: positive grade squared times distance,
    /// summed over the track.
    pub fn calculate_difficulty(&self) -> f64 {
        self.points()
            .windows(2)
            .filter(|w| w[1].grade >= 0.0)
            .map(|w| w[1].grade * w[1].grade * (w[1].length - w[0].length))
            .sum()
    }

    /// Seconds spent moving faster than `min_velocity` m/s.
    pub fn calculate_moving_time(&self, min_velocity: f64) -> f64 {
        self.points()
            .windows(2)
            .filter_map(|w| {
                let dt = w[1].timestamp - w[0].timestamp;
                if dt <= 0 {
                    return None;
                }
                let velocity = (w[1].length - w[0].length) / dt as f64;
                (velocity > min_velocity).then_some(dt as f64)
            })
            .sum()
    }

    /// Elapsed seconds between the first and last point (0 when empty).
    pub fn calculate_total_time(&self) -> f64 {
        match (self.points().first(), self.points().last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp) as f64,
            _ => 0.0,
        }
    }

    /// Total distance over elapsed time in m/s (0 without elapsed time).
    pub fn calculate_average_speed(&self) -> f64 {
        speed(self.total_distance(), self.calculate_total_time())
    }

    /// Total distance over moving time in m/s (0 without moving time).
    pub fn calculate_moving_speed(&self) -> f64 {
        speed(
            self.total_distance(),
            self.calculate_moving_time(DEFAULT_MOVING_VELOCITY),
        )
    }

    /// Cumulative length of the last point, in meters (0 when empty).
    pub fn total_distance(&self) -> f64 {
        self.points().last().map(|p| p.length).unwrap_or(0.0)
    }

    /// Wall-clock time of the first point, if it has one.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.points().first().and_then(|p| to_datetime(p.timestamp))
    }

    /// Wall-clock time of the last point, if it has one.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.points().last().and_then(|p| to_datetime(p.timestamp))
    }

    /// Highest elevation on the track.
    pub fn maximum_elevation(&self) -> Result<f64> {
        let first = self.first()?;
        Ok(self
            .points()
            .iter()
            .fold(first.elevation, |max, p| max.max(p.elevation)))
    }

    /// Lowest elevation on the track.
    pub fn minimum_elevation(&self) -> Result<f64> {
        let first = self.first()?;
        Ok(self
            .points()
            .iter()
            .fold(first.elevation, |min, p| min.min(p.elevation)))
    }
}

/// Three strictly rising or strictly falling elevations ending at `pos`.
fn is_monotonic_run(points: &[crate::Point], pos: usize) -> bool {
    if pos < 2 {
        return false;
    }
    let (a, b, c) = (
        points[pos - 2].elevation,
        points[pos - 1].elevation,
        points[pos].elevation,
    );
    (a < b && b < c) || (a > b && b > c)
}

/// Distance over time, 0 when no time has passed.
pub(crate) fn speed(distance: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        distance / seconds
    } else {
        0.0
    }
}

fn to_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp == 0 {
        None
    } else {
        DateTime::from_timestamp(timestamp, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn profile(lengths: &[f64], elevations: &[f64]) -> Track {
        lengths
            .iter()
            .zip(elevations)
            .map(|(&len, &ele)| Point::new(0.0, 0.0).with_length(len).with_elevation(ele))
            .collect()
    }

    fn grades(track: &Track) -> Vec<f64> {
        track.iter().map(|p| p.grade).collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_calculate_length() {
        let mut track: Track = (0..5)
            .map(|i| Point::new(51.5 + i as f64 * 0.001, -0.12))
            .collect();
        track.calculate_length();

        assert_eq!(track[0].length, 0.0);
        for w in track.points().windows(2) {
            assert!(w[1].length >= w[0].length);
            assert!((w[1].length - w[0].length - 111.19).abs() < 0.1);
        }
    }

    #[test]
    fn test_calculate_length_is_idempotent() {
        let mut track: Track = (0..4)
            .map(|i| Point::new(46.0, 7.0 + i as f64 * 0.002).with_length(999.0))
            .collect();
        track.calculate_length();
        let once: Vec<f64> = track.iter().map(|p| p.length).collect();
        track.calculate_length();
        let twice: Vec<f64> = track.iter().map(|p| p.length).collect();
        assert_eq!(once, twice);
        assert_eq!(once[0], 0.0);
    }

    #[test]
    fn test_decay_elevation() {
        let mut track = profile(&[0.0, 1.0, 2.0], &[100.0, 110.0, 110.0]);
        track.decay_elevation(2).unwrap();

        assert_close(
            &track.iter().map(|p| p.elevation).collect::<Vec<_>>(),
            &[100.0, 105.0, 107.5],
        );
    }

    #[test]
    fn test_decay_elevation_rejects_zero_samples() {
        let mut track = profile(&[0.0], &[1.0]);
        assert!(matches!(
            track.decay_elevation(0),
            Err(TrackError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_segment_grade_window() {
        let mut track = profile(
            &[0.0, 100.0, 250.0, 400.0, 600.0],
            &[0.0, 5.0, 20.0, 45.0, 40.0],
        );
        track.calculate_segment_grade(100.0).unwrap();

        // 0..250 closes at 250 (past 110), then every step is past 110
        assert_close(
            &grades(&track),
            &[8.0, 8.0, 25.0 / 150.0 * 100.0, -2.5, 0.0],
        );
    }

    #[test]
    fn test_segment_grade_closes_early_on_monotonic_run() {
        let mut track = profile(
            &[0.0, 50.0, 95.0, 150.0, 200.0],
            &[0.0, 2.0, 4.0, 4.0, 4.0],
        );
        track.calculate_segment_grade(100.0).unwrap();

        // 95 is inside [90, 110] and 0 < 2 < 4, so the first segment ends there
        let g = grades(&track);
        assert!((g[0] - 4.0 / 95.0 * 100.0).abs() < 1e-9);
        assert_eq!(g[0], g[1]);
        assert_close(&g[2..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_segment_grade_single_point() {
        let mut track = profile(&[0.0], &[50.0]);
        track.calculate_segment_grade(100.0).unwrap();
        assert_eq!(track[0].grade, 0.0);

        let mut empty = Track::new();
        assert!(empty.calculate_segment_grade(100.0).is_ok());
        assert!(empty.calculate_segment_grade(0.0).is_err());
    }

    #[test]
    fn test_velocity_skips_clock_glitches() {
        let mut track: Track = [(0.0, 0), (10.0, 10), (20.0, 10), (30.0, 20)]
            .iter()
            .map(|&(len, t)| Point::new(0.0, 0.0).with_length(len).with_timestamp(t))
            .collect();
        track.calculate_velocity(1).unwrap();

        let v: Vec<f64> = track.iter().map(|p| p.velocity).collect();
        assert_close(&v, &[0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_velocity_decays() {
        let mut track: Track = [(0.0, 0), (20.0, 10), (40.0, 20)]
            .iter()
            .map(|&(len, t)| Point::new(0.0, 0.0).with_length(len).with_timestamp(t))
            .collect();
        track.calculate_velocity(2).unwrap();

        let v: Vec<f64> = track.iter().map(|p| p.velocity).collect();
        assert_close(&v, &[0.0, 1.0, 1.5]);
    }

    #[test]
    fn test_calculate_climb_threshold() {
        let mut track = profile(&[0.0, 1.0, 2.0, 3.0], &[100.0, 105.0, 95.0, 120.0]);
        let total = track.calculate_climb(10.0);

        // The dip to 95 lowers the base, so the final rise counts from there
        assert_eq!(total, 25.0);
        let climbs: Vec<f64> = track.iter().map(|p| p.climb).collect();
        assert_eq!(climbs, vec![0.0, 0.0, 0.0, 25.0]);
    }

    #[test]
    fn test_calculate_climb_ignores_noise() {
        let mut track = profile(
            &[0.0, 1.0, 2.0, 3.0, 4.0],
            &[100.0, 104.0, 99.0, 103.0, 100.0],
        );
        assert_eq!(track.calculate_climb(5.0), 0.0);
        assert_eq!(Track::new().calculate_climb(5.0), 0.0);
    }

    #[test]
    fn test_summary_metrics() {
        let mut track: Track = [(0.0, 1_000), (100.0, 1_010), (100.0, 1_110), (300.0, 1_130)]
            .iter()
            .map(|&(len, t)| Point::new(0.0, 0.0).with_length(len).with_timestamp(t))
            .collect();
        track.calculate_segment_grade(100.0).unwrap();

        assert_eq!(track.total_distance(), 300.0);
        assert_eq!(track.calculate_total_time(), 130.0);
        // The 100 s standstill is not moving time
        assert_eq!(track.calculate_moving_time(DEFAULT_MOVING_VELOCITY), 30.0);
        assert!((track.calculate_average_speed() - 300.0 / 130.0).abs() < 1e-9);
        assert!((track.calculate_moving_speed() - 10.0).abs() < 1e-9);
        assert_eq!(track.start_time().unwrap().timestamp(), 1_000);
        assert_eq!(track.end_time().unwrap().timestamp(), 1_130);
    }

    #[test]
    fn test_speeds_without_time() {
        let track = profile(&[0.0, 100.0], &[0.0, 0.0]);
        assert_eq!(track.calculate_average_speed(), 0.0);
        assert_eq!(track.calculate_moving_speed(), 0.0);
        assert!(track.start_time().is_none());
    }

    #[test]
    fn test_difficulty_counts_only_climbing() {
        let mut track = profile(&[0.0, 100.0, 200.0], &[0.0, 0.0, 0.0]);
        track.points_mut()[1].grade = 5.0;
        track.points_mut()[2].grade = -5.0;
        assert_eq!(track.calculate_difficulty(), 2500.0);
    }

    #[test]
    fn test_elevation_extrema() {
        let track = profile(&[0.0, 1.0, 2.0], &[10.0, -3.0, 42.0]);
        assert_eq!(track.maximum_elevation().unwrap(), 42.0);
        assert_eq!(track.minimum_elevation().unwrap(), -3.0);
        assert!(Track::new().maximum_elevation().is_err());
        assert!(Track::new().minimum_elevation().is_err());
    }
}
