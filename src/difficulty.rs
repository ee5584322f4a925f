//! Most difficult stretch of a track.
//!
//! Each point gets a "pain" value, grade squared times the distance from the
//! previous point, and a sliding window of fixed length finds the stretch
//! with the highest total pain.
//!
//! Squaring the grade matches how a climb feels but also exaggerates sensor
//! errors, so the grade used here is a long decaying average of the raw
//! point-to-point grade rather than the stored segment grade.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::metrics::decay;
use crate::Track;

/// Samples in the decaying average of instantaneous grade.
const PAIN_GRADE_SAMPLES: f64 = 10.0;

/// Steps shorter than this (meters) reuse the running grade.
const MIN_STEP_LENGTH: f64 = 1.0;

/// The hardest stretch found by [`Track::most_difficult`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultSegment {
    /// Position of the first point of the stretch (always > 0)
    pub start: usize,
    /// Position of the last point of the stretch
    pub end: usize,
    /// Total pain over the stretch
    pub score: f64,
}

impl DifficultSegment {
    /// Distance covered, in meters.
    pub fn length(&self, track: &Track) -> f64 {
        track[self.end].length - track[self.start].length
    }

    /// Net elevation change, in meters.
    pub fn elevation_gain(&self, track: &Track) -> f64 {
        track[self.end].elevation - track[self.start].elevation
    }

    /// Average grade over the stretch, in percent.
    pub fn grade(&self, track: &Track) -> f64 {
        let length = self.length(track);
        if length > 0.0 {
            self.elevation_gain(track) / length * 100.0
        } else {
            0.0
        }
    }
}

impl Track {
    /// Per-point pain: smoothed positive grade squared times step length.
    fn pain(&self) -> Vec<f64> {
        let points = self.points();
        let mut pain = vec![0.0; points.len()];
        let mut running_grade = 0.0;

        for i in 1..points.len() {
            let rise = points[i].elevation - points[i - 1].elevation;
            let step = points[i].length - points[i - 1].length;
            let grade = if step <= MIN_STEP_LENGTH {
                running_grade
            } else {
                rise / step * 100.0
            };

            running_grade = decay(running_grade, grade, PAIN_GRADE_SAMPLES);
            if running_grade > 0.0 {
                pain[i] = running_grade * running_grade * step;
            }
        }

        pain
    }

    /// Find the most difficult stretch of about `meters` length.
    ///
    /// Returns `None` when nothing on the track climbs (an easy ride) or the
    /// track is too short to fill a window. The stretch never starts at the
    /// first point: a window only counts once its left edge has moved.
    pub fn most_difficult(&self, meters: f64) -> Result<Option<DifficultSegment>> {
        if !(meters > 0.0) {
            return Err(TrackError::invalid(
                "meters",
                format!("window must be positive, got {}", meters),
            ));
        }

        let points = self.points();
        let pain = self.pain();

        let mut best: Option<DifficultSegment> = None;
        let mut start = 0;
        let mut total = 0.0;

        for end in 1..points.len() {
            total += pain[end];
            while points[end].length - points[start].length > meters {
                total -= pain[start];
                start += 1;
            }

            let best_score = best.map(|b| b.score).unwrap_or(0.0);
            if start > 0 && total > best_score {
                best = Some(DifficultSegment {
                    start,
                    end,
                    score: total,
                });
            }
        }

        match &best {
            Some(b) => debug!(
                "[Difficulty] '{}': hardest {}m is points {}..{} (score {:.0})",
                self.name(),
                meters,
                b.start,
                b.end,
                b.score
            ),
            None => debug!("[Difficulty] '{}': no difficult stretch", self.name()),
        }

        Ok(best)
    }
}
