//! Prominence-based peak detection.
//!
//! A point is a peak when, in both directions, the terrain drops by at least
//! `min_prominence` meters before it rises above the point again, and the
//! nearest higher ground is at least `min_range` meters away.
//!
//! Every point is scanned outward until the first higher point, so the worst
//! case is O(n²), but real profiles stop each scan quickly.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::Track;

/// A locally prominent high point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Position of the peak's point in the track
    pub index: usize,
    /// Smaller of the two drops before higher ground, in meters
    pub prominence: f64,
    /// Distance to the nearer higher ground, in meters
    pub range: f64,
}

/// Configuration for peak detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum distance to higher ground on each side.
    /// Default: 2000.0 meters
    pub min_range: f64,

    /// Minimum drop below the peak on each side.
    /// Default: 50.0 meters
    pub min_prominence: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_range: 2000.0,
            min_prominence: 50.0,
        }
    }
}

impl Track {
    /// Find the distinct peaks of the track, replacing any found before.
    ///
    /// Needs `length` to be populated.
    pub fn calculate_peaks(&mut self, config: &PeakConfig) -> &[Peak] {
        let points = self.points();
        let n = points.len();
        let mut peaks = Vec::new();

        for i in 0..n {
            let here = &points[i];

            // Walk back until the terrain reaches this height again
            let mut prom_pre = -1.0_f64;
            let mut range_pre = here.length;
            for j in (0..i).rev() {
                let delta = here.elevation - points[j].elevation;
                if delta <= 0.0 {
                    range_pre = here.length - points[j].length;
                    break;
                }
                prom_pre = prom_pre.max(delta);
            }

            // Walk forward until the terrain rises above this height; equal
            // ground ahead does not stop the scan, so a plateau yields a
            // single peak at its first point
            let mut prom_post = -1.0_f64;
            let mut range_post = points[n - 1].length - here.length;
            for p in &points[i + 1..] {
                let delta = here.elevation - p.elevation;
                if delta < 0.0 {
                    range_post = p.length - here.length;
                    break;
                }
                prom_post = prom_post.max(delta);
            }

            if prom_pre >= config.min_prominence
                && prom_post >= config.min_prominence
                && range_pre >= config.min_range
                && range_post >= config.min_range
            {
                peaks.push(Peak {
                    index: i,
                    prominence: prom_pre.min(prom_post),
                    range: range_pre.min(range_post),
                });
            }
        }

        debug!(
            "[Peaks] '{}': {} peaks (range >= {}m, prominence >= {}m)",
            self.name(),
            peaks.len(),
            config.min_range,
            config.min_prominence
        );

        self.peaks = peaks;
        &self.peaks
    }
}
