//! # Track
//!
//! The ordered point buffer that every analysis operates on.
//!
//! A [`Track`] owns its points and the features detected on them (peaks and
//! climbs). Points are only added through [`Track::push`] and friends, which
//! hand out the stable `seq` identity, and only removed by the track's own
//! operations, which keep the stored features pointing at the right points.

use std::collections::{HashMap, HashSet};
use std::ops::Index;

use geo::Rect;
use log::{debug, warn};

use crate::error::{OptionExt, Result};
use crate::geo_utils::{compute_bounds, strictly_contains};
use crate::{Climb, Peak, Point};

/// Timestamp gap (seconds) beyond which two recordings are considered separate sessions.
pub const BURR_GAP_SECONDS: i64 = 4 * 60 * 60;

/// An ordered sequence of recorded points that defines a path.
#[derive(Debug, Clone, Default)]
pub struct Track {
    name: String,
    points: Vec<Point>,
    next_seq: usize,
    pub(crate) peaks: Vec<Peak>,
    pub(crate) climbs: Vec<Climb>,
}

impl Track {
    /// Create an empty, unnamed track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a named track from points in recording order.
    pub fn with_points(name: impl Into<String>, points: impl IntoIterator<Item = Point>) -> Self {
        let mut track = Self {
            name: name.into(),
            ..Self::default()
        };
        track.extend(points);
        track
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Append a point, assigning its `seq`.
    ///
    /// On a track that has never lost points, `seq` equals the position the
    /// point lands at. After removals the counter keeps increasing, so seqs
    /// stay unique.
    pub fn push(&mut self, mut point: Point) {
        point.seq = self.next_seq;
        self.next_seq += 1;
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    /// The first point; an empty track is a caller error.
    pub fn first(&self) -> Result<&Point> {
        self.points.first().ok_or_empty(&self.name)
    }

    /// The last point; an empty track is a caller error.
    pub fn last(&self) -> Result<&Point> {
        self.points.last().ok_or_empty(&self.name)
    }

    /// Peaks found by the last [`Track::calculate_peaks`] call.
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// Climbs found by the last [`Track::calculate_climbs`] call.
    pub fn climbs(&self) -> &[Climb] {
        &self.climbs
    }

    /// Bounding box of the track (x = longitude, y = latitude).
    pub fn bounds(&self) -> Option<Rect<f64>> {
        compute_bounds(&self.points)
    }

    /// Current position of the point with the given seq.
    ///
    /// Linear scan; use [`Track::seq_positions`] when resolving many seqs.
    pub fn position_of(&self, seq: usize) -> Option<usize> {
        self.points.iter().position(|p| p.seq == seq)
    }

    /// Map of seq -> current position for every point.
    pub fn seq_positions(&self) -> HashMap<usize, usize> {
        self.points
            .iter()
            .enumerate()
            .map(|(index, p)| (p.seq, index))
            .collect()
    }

    pub(crate) fn points_mut(&mut self) -> &mut [Point] {
        &mut self.points
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Seqs of every point a stored peak or climb is anchored on.
    pub(crate) fn anchor_seqs(&self) -> HashSet<usize> {
        let mut anchors = HashSet::new();
        for peak in &self.peaks {
            anchors.insert(self.points[peak.index].seq);
        }
        for climb in &self.climbs {
            anchors.insert(self.points[climb.start_index].seq);
            anchors.insert(self.points[climb.end_index].seq);
        }
        anchors
    }

    /// Keep only the points for which `keep[i]` is true, then move stored
    /// features to their anchors' new positions.
    ///
    /// Features whose anchor was removed are dropped.
    pub(crate) fn retain_mask(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.points.len());

        // Remember anchors by seq before positions shift
        let peak_seqs: Vec<usize> = self
            .peaks
            .iter()
            .map(|p| self.points[p.index].seq)
            .collect();
        let climb_seqs: Vec<(usize, usize)> = self
            .climbs
            .iter()
            .map(|c| (self.points[c.start_index].seq, self.points[c.end_index].seq))
            .collect();

        let mut position = 0;
        self.points.retain(|_| {
            let kept = keep[position];
            position += 1;
            kept
        });

        if self.peaks.is_empty() && self.climbs.is_empty() {
            return;
        }

        let lookup = self.seq_positions();
        let peaks_before = self.peaks.len();
        let climbs_before = self.climbs.len();

        self.peaks = self
            .peaks
            .iter()
            .zip(peak_seqs)
            .filter_map(|(peak, seq)| {
                lookup.get(&seq).map(|&index| Peak { index, ..*peak })
            })
            .collect();

        self.climbs = climb_seqs
            .into_iter()
            .filter_map(|(start, end)| {
                Some(Climb::new(*lookup.get(&start)?, *lookup.get(&end)?))
            })
            .collect();

        let dropped = (peaks_before - self.peaks.len()) + (climbs_before - self.climbs.len());
        if dropped > 0 {
            warn!(
                "[Track] '{}': dropped {} features whose anchor points were removed",
                self.name, dropped
            );
        }
    }

    /// Replace the whole buffer. Stored features are discarded because their
    /// positions mean nothing in the new buffer.
    pub(crate) fn replace_points(&mut self, points: Vec<Point>) {
        self.next_seq = self.next_seq.max(points.iter().map(|p| p.seq + 1).max().unwrap_or(0));
        self.points = points;
        self.peaks.clear();
        self.climbs.clear();
    }

    /// Remove points strictly inside a lon/lat rectangle (x = longitude,
    /// y = latitude). Points on the border are kept.
    ///
    /// Returns the number of points removed.
    pub fn mask(&mut self, bounds: &Rect<f64>) -> usize {
        let keep: Vec<bool> = self
            .points
            .iter()
            .map(|p| !strictly_contains(bounds, p))
            .collect();
        let before = self.points.len();
        self.retain_mask(&keep);

        let removed = before - self.points.len();
        debug!("[Track] '{}': masked {} points", self.name, removed);
        removed
    }

    /// Cut off runs of points separated from the main recording by more
    /// than [`BURR_GAP_SECONDS`].
    ///
    /// Finds the first oversized gap, discards the side with fewer points
    /// (the head on a tie), and starts over until a pass removes nothing.
    /// Returns the number of points removed.
    pub fn remove_burrs(&mut self) -> usize {
        let original = self.points.len();

        loop {
            let len = self.points.len();
            let split = (1..len).find(|&i| {
                self.points[i].timestamp - self.points[i - 1].timestamp > BURR_GAP_SECONDS
            });

            let Some(split) = split else { break };

            let keep: Vec<bool> = if split <= len / 2 {
                (0..len).map(|i| i >= split).collect()
            } else {
                (0..len).map(|i| i < split).collect()
            };
            self.retain_mask(&keep);
        }

        let removed = original - self.points.len();
        if removed > 0 {
            warn!(
                "[Track] '{}': removed {} points separated by gaps over {}h",
                self.name,
                removed,
                BURR_GAP_SECONDS / 3600
            );
        }
        removed
    }
}

impl Index<usize> for Track {
    type Output = Point;

    fn index(&self, index: usize) -> &Point {
        &self.points[index]
    }
}

impl Extend<Point> for Track {
    fn extend<I: IntoIterator<Item = Point>>(&mut self, iter: I) {
        for point in iter {
            self.push(point);
        }
    }
}

impl FromIterator<Point> for Track {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        let mut track = Track::new();
        track.extend(iter);
        track
    }
}

impl<'a> IntoIterator for &'a Track {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
