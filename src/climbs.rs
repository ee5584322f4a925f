//! Climb detection.
//!
//! Climbs are found in three stages over candidate (start, end) point pairs:
//!
//! 1. **Extraction** - every run of points at or above the minimum grade
//!    becomes a candidate.
//! 2. **Merging** - neighbouring candidates separated by a short, not too
//!    flat gap are joined, forwards then backwards, until a full round
//!    changes nothing.
//! 3. **Pruning** - candidates that are not long, steep or high enough are
//!    dropped.
//!
//! Candidates carry copies of their endpoint points. Only the survivors are
//! resolved back to track positions, through the points' `seq`.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{Point, Track};

/// Gaps at least this long (meters) never merge, whatever the climb lengths.
pub const MAX_MERGE_GAP: f64 = 500.0;

/// A detected climb, referencing its endpoints by track position.
///
/// Grade, length and elevation gain are read from the track on demand, so
/// they follow any later changes to the points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Climb {
    pub start_index: usize,
    pub end_index: usize,
}

impl Climb {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    pub fn start<'a>(&self, track: &'a Track) -> &'a Point {
        &track[self.start_index]
    }

    pub fn end<'a>(&self, track: &'a Track) -> &'a Point {
        &track[self.end_index]
    }

    /// Distance covered, in meters.
    pub fn length(&self, track: &Track) -> f64 {
        self.end(track).length - self.start(track).length
    }

    /// Accumulated climb between the endpoints, in meters.
    pub fn climb(&self, track: &Track) -> f64 {
        self.end(track).climb - self.start(track).climb
    }

    /// Average grade in percent, from accumulated climb over length.
    pub fn grade(&self, track: &Track) -> f64 {
        self.climb(track) / self.length(track) * 100.0
    }

    /// Grade squared times length.
    pub fn difficulty(&self, track: &Track) -> f64 {
        let grade = self.grade(track);
        grade * grade * self.length(track)
    }
}

/// Configuration for climb detection.
///
/// A climb must satisfy at least *one* of the significant values (length,
/// grade or climb) and *all* of the minimums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbConfig {
    /// Anything below this grade isn't a climb at all.
    /// Default: 4.0 percent
    pub minimum_grade: f64,

    /// Don't combine climbs if the combined grade drops below this ratio of
    /// the candidate's own grade. Keeps steep climbs from being watered down
    /// by gentle approaches.
    /// Default: 0.8
    pub grade_ratio: f64,

    /// A climb longer than this is significant.
    /// Default: 1000.0 meters
    pub significant_length: f64,

    /// A climb steeper than this is significant.
    /// Default: 6.0 percent
    pub significant_grade: f64,

    /// A climb gaining more than this is significant.
    /// Default: 100.0 meters
    pub significant_climb: f64,

    /// Anything shorter than this isn't a climb.
    /// Default: 600.0 meters
    pub minimum_length: f64,

    /// Two climbs may be combined if the distance between them is less than
    /// this ratio of the candidate's length.
    /// Default: 0.35
    pub twixt_ratio: f64,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            minimum_grade: 4.0,
            grade_ratio: 0.8,
            significant_length: 1000.0,
            significant_grade: 6.0,
            significant_climb: 100.0,
            minimum_length: 600.0,
            twixt_ratio: 0.35,
        }
    }
}

/// A climb under construction: copies of its first and last point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub start: Point,
    pub end: Point,
}

impl Candidate {
    fn length(&self) -> f64 {
        self.end.length - self.start.length
    }

    fn gain(&self) -> f64 {
        self.end.elevation - self.start.elevation
    }

    fn grade(&self) -> f64 {
        grade_between(&self.start, &self.end)
    }
}

/// Grade in percent from elevation over distance between two points.
fn grade_between(start: &Point, end: &Point) -> f64 {
    (end.elevation - start.elevation) / (end.length - start.length) * 100.0
}

/// Whether a candidate of `length` and `own_grade` should absorb a neighbour
/// `gap` meters away, given the grade of the combined span.
fn should_merge(
    length: f64,
    gap: f64,
    own_grade: f64,
    combined_grade: f64,
    config: &ClimbConfig,
) -> bool {
    gap < length * config.twixt_ratio
        && gap < MAX_MERGE_GAP
        && combined_grade >= own_grade * config.grade_ratio
        && combined_grade >= config.minimum_grade
}

/// Stage 1: one candidate per run of points at or above the minimum grade.
///
/// A run ends at the first point below the grade, which becomes the
/// candidate's end point (or at the last point of the track).
pub(crate) fn extract_candidates(points: &[Point], minimum_grade: f64) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut i = 0;

    while i < points.len() {
        if points[i].grade >= minimum_grade {
            let end = (i + 1..points.len())
                .find(|&j| points[j].grade < minimum_grade)
                .unwrap_or(points.len() - 1);

            candidates.push(Candidate {
                start: points[i],
                end: points[end],
            });
            i = end;
        }
        i += 1;
    }

    candidates
}

/// Forward pass: fold each candidate into the following one.
fn combine_with_next(candidates: &mut Vec<Candidate>, config: &ClimbConfig) {
    let mut i = 0;
    while i + 1 < candidates.len() {
        let (this, next) = (candidates[i], candidates[i + 1]);
        let gap = next.start.length - this.end.length;
        let combined = grade_between(&this.start, &next.end);

        // The later climb must also finish higher
        if should_merge(this.length(), gap, this.grade(), combined, config)
            && this.end.elevation < next.end.elevation
        {
            candidates[i + 1].start = this.start;
            candidates.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Backward pass: fold each candidate into the preceding one.
fn combine_with_previous(candidates: &mut Vec<Candidate>, config: &ClimbConfig) {
    let mut i = candidates.len().saturating_sub(1);
    while i > 0 {
        let (prev, this) = (candidates[i - 1], candidates[i]);
        let gap = this.start.length - prev.end.length;
        let combined = grade_between(&prev.start, &this.end);

        // The earlier climb must also start lower
        if should_merge(this.length(), gap, this.grade(), combined, config)
            && prev.start.elevation < this.start.elevation
        {
            candidates[i - 1].end = this.end;
            candidates.remove(i);
        }
        i -= 1;
    }
}

/// Stage 2: merge until a full forward + backward round changes nothing.
///
/// A round that changes anything removes a candidate, so the loop is
/// bounded by the candidate count.
pub(crate) fn merge_candidates(candidates: &mut Vec<Candidate>, config: &ClimbConfig) {
    let mut rounds = 0;
    loop {
        let before = candidates.len();
        combine_with_next(candidates, config);
        combine_with_previous(candidates, config);
        rounds += 1;

        if candidates.len() == before {
            break;
        }
    }
    debug!(
        "[Climbs] Merged to {} candidates in {} rounds",
        candidates.len(),
        rounds
    );
}

/// Stage 3: keep candidates that are long, steep or high enough, and meet
/// every minimum.
pub(crate) fn remove_insignificant(candidates: &mut Vec<Candidate>, config: &ClimbConfig) {
    candidates.retain(|c| {
        let length = c.length();
        let grade = c.grade();

        let significant = length > config.significant_length
            || grade > config.significant_grade
            || c.gain() > config.significant_climb;

        significant && length >= config.minimum_length && grade >= config.minimum_grade
    });
}

impl Track {
    /// Identify distinct climbs, replacing any found before.
    ///
    /// Needs `length`, `grade` (see [`Track::calculate_segment_grade`]) and,
    /// for the climb's own grade and difficulty, `climb`.
    pub fn calculate_climbs(&mut self, config: &ClimbConfig) -> &[Climb] {
        self.climbs.clear();

        let mut candidates = extract_candidates(self.points(), config.minimum_grade);
        let extracted = candidates.len();

        merge_candidates(&mut candidates, config);
        remove_insignificant(&mut candidates, config);

        let lookup = self.seq_positions();
        self.climbs = candidates
            .iter()
            .filter_map(|c| {
                Some(Climb::new(
                    *lookup.get(&c.start.seq)?,
                    *lookup.get(&c.end.seq)?,
                ))
            })
            .collect();

        info!(
            "[Climbs] '{}': {} candidates -> {} climbs",
            self.name(),
            extracted,
            self.climbs.len()
        );
        &self.climbs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points every 50 m, with explicit elevation and grade.
    fn graded(profile: &[(f64, f64)]) -> Track {
        profile
            .iter()
            .enumerate()
            .map(|(i, &(ele, grade))| {
                let mut p = Point::new(45.0, 7.0)
                    .with_length(i as f64 * 50.0)
                    .with_elevation(ele);
                p.grade = grade;
                p
            })
            .collect()
    }

    /// Two 5% ramps, 0-1000 m and 1050-2100 m, with a flat 50 m between.
    fn two_ramps() -> Track {
        let mut profile = Vec::new();
        for k in 0..=20 {
            profile.push((k as f64 * 2.5, 5.0));
        }
        profile.push((50.0, 0.0));
        for k in 22..=42 {
            profile.push((50.0 + (k - 21) as f64 * 2.5, 5.0));
        }
        let mut track = graded(&profile);
        track.calculate_climb(0.0);
        track
    }

    fn candidate(track: &Track, start: usize, end: usize) -> Candidate {
        Candidate {
            start: track[start],
            end: track[end],
        }
    }

    #[test]
    fn test_extract_runs() {
        let track = graded(&[
            (0.0, 1.0),
            (1.0, 5.0),
            (2.0, 6.0),
            (3.0, 2.0),
            (4.0, 4.0),
            (5.0, 4.5),
        ]);
        let candidates = extract_candidates(track.points(), 4.0);

        assert_eq!(candidates.len(), 2);
        // The first run ends at the first point below the grade
        assert_eq!((candidates[0].start.seq, candidates[0].end.seq), (1, 3));
        // The last run ends at the last point
        assert_eq!((candidates[1].start.seq, candidates[1].end.seq), (4, 5));
    }

    #[test]
    fn test_extract_empty_and_flat() {
        assert!(extract_candidates(&[], 4.0).is_empty());
        let flat = graded(&[(0.0, 0.0), (0.0, 0.0)]);
        assert!(extract_candidates(flat.points(), 4.0).is_empty());
    }

    #[test]
    fn test_two_ramps_merge_into_one_climb() {
        let mut track = two_ramps();
        let climbs = track.calculate_climbs(&ClimbConfig::default()).to_vec();

        assert_eq!(climbs.len(), 1);
        assert_eq!(climbs[0], Climb::new(0, 42));
        assert_eq!(climbs[0].length(&track), 2100.0);
        assert!((climbs[0].grade(&track) - 102.5 / 2100.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_wide_gap_does_not_merge() {
        let track = two_ramps();
        let mut candidates = vec![candidate(&track, 0, 10), candidate(&track, 30, 42)];
        merge_candidates(&mut candidates, &ClimbConfig::default());
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_merge_requires_net_gain() {
        let config = ClimbConfig {
            twixt_ratio: 1.0,
            grade_ratio: 0.0,
            ..ClimbConfig::default()
        };
        let ramps = |last: f64| {
            graded(&[
                (0.0, 5.0),
                (10.0, 5.0),
                (20.0, 5.0),
                (30.0, 5.0),
                (40.0, 5.0),
                (40.0, 0.0),
                (35.0, 5.0),
                (last, 5.0),
            ])
        };

        // Second ramp finishes below the top of the first
        let track = ramps(38.0);
        let mut candidates = vec![candidate(&track, 0, 4), candidate(&track, 6, 7)];
        combine_with_next(&mut candidates, &config);
        assert_eq!(candidates.len(), 2);

        let track = ramps(60.0);
        let mut candidates = vec![candidate(&track, 0, 4), candidate(&track, 6, 7)];
        combine_with_next(&mut candidates, &config);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_merge_is_stable() {
        let mut track = two_ramps();
        track.points_mut()[10].grade = 0.0;
        track.points_mut()[32].grade = 0.0;

        let config = ClimbConfig::default();
        let mut candidates = extract_candidates(track.points(), config.minimum_grade);
        assert_eq!(candidates.len(), 4);

        merge_candidates(&mut candidates, &config);
        let merged = candidates.clone();
        merge_candidates(&mut candidates, &config);
        assert_eq!(candidates, merged);
    }

    #[test]
    fn test_merge_cascades_across_rounds() {
        let at = |length: f64, elevation: f64| {
            Point::new(45.0, 7.0)
                .with_length(length)
                .with_elevation(elevation)
        };
        let ramp = |start: (f64, f64), end: (f64, f64)| Candidate {
            start: at(start.0, start.1),
            end: at(end.0, end.1),
        };
        // Short, long, short 6% ramps. The middle one reaches back to the
        // first, and only the combined pair is long enough to reach the last
        let ramps = vec![
            ramp((0.0, 0.0), (100.0, 6.0)),
            ramp((160.0, 6.0), (560.0, 30.0)),
            ramp((720.0, 30.0), (820.0, 36.0)),
        ];
        let config = ClimbConfig::default();

        let mut single = ramps.clone();
        combine_with_next(&mut single, &config);
        combine_with_previous(&mut single, &config);
        assert_eq!(single.len(), 2);

        let mut candidates = ramps;
        merge_candidates(&mut candidates, &config);
        assert_eq!(candidates.len(), 1);
        assert!(candidates.len() < single.len());
        assert_eq!(candidates[0].start.length, 0.0);
        assert_eq!(candidates[0].end.length, 820.0);
    }

    #[test]
    fn test_backward_merge() {
        // A short ramp followed by a long one. Measured against the short
        // ramp the gap is too wide; against the long one it is close
        let track = two_ramps();
        let config = ClimbConfig {
            twixt_ratio: 0.1,
            ..ClimbConfig::default()
        };
        let mut candidates = vec![candidate(&track, 0, 3), candidate(&track, 4, 42)];
        combine_with_next(&mut candidates, &config);
        assert_eq!(candidates.len(), 2);

        combine_with_previous(&mut candidates, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!((candidates[0].start.seq, candidates[0].end.seq), (0, 42));
    }

    #[test]
    fn test_prune_insignificant() {
        let track = two_ramps();
        let config = ClimbConfig::default();

        // 500 m is below the minimum length; 1000 m at 5% gaining 50 m
        // is not significant
        let mut candidates = vec![candidate(&track, 0, 10), candidate(&track, 0, 20)];
        remove_insignificant(&mut candidates, &config);
        assert_eq!(candidates.len(), 0);

        // 2100 m is significant by length
        let mut candidates = vec![candidate(&track, 0, 42)];
        remove_insignificant(&mut candidates, &config);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_climbs_resolve_after_removal() {
        let mut track = two_ramps();
        let keep: Vec<bool> = (0..track.len()).map(|i| i != 5).collect();
        track.retain_mask(&keep);

        let climbs = track.calculate_climbs(&ClimbConfig::default()).to_vec();
        assert_eq!(climbs.len(), 1);
        assert_eq!(track[climbs[0].start_index].seq, 0);
        assert_eq!(track[climbs[0].end_index].seq, 42);
        assert_eq!(climbs[0].end_index, 41);
    }

    #[test]
    fn test_climb_difficulty() {
        let track = two_ramps();
        let climb = Climb::new(0, 20);
        assert_eq!(climb.length(&track), 1000.0);
        assert_eq!(climb.climb(&track), 50.0);
        assert!((climb.grade(&track) - 5.0).abs() < 1e-9);
        assert!((climb.difficulty(&track) - 25_000.0).abs() < 1e-6);
    }
}
