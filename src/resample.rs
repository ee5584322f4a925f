//! Reducing the number of points in a track.
//!
//! Two strategies:
//! - [`Track::shrink_by_sample`] keeps every n'th point and never drops a
//!   point a peak or climb is anchored on. Peaks and climbs stay valid.
//! - [`Track::shrink_by_average`] collapses buckets of points into their
//!   mean. The result has no relation to the original positions, so stored
//!   peaks and climbs are discarded.

use log::{info, warn};

use crate::error::{Result, TrackError};
use crate::{Point, Track, INVALID_TEMP};

fn check_target(target: usize) -> Result<()> {
    if target == 0 {
        return Err(TrackError::invalid("target", "must keep at least one point"));
    }
    Ok(())
}

impl Track {
    /// Thin the track to roughly `target` points by keeping the first point
    /// of every stride.
    ///
    /// Integer stride means the result is close to, not exactly, `target`.
    /// Points referenced by a peak or climb are always kept, and the stored
    /// features are moved to their points' new positions. The last point is
    /// always kept. A no-op when the track already has `target` points or
    /// fewer.
    pub fn shrink_by_sample(&mut self, target: usize) -> Result<()> {
        check_target(target)?;
        let n = self.len();
        if target >= n {
            return Ok(());
        }

        let stride = (n / target).max(1);
        let anchors = self.anchor_seqs();
        let flagged: Vec<bool> = self.iter().map(|p| anchors.contains(&p.seq)).collect();

        let mut keep = vec![false; n];
        keep[0] = true;

        let mut i = 1;
        while i < n {
            if flagged[i] {
                keep[i] = true;
                i += 1;
                continue;
            }

            // Discard up to a stride of points, stopping short of a flagged one
            let mut end = i;
            for _ in 0..stride {
                end += 1;
                if end >= n || flagged[end] {
                    break;
                }
            }
            let end = end.min(n - 1);
            keep[end] = true;
            i = end + 1;
        }

        self.retain_mask(&keep);
        info!(
            "[Resample] '{}': sampled {} -> {} points (stride {})",
            self.name(),
            n,
            self.len(),
            stride
        );
        Ok(())
    }

    /// Replace the track with `target` points, each the mean of a contiguous
    /// bucket of original points.
    ///
    /// Lat, lon, elevation, length, heart rate, velocity, climb and timestamp
    /// are averaged; air temperature is averaged over the points that have
    /// one. Grade is reset to 0, so recompute it afterwards. Each new point's
    /// `seq` is its bucket number.
    ///
    /// Stored peaks and climbs cannot survive averaging and are cleared.
    pub fn shrink_by_average(&mut self, target: usize) -> Result<()> {
        check_target(target)?;
        let n = self.len();
        if target >= n {
            return Ok(());
        }

        let points = self.points();
        let averaged: Vec<Point> = (0..target)
            .map(|bucket| {
                let start = bucket * n / target;
                let end = (bucket + 1) * n / target;
                let mut p = average(&points[start..end]);
                p.seq = bucket;
                p
            })
            .collect();

        if !self.peaks().is_empty() || !self.climbs().is_empty() {
            warn!(
                "[Resample] '{}': averaging discards {} peaks and {} climbs",
                self.name(),
                self.peaks().len(),
                self.climbs().len()
            );
        }

        self.replace_points(averaged);
        info!(
            "[Resample] '{}': averaged {} -> {} points",
            self.name(),
            n,
            target
        );
        Ok(())
    }
}

/// Mean of a non-empty run of points. Grade is left at 0.
fn average(bucket: &[Point]) -> Point {
    let count = bucket.len() as f64;
    let mut p = Point::default();
    let mut hr: u64 = 0;
    let mut timestamp: i64 = 0;
    let mut atemp = 0.0;
    let mut atemp_count = 0;

    for q in bucket {
        p.lat += q.lat;
        p.lon += q.lon;
        p.elevation += q.elevation;
        p.length += q.length;
        p.velocity += q.velocity;
        p.climb += q.climb;
        hr += q.hr as u64;
        timestamp += q.timestamp;
        if q.valid_temp() {
            atemp += q.atemp;
            atemp_count += 1;
        }
    }

    p.lat /= count;
    p.lon /= count;
    p.elevation /= count;
    p.length /= count;
    p.velocity /= count;
    p.climb /= count;
    p.hr = (hr / bucket.len() as u64) as u16;
    p.timestamp = timestamp / bucket.len() as i64;
    p.atemp = if atemp_count > 0 {
        atemp / atemp_count as f64
    } else {
        INVALID_TEMP
    };
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Climb, Peak};

    fn numbered(n: usize) -> Track {
        (0..n)
            .map(|i| {
                Point::new(45.0 + i as f64 * 0.001, 7.0)
                    .with_length(i as f64 * 10.0)
                    .with_elevation(i as f64)
                    .with_timestamp(1_000 + i as i64)
                    .with_hr(100 + i as u16)
            })
            .collect()
    }

    fn seqs(track: &Track) -> Vec<usize> {
        track.iter().map(|p| p.seq).collect()
    }

    #[test]
    fn test_sample_noop_when_small() {
        let mut track = numbered(5);
        track.shrink_by_sample(5).unwrap();
        assert_eq!(track.len(), 5);
        track.shrink_by_sample(50).unwrap();
        assert_eq!(track.len(), 5);
    }

    #[test]
    fn test_sample_rejects_zero() {
        let mut track = numbered(5);
        assert!(track.shrink_by_sample(0).is_err());
        assert!(track.shrink_by_average(0).is_err());
    }

    #[test]
    fn test_sample_stride() {
        let mut track = numbered(10);
        track.shrink_by_sample(5).unwrap();

        // Stride 2: each kept point is followed by two discarded ones, and
        // the last point survives
        assert_eq!(seqs(&track), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_sample_keeps_anchors() {
        let mut track = numbered(20);
        track.peaks = vec![Peak {
            index: 7,
            prominence: 55.0,
            range: 2100.0,
        }];
        track.climbs = vec![Climb::new(2, 13)];

        track.shrink_by_sample(4).unwrap();

        let kept = seqs(&track);
        for seq in [2, 7, 13] {
            assert!(kept.contains(&seq), "seq {} dropped: {:?}", seq, kept);
        }
        assert!(track.len() < 20);

        let peak = track.peaks()[0];
        assert_eq!(track[peak.index].seq, 7);
        assert_eq!(peak.prominence, 55.0);
        let climb = track.climbs()[0];
        assert_eq!(track[climb.start_index].seq, 2);
        assert_eq!(track[climb.end_index].seq, 13);
    }

    #[test]
    fn test_sample_with_stride_one() {
        let mut track = numbered(7);
        track.shrink_by_sample(6).unwrap();
        assert_eq!(seqs(&track), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_average_buckets() {
        let mut track = numbered(10);
        track.shrink_by_average(4).unwrap();

        // Buckets [0,2) [2,5) [5,7) [7,10)
        assert_eq!(track.len(), 4);
        assert_eq!(seqs(&track), vec![0, 1, 2, 3]);

        let p = track[1];
        assert!((p.elevation - 3.0).abs() < 1e-9);
        assert!((p.length - 30.0).abs() < 1e-9);
        assert_eq!(p.timestamp, 1_003);
        assert_eq!(p.hr, 103);
        assert_eq!(p.grade, 0.0);
        assert!(!p.valid_temp());

        assert!((track[0].elevation - 0.5).abs() < 1e-9);
        assert!((track[3].elevation - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_temperature_skips_missing() {
        let mut track: Track = [INVALID_TEMP, 10.0, 20.0, INVALID_TEMP]
            .iter()
            .map(|&t| Point::new(0.0, 0.0).with_atemp(t))
            .collect();
        track.shrink_by_average(2).unwrap();

        assert_eq!(track[0].atemp, 10.0);
        assert_eq!(track[1].atemp, 20.0);
    }

    #[test]
    fn test_average_clears_features() {
        let mut track = numbered(10);
        track.peaks = vec![Peak {
            index: 3,
            prominence: 60.0,
            range: 3000.0,
        }];
        track.climbs = vec![Climb::new(1, 8)];

        track.shrink_by_average(3).unwrap();
        assert!(track.peaks().is_empty());
        assert!(track.climbs().is_empty());

        // New points keep getting fresh seqs
        track.push(Point::new(0.0, 0.0));
        assert_eq!(track.last().unwrap().seq, 10);
    }
}
