//! Geographic utilities: great-circle distance and bounding boxes.

use geo::{Coord, Rect};

use crate::Point;

/// Mean Earth radius used for all distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two lat/lon pairs (degrees), in meters.
///
/// # Example
/// ```
/// use track_analytics::geo_utils::haversine_distance;
///
/// // One degree of latitude is roughly 111 km
/// let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
}

/// Bounding box of the points, with x = longitude and y = latitude.
///
/// Returns `None` for an empty slice.
pub fn compute_bounds(points: &[Point]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let mut min = Coord {
        x: first.lon,
        y: first.lat,
    };
    let mut max = min;

    for p in &points[1..] {
        min.x = min.x.min(p.lon);
        min.y = min.y.min(p.lat);
        max.x = max.x.max(p.lon);
        max.y = max.y.max(p.lat);
    }

    Some(Rect::new(min, max))
}

/// True when the point lies strictly inside the rectangle.
///
/// Points on the border are outside; masking keeps them.
pub fn strictly_contains(bounds: &Rect<f64>, point: &Point) -> bool {
    let min = bounds.min();
    let max = bounds.max();
    point.lon > min.x && point.lon < max.x && point.lat > min.y && point.lat < max.y
}
