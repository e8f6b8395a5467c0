//! Great-circle distance and polyline projection helpers.
//!
//! Projection uses the planar law of cosines over great-circle distances,
//! which is accurate enough at city scale where segments are a few hundred
//! meters long.

use crate::models::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates, in meters
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Closest approach of a point to a polyline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Distance from the point to the closest foot on the polyline, in meters
    pub distance: f64,
    /// Arc length from the polyline start to that foot, in meters
    pub progress: f64,
}

/// Projects `point` onto `polyline`.
///
/// Zero-length segments are skipped. Polylines with fewer than two vertices
/// project to `(0, 0)`.
pub fn project_onto_polyline(polyline: &[Coordinate], point: Coordinate) -> Projection {
    if polyline.len() < 2 {
        return Projection {
            distance: 0.0,
            progress: 0.0,
        };
    }

    let mut best = Projection {
        distance: f64::INFINITY,
        progress: 0.0,
    };
    let mut travelled = 0.0;

    for segment in polyline.windows(2) {
        let (start, end) = (segment[0], segment[1]);
        let segment_len = distance(start, end);
        if segment_len == 0.0 {
            continue;
        }

        let d1 = distance(point, start);
        let d2 = distance(point, end);
        let along = (segment_len.powi(2) + d1.powi(2) - d2.powi(2)) / (2.0 * segment_len);

        let (offset, progress) = if along < 0.0 {
            (d1, travelled)
        } else if along > segment_len {
            (d2, travelled + segment_len)
        } else {
            ((d1.powi(2) - along.powi(2)).max(0.0).sqrt(), travelled + along)
        };

        if offset < best.distance {
            best = Projection {
                distance: offset,
                progress,
            };
        }
        travelled += segment_len;
    }

    // Every segment was degenerate
    if best.distance.is_infinite() {
        best.distance = 0.0;
    }

    best
}

/// Total arc length of a polyline, in meters
pub fn polyline_length(polyline: &[Coordinate]) -> f64 {
    polyline
        .windows(2)
        .map(|segment| distance(segment[0], segment[1]))
        .sum()
}

/// Index and distance of the vertex in `points` closest to `target`.
///
/// Entries without a known coordinate are ignored.
pub fn nearest_point(
    points: impl IntoIterator<Item = Option<Coordinate>>,
    target: Coordinate,
) -> Option<(usize, f64)> {
    let mut nearest: Option<(usize, f64)> = None;

    for (i, point) in points.into_iter().enumerate() {
        let Some(point) = point.filter(Coordinate::is_known) else {
            continue;
        };
        let d = distance(point, target);
        if nearest.map_or(true, |(_, best)| d < best) {
            nearest = Some((i, d));
        }
    }

    nearest
}
