use crate::document::{Route, Track, TrackSegment, Waypoint};
use crate::geo::{point_to_chord_distance, to_ecef, EcefPoint};

fn ecef_of(point: &Waypoint) -> EcefPoint {
    to_ecef(
        point.latitude,
        point.longitude,
        point.elevation.unwrap_or(0.0),
    )
}

/// Douglas-Peucker reduction. Keeps a point only while its perpendicular
/// distance to the chord of the current span is strictly above `tolerance`
/// (ties collapse). Distances are measured in the ECEF frame so longitude
/// scaling cannot distort them. Idempotent at a fixed tolerance.
///
/// The classic recursion is run on an explicit work stack; a long, nearly
/// collinear track would otherwise overflow the call stack.
pub fn simplify_points(points: &[Waypoint], tolerance: f64) -> Vec<Waypoint> {
    if points.len() <= 2 {
        return points.iter().map(Waypoint::with_fresh_id).collect();
    }

    let ecef: Vec<EcefPoint> = points.iter().map(ecef_of).collect();
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut spans = vec![(0, points.len() - 1)];
    while let Some((start, end)) = spans.pop() {
        if end - start < 2 {
            continue;
        }
        let mut max_distance = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let d = point_to_chord_distance(&ecef[i], &ecef[start], &ecef[end]);
            // strict comparison: ties break to the first occurrence
            if d > max_distance {
                max_distance = d;
                max_index = i;
            }
        }
        if max_distance > tolerance {
            keep[max_index] = true;
            spans.push((start, max_index));
            spans.push((max_index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter(|(_, kept)| *kept)
        .map(|(p, _)| p.with_fresh_id())
        .collect()
}

/// Simplifies every segment of a track. A structural rewrite: the result
/// is a new track with fresh identities throughout.
pub fn simplify_track(track: &Track, tolerance: f64) -> Track {
    let mut result = track.clone();
    result.id = uuid::Uuid::new_v4();
    result.segments = track
        .segments
        .iter()
        .map(|segment| TrackSegment::new(simplify_points(&segment.points, tolerance)))
        .collect();
    result
}

pub fn simplify_route(route: &Route, tolerance: f64) -> Route {
    let mut result = route.clone();
    result.id = uuid::Uuid::new_v4();
    result.points = simplify_points(&route.points, tolerance);
    result
}
