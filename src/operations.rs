use uuid::Uuid;

use crate::document::{Document, PaletteCursor, Route, Track, TrackSegment, Waypoint};
use crate::errors::ValidationError;
use crate::geo::BoundingBox;

fn first_non_empty(a: &Option<String>, b: &Option<String>) -> Option<String> {
    let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
    non_empty(a).or_else(|| non_empty(b))
}

/// Splits a track at a strictly interior point of one of its segments.
/// The split point is duplicated: the first track ends with it, the
/// second begins with it. Both outputs are structural rewrites with fresh
/// identities throughout.
pub fn split_track(
    track: &Track,
    segment_id: Uuid,
    point_index: usize,
) -> Result<(Track, Track), ValidationError> {
    let position = track
        .segments
        .iter()
        .position(|s| s.id == segment_id)
        .ok_or(ValidationError::UnknownItem(segment_id))?;
    let segment = &track.segments[position];
    let len = segment.points.len();
    if point_index == 0 || point_index + 1 >= len {
        return Err(ValidationError::InvalidSplitIndex {
            index: point_index,
            len,
        });
    }

    let fresh = |points: &[Waypoint]| {
        TrackSegment::new(points.iter().map(Waypoint::with_fresh_id).collect())
    };

    let mut first = track.clone();
    first.id = Uuid::new_v4();
    first.segments = track.segments[..position]
        .iter()
        .map(TrackSegment::with_fresh_ids)
        .collect();
    first.segments.push(fresh(&segment.points[..=point_index]));

    let mut second = track.clone();
    second.id = Uuid::new_v4();
    second.segments = vec![fresh(&segment.points[point_index..])];
    second
        .segments
        .extend(track.segments[position + 1..].iter().map(TrackSegment::with_fresh_ids));

    Ok((first, second))
}

/// Concatenates the segment lists of two tracks. Metadata fields take the
/// first non-empty value of the two sources.
pub fn join_tracks(first: &Track, second: &Track) -> Track {
    let mut joined = Track::new(first.color.clone());
    joined.name = first_non_empty(&first.name, &second.name);
    joined.comment = first_non_empty(&first.comment, &second.comment);
    joined.description = first_non_empty(&first.description, &second.description);
    joined.source = first_non_empty(&first.source, &second.source);
    joined.link = first.link.clone().or_else(|| second.link.clone());
    joined.number = first.number.or(second.number);
    joined.visible = first.visible;
    joined.expanded = first.expanded;
    joined.extensions = first.extensions.clone();
    joined.segments = first
        .segments
        .iter()
        .chain(second.segments.iter())
        .map(TrackSegment::with_fresh_ids)
        .collect();
    joined
}

/// Reverses travel direction: point order within every segment and the
/// segment order itself (segment sequence encodes path continuity). An
/// order edit, so every identity is preserved and reversing twice
/// restores the track exactly.
pub fn reverse_track(track: &Track) -> Track {
    let mut reversed = track.clone();
    reversed.segments.reverse();
    for segment in &mut reversed.segments {
        segment.points.reverse();
    }
    reversed
}

/// Flattens all segments into one, preserving point order. A structural
/// rewrite with fresh identities.
pub fn merge_segments(track: &Track) -> Track {
    let mut merged = track.clone();
    merged.id = Uuid::new_v4();
    let points = track.points().map(Waypoint::with_fresh_id).collect();
    merged.segments = vec![TrackSegment::new(points)];
    merged
}

pub fn route_to_track(route: &Route) -> Track {
    let mut track = Track::new(route.color.clone());
    track.name = route.name.clone();
    track.comment = route.comment.clone();
    track.description = route.description.clone();
    track.source = route.source.clone();
    track.link = route.link.clone();
    track.number = route.number;
    track.visible = route.visible;
    track.expanded = route.expanded;
    track.extensions = route.extensions.clone();
    track.segments = vec![TrackSegment::new(
        route.points.iter().map(Waypoint::with_fresh_id).collect(),
    )];
    track
}

/// Flattens every segment boundary into a single run. Deliberately lossy:
/// the segment structure cannot be recovered by converting back.
pub fn track_to_route(track: &Track) -> Route {
    let mut route = Route::new(track.color.clone());
    route.name = track.name.clone();
    route.comment = track.comment.clone();
    route.description = track.description.clone();
    route.source = track.source.clone();
    route.link = track.link.clone();
    route.number = track.number;
    route.visible = track.visible;
    route.expanded = track.expanded;
    route.extensions = track.extensions.clone();
    route.points = track.points().map(Waypoint::with_fresh_id).collect();
    route
}

/// Builds a route from deep copies of existing top-level waypoints, in the
/// order given. Ids that resolve to nothing are ignored; at least 2 must
/// resolve.
pub fn route_from_waypoints(
    document: &Document,
    ids: &[Uuid],
    palette: &mut PaletteCursor,
) -> Result<Route, ValidationError> {
    let points: Vec<Waypoint> = ids
        .iter()
        .filter_map(|id| document.waypoint(*id))
        .map(Waypoint::with_fresh_id)
        .collect();
    if points.len() < 2 {
        return Err(ValidationError::TooFewPoints {
            required: 2,
            actual: points.len(),
        });
    }
    let mut route = Route::new(palette.next_color());
    route.points = points;
    Ok(route)
}

/// Contiguous sub-runs of points that survive deletion. Surviving points
/// keep their identities.
fn surviving_runs(points: &[Waypoint], bounds: &BoundingBox) -> Vec<Vec<Waypoint>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for point in points {
        if bounds.contains(point.latitude, point.longitude) {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(point.clone());
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Deletes every point inside the box. Removing an interior span does not
/// stitch the neighbors together: each surviving run becomes its own
/// segment (tracks) or its own sibling route. A container left with no
/// points is dropped. The first surviving run stays under the original
/// container id; later runs get fresh container ids.
pub fn delete_points_in_box(document: &Document, bounds: &BoundingBox) -> Document {
    let mut result = document.clone();

    result
        .waypoints
        .retain(|w| !bounds.contains(w.latitude, w.longitude));

    let mut tracks = Vec::new();
    for track in &result.tracks {
        let mut segments = Vec::new();
        for segment in &track.segments {
            for (i, run) in surviving_runs(&segment.points, bounds).into_iter().enumerate() {
                segments.push(TrackSegment {
                    id: if i == 0 { segment.id } else { Uuid::new_v4() },
                    points: run,
                });
            }
        }
        if !segments.is_empty() {
            let mut kept = track.clone();
            kept.segments = segments;
            tracks.push(kept);
        }
    }
    result.tracks = tracks;

    let mut routes = Vec::new();
    for route in &result.routes {
        for (i, run) in surviving_runs(&route.points, bounds).into_iter().enumerate() {
            let mut kept = route.clone();
            if i > 0 {
                kept.id = Uuid::new_v4();
            }
            kept.points = run;
            routes.push(kept);
        }
    }
    result.routes = routes;

    result
}
