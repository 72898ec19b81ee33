#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tracklab_core::document::{Document, Track, TrackSegment, Waypoint};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn waypoint(lat: f64, lng: f64) -> Waypoint {
    Waypoint::new(lat, lng)
}

pub fn timed_waypoint(lat: f64, lng: f64, ele: f64, secs: i64) -> Waypoint {
    let mut point = Waypoint::new(lat, lng);
    point.elevation = Some(ele);
    point.time = Some(ts(secs));
    point
}

pub fn single_segment_track(points: Vec<Waypoint>) -> Track {
    let mut track = Track::new("#e6194b".to_string());
    track.segments.push(TrackSegment::new(points));
    track
}

/// Position/elevation/time/name view of every point in the document, for
/// comparisons across re-identifying transforms.
pub fn point_essence(doc: &Document) -> Vec<(f64, f64, Option<f64>, Option<i64>, Option<String>)> {
    let essence = |p: &Waypoint| {
        (
            p.latitude,
            p.longitude,
            p.elevation,
            p.time.map(|t| t.timestamp()),
            p.name.clone(),
        )
    };
    let mut out: Vec<_> = doc.waypoints.iter().map(essence).collect();
    for route in &doc.routes {
        out.extend(route.points.iter().map(essence));
    }
    for track in &doc.tracks {
        out.extend(track.points().map(essence));
    }
    out
}
