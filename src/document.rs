use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::geo::BoundingBox;

/// Map of unrecognized child elements, tag name → the whole element
/// verbatim (start tag through end tag, attributes included). Ordered so
/// export stays deterministic.
pub type Extensions = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: Option<String>,
    pub type_: Option<String>,
}

/// GPS fix classification, spelled the way GPX 1.1 spells it on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum FixKind {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "2d")]
    TwoD,
    #[strum(serialize = "3d")]
    ThreeD,
    #[strum(serialize = "dgps")]
    Dgps,
    #[strum(serialize = "pps")]
    Pps,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub symbol: Option<String>,
    pub link: Option<Link>,
    pub sat: Option<u32>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub pdop: Option<f64>,
    pub fix: Option<FixKind>,
    pub extensions: Extensions,
    pub visible: bool,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Waypoint {
            id: Uuid::new_v4(),
            latitude,
            longitude,
            elevation: None,
            time: None,
            name: None,
            comment: None,
            description: None,
            source: None,
            symbol: None,
            link: None,
            sat: None,
            hdop: None,
            vdop: None,
            pdop: None,
            fix: None,
            extensions: Extensions::new(),
            visible: true,
        }
    }

    /// Deep copy carrying every field except the identity. Structural
    /// edits (split/join/convert/simplify/paste) go through this.
    pub fn with_fresh_id(&self) -> Waypoint {
        Waypoint {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// A contiguous recording run, owned exclusively by one track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub id: Uuid,
    pub points: Vec<Waypoint>,
}

impl TrackSegment {
    pub fn new(points: Vec<Waypoint>) -> Self {
        TrackSegment {
            id: Uuid::new_v4(),
            points,
        }
    }

    pub fn with_fresh_ids(&self) -> TrackSegment {
        TrackSegment {
            id: Uuid::new_v4(),
            points: self.points.iter().map(Waypoint::with_fresh_id).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub link: Option<Link>,
    pub number: Option<u32>,
    pub color: String,
    pub visible: bool,
    pub expanded: bool,
    pub extensions: Extensions,
    pub segments: Vec<TrackSegment>,
}

impl Track {
    pub fn new(color: String) -> Self {
        Track {
            id: Uuid::new_v4(),
            name: None,
            comment: None,
            description: None,
            source: None,
            link: None,
            number: None,
            color,
            visible: true,
            expanded: true,
            extensions: Extensions::new(),
            segments: Vec::new(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }

    /// All points in path order, ignoring segment boundaries.
    pub fn points(&self) -> impl Iterator<Item = &Waypoint> {
        self.segments.iter().flat_map(|s| s.points.iter())
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.points().map(|p| (p.latitude, p.longitude)))
    }
}

/// A planned path: one ordered point run, no segment breaks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub link: Option<Link>,
    pub number: Option<u32>,
    pub color: String,
    pub visible: bool,
    pub expanded: bool,
    pub extensions: Extensions,
    pub points: Vec<Waypoint>,
}

impl Route {
    pub fn new(color: String) -> Self {
        Route {
            id: Uuid::new_v4(),
            name: None,
            comment: None,
            description: None,
            source: None,
            link: None,
            number: None,
            color,
            visible: true,
            expanded: true,
            extensions: Extensions::new(),
            points: Vec::new(),
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.points.iter().map(|p| (p.latitude, p.longitude)))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub copyright: Option<String>,
    pub keywords: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub bounds: Option<BoundingBox>,
}

/// The whole editable state. Owns its top-level collections exclusively;
/// no waypoint instance is shared between containers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub waypoints: Vec<Waypoint>,
    pub routes: Vec<Route>,
    pub tracks: Vec<Track>,
    pub modified: bool,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty() && self.routes.is_empty() && self.tracks.is_empty()
    }

    pub fn track(&self, id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn route(&self, id: Uuid) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn waypoint(&self, id: Uuid) -> Option<&Waypoint> {
        self.waypoints.iter().find(|w| w.id == id)
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::from_points(
            self.waypoints.iter().map(|w| (w.latitude, w.longitude)),
        );
        for route in &self.routes {
            bounds = BoundingBox::merge(&bounds, &route.bounds());
        }
        for track in &self.tracks {
            bounds = BoundingBox::merge(&bounds, &track.bounds());
        }
        bounds
    }
}

/// Addresses one selectable item. Every consumer matches exhaustively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemRef {
    Waypoint(Uuid),
    Route(Uuid),
    Track(Uuid),
    Segment { track: Uuid, segment: Uuid },
}

pub const TRACK_PALETTE: [&str; 10] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#9a6324",
    "#808000", "#000075",
];

/// Explicit palette position, threaded through import and creation calls
/// instead of living in a process-wide global. Cycles on overflow.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteCursor(usize);

impl PaletteCursor {
    pub fn new() -> Self {
        PaletteCursor(0)
    }

    pub fn peek(&self) -> String {
        TRACK_PALETTE[self.0 % TRACK_PALETTE.len()].to_string()
    }

    pub fn next_color(&mut self) -> String {
        let color = self.peek();
        self.0 += 1;
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn fresh_id_keeps_fields() {
        let mut point = Waypoint::new(45.0, -120.0);
        point.name = Some("summit".to_string());
        point.elevation = Some(1200.0);
        let copy = point.with_fresh_id();
        assert_ne!(copy.id, point.id);
        assert_eq!(copy.name, point.name);
        assert_eq!(copy.elevation, point.elevation);
        assert_eq!(copy.latitude, point.latitude);
    }

    #[test]
    fn palette_cycles() {
        let mut cursor = PaletteCursor::new();
        let first = cursor.next_color();
        for _ in 1..TRACK_PALETTE.len() {
            cursor.next_color();
        }
        assert_eq!(cursor.next_color(), first);
    }

    #[test]
    fn fix_kind_wire_spellings() {
        assert_eq!(FixKind::from_str("3d").unwrap(), FixKind::ThreeD);
        assert_eq!(FixKind::ThreeD.to_string(), "3d");
        assert_eq!(FixKind::from_str("dgps").unwrap(), FixKind::Dgps);
        assert!(FixKind::from_str("4d").is_err());
    }

    #[test]
    fn document_bounds_cover_everything() {
        let mut doc = Document::new();
        doc.waypoints.push(Waypoint::new(10.0, 10.0));
        let mut track = Track::new("#e6194b".to_string());
        track
            .segments
            .push(TrackSegment::new(vec![Waypoint::new(-5.0, 40.0)]));
        doc.tracks.push(track);
        let bounds = doc.bounds();
        assert!(bounds.contains(10.0, 10.0));
        assert!(bounds.contains(-5.0, 40.0));
        assert!(!bounds.contains(50.0, 50.0));
    }
}
