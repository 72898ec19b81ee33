use std::str::FromStr;

use chrono::{DateTime, Utc};
use kml::{Kml, KmlReader};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::document::{
    Document, FixKind, Link, PaletteCursor, Route, Track, TrackSegment, Waypoint,
};
use crate::errors::ParseError;
use crate::geo::BoundingBox;

/// Streaming GPX 1.1 reader. Hand-rolled on quick-xml so that child
/// elements outside the recognized field set survive verbatim in the
/// per-entity extension maps.
struct GpxParser<'a> {
    xml: &'a str,
    reader: Reader<&'a [u8]>,
}

/// Parses GPX text into a new document. The palette cursor advances once:
/// every track and route of the batch shares one color. A failed parse
/// leaves nothing behind; the caller's documents are untouched.
///
/// Tolerance is per record: a point whose lat/lon does not parse is
/// dropped with a warning, while a missing root element or broken XML
/// fails the whole call.
pub fn parse_gpx(xml: &str, palette: &mut PaletteCursor) -> Result<Document, ParseError> {
    let mut parser = GpxParser {
        xml,
        reader: Reader::from_str(xml),
    };
    parser.parse(palette.next_color())
}

impl<'a> GpxParser<'a> {
    fn parse(&mut self, batch_color: String) -> Result<Document, ParseError> {
        // the root element must be <gpx>; anything else is fatal
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"gpx" {
                        break;
                    }
                    return Err(ParseError::MissingRoot("gpx"));
                }
                // a self-closing <gpx/> is a valid, empty document
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"gpx" {
                        return Ok(Document::new());
                    }
                    return Err(ParseError::MissingRoot("gpx"));
                }
                Event::Eof => return Err(ParseError::MissingRoot("gpx")),
                _ => {}
            }
        }

        let mut document = Document::new();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"metadata" => self.parse_metadata(&mut document)?,
                    b"wpt" => {
                        if let Some(point) = self.parse_point(&e)? {
                            document.waypoints.push(point);
                        }
                    }
                    b"rte" => {
                        let route = self.parse_route(batch_color.clone())?;
                        document.routes.push(route);
                    }
                    b"trk" => {
                        let track = self.parse_track(batch_color.clone())?;
                        document.tracks.push(track);
                    }
                    _ => {
                        self.reader.read_to_end(e.name())?;
                    }
                },
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"wpt" {
                        if let Some(point) = point_from_attributes(&e) {
                            document.waypoints.push(point);
                        }
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"gpx" => break,
                Event::Eof => break,
                _ => {}
            }
        }
        info!(
            "parsed GPX: {} waypoints, {} routes, {} tracks",
            document.waypoints.len(),
            document.routes.len(),
            document.tracks.len()
        );
        Ok(document)
    }

    fn parse_metadata(&mut self, document: &mut Document) -> Result<(), ParseError> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"name" => document.metadata.name = Some(self.text(&e)?),
                    b"desc" => document.metadata.description = Some(self.text(&e)?),
                    b"keywords" => document.metadata.keywords = Some(self.text(&e)?),
                    b"time" => document.metadata.time = parse_time(&self.text(&e)?),
                    b"author" => document.metadata.author = self.parse_author(&e)?,
                    b"copyright" => {
                        document.metadata.copyright = attribute(&e, b"author");
                        self.reader.read_to_end(e.name())?;
                    }
                    _ => {
                        self.reader.read_to_end(e.name())?;
                    }
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"bounds" => document.metadata.bounds = bounds_from_attributes(&e),
                    b"copyright" => document.metadata.copyright = attribute(&e, b"author"),
                    _ => {}
                },
                Event::End(e) if e.local_name().as_ref() == b"metadata" => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    // GPX 1.1 wraps the author name: <author><name>..</name></author>
    fn parse_author(&mut self, start: &BytesStart) -> Result<Option<String>, ParseError> {
        let mut author = None;
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"name" {
                        author = Some(self.text(&e)?);
                    } else {
                        self.reader.read_to_end(e.name())?;
                    }
                }
                Event::End(e) if e.name() == start.name() => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(author)
    }

    fn parse_route(&mut self, color: String) -> Result<Route, ParseError> {
        let mut route = Route::new(color);
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"name" => route.name = Some(self.text(&e)?),
                    b"cmt" => route.comment = Some(self.text(&e)?),
                    b"desc" => route.description = Some(self.text(&e)?),
                    b"src" => route.source = Some(self.text(&e)?),
                    b"number" => route.number = self.text(&e)?.parse().ok(),
                    b"link" => route.link = Some(self.parse_link(&e)?),
                    b"rtept" => {
                        if let Some(point) = self.parse_point(&e)? {
                            route.points.push(point);
                        }
                    }
                    _ => {
                        let key = qualified_name(&e);
                        let raw = self.raw_element(&e)?;
                        route.extensions.insert(key, raw);
                    }
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"rtept" => {
                        if let Some(point) = point_from_attributes(&e) {
                            route.points.push(point);
                        }
                    }
                    b"link" => route.link = link_from_attributes(&e),
                    _ => {
                        let raw = self.raw_empty_element(&e);
                        route.extensions.insert(qualified_name(&e), raw);
                    }
                },
                Event::End(e) if e.local_name().as_ref() == b"rte" => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(route)
    }

    fn parse_track(&mut self, color: String) -> Result<Track, ParseError> {
        let mut track = Track::new(color);
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"name" => track.name = Some(self.text(&e)?),
                    b"cmt" => track.comment = Some(self.text(&e)?),
                    b"desc" => track.description = Some(self.text(&e)?),
                    b"src" => track.source = Some(self.text(&e)?),
                    b"number" => track.number = self.text(&e)?.parse().ok(),
                    b"link" => track.link = Some(self.parse_link(&e)?),
                    b"trkseg" => {
                        let segment = self.parse_segment(&e)?;
                        // empty segments are not persisted
                        if !segment.points.is_empty() {
                            track.segments.push(segment);
                        }
                    }
                    _ => {
                        let key = qualified_name(&e);
                        let raw = self.raw_element(&e)?;
                        track.extensions.insert(key, raw);
                    }
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"trkseg" => {}
                    b"link" => track.link = link_from_attributes(&e),
                    _ => {
                        let raw = self.raw_empty_element(&e);
                        track.extensions.insert(qualified_name(&e), raw);
                    }
                },
                Event::End(e) if e.local_name().as_ref() == b"trk" => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(track)
    }

    fn parse_segment(&mut self, start: &BytesStart) -> Result<TrackSegment, ParseError> {
        let mut segment = TrackSegment::new(Vec::new());
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"trkpt" {
                        if let Some(point) = self.parse_point(&e)? {
                            segment.points.push(point);
                        }
                    } else {
                        self.reader.read_to_end(e.name())?;
                    }
                }
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"trkpt" {
                        if let Some(point) = point_from_attributes(&e) {
                            segment.points.push(point);
                        }
                    }
                }
                Event::End(e) if e.name() == start.name() => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(segment)
    }

    /// Parses a wpt/rtept/trkpt element and its children. Returns None
    /// (after skipping the subtree) when the coordinates do not parse.
    fn parse_point(&mut self, start: &BytesStart) -> Result<Option<Waypoint>, ParseError> {
        let mut point = match point_from_attributes(start) {
            Some(point) => point,
            None => {
                self.reader.read_to_end(start.name())?;
                return Ok(None);
            }
        };

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"ele" => point.elevation = self.text(&e)?.parse().ok(),
                    b"time" => point.time = parse_time(&self.text(&e)?),
                    b"name" => point.name = Some(self.text(&e)?),
                    b"cmt" => point.comment = Some(self.text(&e)?),
                    b"desc" => point.description = Some(self.text(&e)?),
                    b"src" => point.source = Some(self.text(&e)?),
                    b"sym" => point.symbol = Some(self.text(&e)?),
                    b"link" => point.link = Some(self.parse_link(&e)?),
                    b"sat" => point.sat = self.text(&e)?.parse().ok(),
                    b"hdop" => point.hdop = self.text(&e)?.parse().ok(),
                    b"vdop" => point.vdop = self.text(&e)?.parse().ok(),
                    b"pdop" => point.pdop = self.text(&e)?.parse().ok(),
                    b"fix" => point.fix = FixKind::from_str(&self.text(&e)?).ok(),
                    _ => {
                        let key = qualified_name(&e);
                        let raw = self.raw_element(&e)?;
                        point.extensions.insert(key, raw);
                    }
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"link" => point.link = link_from_attributes(&e),
                    _ => {
                        let raw = self.raw_empty_element(&e);
                        point.extensions.insert(qualified_name(&e), raw);
                    }
                },
                Event::End(e) if e.name() == start.name() => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Some(point))
    }

    fn parse_link(&mut self, start: &BytesStart) -> Result<Link, ParseError> {
        let mut link = Link {
            href: attribute(start, b"href").unwrap_or_default(),
            text: None,
            type_: None,
        };
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"text" => link.text = Some(self.text(&e)?),
                    b"type" => link.type_ = Some(self.text(&e)?),
                    _ => {
                        self.reader.read_to_end(e.name())?;
                    }
                },
                Event::End(e) if e.name() == start.name() => break,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(link)
    }

    /// Text content of the current element with entity references
    /// resolved, so `a &amp; b` on the wire becomes `a & b` in the model.
    fn text(&mut self, start: &BytesStart) -> Result<String, ParseError> {
        let text = self.reader.read_text(start.name())?;
        match unescape(&text) {
            Ok(unescaped) => Ok(unescaped.trim().to_string()),
            Err(_) => {
                warn!("keeping text with unresolvable entity reference verbatim");
                Ok(text.trim().to_string())
            }
        }
    }

    /// Verbatim text of an unrecognized element, start tag through end
    /// tag, sliced straight out of the input so attributes and nested
    /// markup round-trip untouched.
    fn raw_element(&mut self, start: &BytesStart) -> Result<String, ParseError> {
        let from = self.reader.buffer_position() as usize - start.len() - 2;
        self.reader.read_to_end(start.name())?;
        let to = self.reader.buffer_position() as usize;
        Ok(self.xml[from..to].to_string())
    }

    /// Same capture for a self-closing unrecognized element.
    fn raw_empty_element(&self, e: &BytesStart) -> String {
        let to = self.reader.buffer_position() as usize;
        let from = to - e.len() - 3;
        self.xml[from..to].to_string()
    }
}

fn qualified_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == key {
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            Some(match unescape(&raw) {
                Ok(value) => value.into_owned(),
                Err(_) => raw,
            })
        } else {
            None
        }
    })
}

/// Builds a waypoint from lat/lon attributes, or None when either is
/// missing or non-numeric (the record-skip case).
fn point_from_attributes(e: &BytesStart) -> Option<Waypoint> {
    let lat = attribute(e, b"lat").and_then(|v| v.parse::<f64>().ok());
    let lon = attribute(e, b"lon").and_then(|v| v.parse::<f64>().ok());
    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Waypoint::new(lat, lon)),
        _ => {
            warn!("skipping <{}> with unparseable coordinates", qualified_name(e));
            None
        }
    }
}

fn link_from_attributes(e: &BytesStart) -> Option<Link> {
    attribute(e, b"href").map(|href| Link {
        href,
        text: None,
        type_: None,
    })
}

fn bounds_from_attributes(e: &BytesStart) -> Option<BoundingBox> {
    let get = |key: &[u8]| attribute(e, key).and_then(|v| v.parse::<f64>().ok());
    Some(BoundingBox {
        south: get(b"minlat")?,
        west: get(b"minlon")?,
        north: get(b"maxlat")?,
        east: get(b"maxlon")?,
        valid: true,
    })
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(text) {
        Ok(time) => Some(time.with_timezone(&Utc)),
        Err(_) => {
            warn!("ignoring unparseable timestamp {text:?}");
            None
        }
    }
}

/// Parses the practical KML subset: Placemark with Point, LineString,
/// gx:Track (paired when/gx:coord lists) and MultiGeometry of
/// LineStrings. KML carries no per-feature color in this mapping, so the
/// batch color comes from the palette cursor.
pub fn parse_kml(text: &str, palette: &mut PaletteCursor) -> Result<Document, ParseError> {
    let kml = KmlReader::<&[u8], f64>::from_reader(text.as_bytes()).read()?;
    let batch_color = palette.next_color();

    let mut document = Document::new();
    for item in flatten_kml(vec![kml]) {
        let placemark = match item {
            Kml::Placemark(p) => p,
            _ => continue,
        };

        let name = placemark.name.clone();
        let description = placemark.description.clone();

        match &placemark.geometry {
            Some(kml::types::Geometry::Point(point)) => {
                let mut waypoint = Waypoint::new(point.coord.y, point.coord.x);
                waypoint.elevation = point.coord.z;
                waypoint.name = name;
                waypoint.description = description;
                document.waypoints.push(waypoint);
                continue;
            }
            Some(kml::types::Geometry::LineString(line)) => {
                let mut route = Route::new(batch_color.clone());
                route.name = name;
                route.description = description;
                route.points = line
                    .coords
                    .iter()
                    .map(|coord| {
                        let mut p = Waypoint::new(coord.y, coord.x);
                        p.elevation = coord.z;
                        p
                    })
                    .collect();
                document.routes.push(route);
                continue;
            }
            Some(kml::types::Geometry::MultiGeometry(multi)) => {
                let mut track = Track::new(batch_color.clone());
                track.name = name;
                track.description = description;
                for geometry in &multi.geometries {
                    if let kml::types::Geometry::LineString(line) = geometry {
                        let points = line
                            .coords
                            .iter()
                            .map(|coord| {
                                let mut p = Waypoint::new(coord.y, coord.x);
                                p.elevation = coord.z;
                                p
                            })
                            .collect::<Vec<_>>();
                        if !points.is_empty() {
                            track.segments.push(TrackSegment::new(points));
                        }
                    }
                }
                if !track.segments.is_empty() {
                    document.tracks.push(track);
                }
                continue;
            }
            _ => {}
        }

        // gx:Track is not modeled by the kml crate; it shows up as a
        // generic child element named "Track".
        for element in placemark
            .children
            .iter()
            .filter(|e| e.name == "Track")
        {
            let mut whens = Vec::new();
            let mut coords = Vec::new();
            for child in &element.children {
                if child.name == "when" {
                    whens.push(child.content.clone());
                } else if child.name == "coord" {
                    coords.push(child.content.clone());
                }
            }

            let mut points = Vec::new();
            for (when, coord) in whens.iter().zip(coords.iter()) {
                let parts: Vec<&str> = match coord {
                    Some(coord) => coord.split_whitespace().collect(),
                    None => continue,
                };
                let (lng, lat) = match (
                    parts.first().and_then(|v| v.parse::<f64>().ok()),
                    parts.get(1).and_then(|v| v.parse::<f64>().ok()),
                ) {
                    (Some(lng), Some(lat)) => (lng, lat),
                    _ => {
                        warn!("skipping gx:coord with unparseable value {coord:?}");
                        continue;
                    }
                };
                let mut point = Waypoint::new(lat, lng);
                point.elevation = parts.get(2).and_then(|v| v.parse().ok());
                point.time = when.as_deref().and_then(parse_time);
                points.push(point);
            }

            if !points.is_empty() {
                let mut track = Track::new(batch_color.clone());
                track.name = name.clone();
                track.description = description.clone();
                track.segments.push(TrackSegment::new(points));
                document.tracks.push(track);
            }
        }
    }

    info!(
        "parsed KML: {} waypoints, {} routes, {} tracks",
        document.waypoints.len(),
        document.routes.len(),
        document.tracks.len()
    );
    Ok(document)
}

fn flatten_kml(kml: Vec<Kml>) -> Vec<Kml> {
    kml.into_iter()
        .flat_map(|k| match k {
            Kml::KmlDocument(d) => flatten_kml(d.elements),
            Kml::Document { attrs: _, elements } => flatten_kml(elements),
            Kml::Folder { attrs: _, elements } => flatten_kml(elements),
            k => vec![k],
        })
        .collect()
}
