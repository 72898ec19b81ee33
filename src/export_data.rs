use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;

use crate::document::{Document, Extensions, Link, Route, Track, Waypoint};

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
pub const KML_GX_NAMESPACE: &str = "http://www.google.com/kml/ext/2.2";
pub const CREATOR: &str = "tracklab";

// Emission is deterministic: fixed element order per entity type, map
// iteration over the (ordered) extension maps, shortest-round-trip float
// formatting. Items with the visibility flag off are view-state and are
// not serialized.

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn push_tag(out: &mut String, indent: usize, tag: &str, text: &str) {
    out.push_str(&" ".repeat(indent));
    out.push_str(&format!("<{tag}>{}</{tag}>\n", escape(text)));
}

fn push_opt_tag(out: &mut String, indent: usize, tag: &str, text: &Option<String>) {
    if let Some(text) = text {
        push_tag(out, indent, tag, text);
    }
}

/// Extension entries hold whole elements captured verbatim, start tag
/// through end tag; re-emitting anything but the raw text (or escaping it
/// a second time) would corrupt them.
fn push_extensions(out: &mut String, indent: usize, extensions: &Extensions) {
    for raw in extensions.values() {
        out.push_str(&" ".repeat(indent));
        out.push_str(raw);
        out.push('\n');
    }
}

fn push_link(out: &mut String, indent: usize, link: &Option<Link>) {
    if let Some(link) = link {
        out.push_str(&" ".repeat(indent));
        out.push_str(&format!("<link href=\"{}\">\n", escape(&link.href)));
        push_opt_tag(out, indent + 2, "text", &link.text);
        push_opt_tag(out, indent + 2, "type", &link.type_);
        out.push_str(&" ".repeat(indent));
        out.push_str("</link>\n");
    }
}

fn push_gpx_point(out: &mut String, indent: usize, tag: &str, point: &Waypoint) {
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}<{tag} lat=\"{}\" lon=\"{}\">\n",
        point.latitude, point.longitude
    ));
    let inner = indent + 2;
    if let Some(elevation) = point.elevation {
        push_tag(out, inner, "ele", &elevation.to_string());
    }
    if let Some(time) = &point.time {
        push_tag(out, inner, "time", &format_time(time));
    }
    push_opt_tag(out, inner, "name", &point.name);
    push_opt_tag(out, inner, "cmt", &point.comment);
    push_opt_tag(out, inner, "desc", &point.description);
    push_opt_tag(out, inner, "src", &point.source);
    push_link(out, inner, &point.link);
    push_opt_tag(out, inner, "sym", &point.symbol);
    if let Some(fix) = point.fix {
        push_tag(out, inner, "fix", &fix.to_string());
    }
    if let Some(sat) = point.sat {
        push_tag(out, inner, "sat", &sat.to_string());
    }
    if let Some(hdop) = point.hdop {
        push_tag(out, inner, "hdop", &hdop.to_string());
    }
    if let Some(vdop) = point.vdop {
        push_tag(out, inner, "vdop", &vdop.to_string());
    }
    if let Some(pdop) = point.pdop {
        push_tag(out, inner, "pdop", &pdop.to_string());
    }
    push_extensions(out, inner, &point.extensions);
    out.push_str(&format!("{pad}</{tag}>\n"));
}

/// Serializes the document as GPX 1.1 text. The structural inverse of
/// `import_data::parse_gpx` for any document whose items are all enabled.
pub fn export_gpx(document: &Document) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<gpx xmlns=\"{GPX_NAMESPACE}\" version=\"1.1\" creator=\"{CREATOR}\">\n"
    ));

    let meta = &document.metadata;
    if *meta != Default::default() {
        out.push_str("  <metadata>\n");
        push_opt_tag(&mut out, 4, "name", &meta.name);
        push_opt_tag(&mut out, 4, "desc", &meta.description);
        if let Some(author) = &meta.author {
            out.push_str("    <author>\n");
            push_tag(&mut out, 6, "name", author);
            out.push_str("    </author>\n");
        }
        if let Some(copyright) = &meta.copyright {
            out.push_str(&format!(
                "    <copyright author=\"{}\"></copyright>\n",
                escape(copyright)
            ));
        }
        push_opt_tag(&mut out, 4, "keywords", &meta.keywords);
        if let Some(time) = &meta.time {
            push_tag(&mut out, 4, "time", &format_time(time));
        }
        if let Some(bounds) = &meta.bounds {
            if bounds.valid {
                out.push_str(&format!(
                    "    <bounds minlat=\"{}\" minlon=\"{}\" maxlat=\"{}\" maxlon=\"{}\"/>\n",
                    bounds.south, bounds.west, bounds.north, bounds.east
                ));
            }
        }
        out.push_str("  </metadata>\n");
    }

    for point in document.waypoints.iter().filter(|w| w.visible) {
        push_gpx_point(&mut out, 2, "wpt", point);
    }

    for route in document.routes.iter().filter(|r| r.visible) {
        out.push_str("  <rte>\n");
        push_opt_tag(&mut out, 4, "name", &route.name);
        push_opt_tag(&mut out, 4, "cmt", &route.comment);
        push_opt_tag(&mut out, 4, "desc", &route.description);
        push_opt_tag(&mut out, 4, "src", &route.source);
        push_link(&mut out, 4, &route.link);
        if let Some(number) = route.number {
            push_tag(&mut out, 4, "number", &number.to_string());
        }
        push_extensions(&mut out, 4, &route.extensions);
        for point in &route.points {
            push_gpx_point(&mut out, 4, "rtept", point);
        }
        out.push_str("  </rte>\n");
    }

    for track in document.tracks.iter().filter(|t| t.visible) {
        out.push_str("  <trk>\n");
        push_opt_tag(&mut out, 4, "name", &track.name);
        push_opt_tag(&mut out, 4, "cmt", &track.comment);
        push_opt_tag(&mut out, 4, "desc", &track.description);
        push_opt_tag(&mut out, 4, "src", &track.source);
        push_link(&mut out, 4, &track.link);
        if let Some(number) = track.number {
            push_tag(&mut out, 4, "number", &number.to_string());
        }
        push_extensions(&mut out, 4, &track.extensions);
        for segment in &track.segments {
            out.push_str("    <trkseg>\n");
            for point in &segment.points {
                push_gpx_point(&mut out, 6, "trkpt", point);
            }
            out.push_str("    </trkseg>\n");
        }
        out.push_str("  </trk>\n");
    }

    out.push_str("</gpx>\n");
    out
}

fn kml_coordinates(points: &[Waypoint]) -> String {
    points
        .iter()
        .map(|p| match p.elevation {
            Some(ele) => format!("{},{},{}", p.longitude, p.latitude, ele),
            None => format!("{},{}", p.longitude, p.latitude),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_line_string(out: &mut String, indent: usize, points: &[Waypoint]) {
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}<LineString>\n"));
    out.push_str(&format!(
        "{pad}  <coordinates>{}</coordinates>\n",
        kml_coordinates(points)
    ));
    out.push_str(&format!("{pad}</LineString>\n"));
}

fn push_placemark_header(out: &mut String, name: &Option<String>, description: &Option<String>) {
    out.push_str("    <Placemark>\n");
    push_opt_tag(out, 6, "name", name);
    push_opt_tag(out, 6, "description", description);
}

/// A fully timestamped single-segment track exports as gx:Track so the
/// time per position survives; everything else becomes MultiGeometry of
/// LineStrings (which reimports as a multi-segment track).
fn track_as_gx_track(track: &Track) -> Option<&[Waypoint]> {
    match track.segments.as_slice() {
        [only] if only.points.iter().all(|p| p.time.is_some()) => Some(&only.points),
        _ => None,
    }
}

/// Serializes the document as KML. Only enabled items are emitted.
pub fn export_kml(document: &Document) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<kml xmlns=\"{KML_NAMESPACE}\" xmlns:gx=\"{KML_GX_NAMESPACE}\">\n"
    ));
    out.push_str("  <Document>\n");
    push_opt_tag(&mut out, 4, "name", &document.metadata.name);
    push_opt_tag(&mut out, 4, "description", &document.metadata.description);

    for point in document.waypoints.iter().filter(|w| w.visible) {
        push_placemark_header(&mut out, &point.name, &point.description);
        out.push_str("      <Point>\n");
        out.push_str(&format!(
            "        <coordinates>{}</coordinates>\n",
            kml_coordinates(std::slice::from_ref(point))
        ));
        out.push_str("      </Point>\n");
        out.push_str("    </Placemark>\n");
    }

    for route in document.routes.iter().filter(|r| r.visible) {
        push_placemark_header(&mut out, &route.name, &route.description);
        push_line_string(&mut out, 6, &route.points);
        out.push_str("    </Placemark>\n");
    }

    for track in document.tracks.iter().filter(|t| t.visible) {
        push_placemark_header(&mut out, &track.name, &track.description);
        match track_as_gx_track(track) {
            Some(points) => {
                out.push_str("      <gx:Track>\n");
                for point in points {
                    if let Some(time) = &point.time {
                        push_tag(&mut out, 8, "when", &format_time(time));
                    }
                }
                for point in points {
                    let coord = match point.elevation {
                        Some(ele) => {
                            format!("{} {} {}", point.longitude, point.latitude, ele)
                        }
                        None => format!("{} {}", point.longitude, point.latitude),
                    };
                    push_tag(&mut out, 8, "gx:coord", &coord);
                }
                out.push_str("      </gx:Track>\n");
            }
            None => {
                out.push_str("      <MultiGeometry>\n");
                for segment in &track.segments {
                    push_line_string(&mut out, 8, &segment.points);
                }
                out.push_str("      </MultiGeometry>\n");
            }
        }
        out.push_str("    </Placemark>\n");
    }

    out.push_str("  </Document>\n");
    out.push_str("</kml>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PaletteCursor, TrackSegment};
    use chrono::TimeZone;

    #[test]
    fn escaping_and_visibility() {
        let mut doc = Document::new();
        let mut visible = Waypoint::new(45.0, -120.0);
        visible.name = Some("a <b> & \"c\"".to_string());
        doc.waypoints.push(visible);
        let mut hidden = Waypoint::new(46.0, -121.0);
        hidden.visible = false;
        doc.waypoints.push(hidden);

        let gpx = export_gpx(&doc);
        assert!(gpx.contains("a &lt;b&gt; &amp; &quot;c&quot;"));
        assert!(!gpx.contains("46"));
    }

    #[test]
    fn gx_track_only_for_fully_timestamped_single_segment() {
        let mut cursor = PaletteCursor::new();
        let mut with_time = Waypoint::new(45.0, -120.0);
        with_time.time = Some(chrono::Utc.timestamp_opt(1000, 0).unwrap());
        let without_time = Waypoint::new(45.001, -120.0);

        let mut track = crate::document::Track::new(cursor.next_color());
        track
            .segments
            .push(TrackSegment::new(vec![with_time.clone(), with_time.clone()]));
        let mut doc = Document::new();
        doc.tracks.push(track.clone());
        assert!(export_kml(&doc).contains("<gx:Track>"));

        doc.tracks[0].segments[0].points.push(without_time);
        assert!(export_kml(&doc).contains("<MultiGeometry>"));
    }

    #[test]
    fn float_formatting_keeps_precision() {
        let mut doc = Document::new();
        doc.waypoints.push(Waypoint::new(45.123456789, -120.987654321));
        let gpx = export_gpx(&doc);
        assert!(gpx.contains("lat=\"45.123456789\""));
        assert!(gpx.contains("lon=\"-120.987654321\""));
    }
}
