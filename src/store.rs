use uuid::Uuid;

use crate::document::{Document, ItemRef, PaletteCursor, Waypoint};
use crate::errors::{EngineError, ValidationError};
use crate::export_data;
use crate::history::{History, DEFAULT_CAPACITY};
use crate::import_data;
use crate::operations;
use crate::simplify;
use crate::statistics::{self, Statistics};

/// Owns the document, its undo/redo history and the palette cursor, and
/// runs every mutation atomically: the pre-mutation snapshot is taken
/// first, and a failing operation restores it, so no partial mutation is
/// ever observable.
pub struct DocumentStore {
    document: Document,
    history: History,
    palette: PaletteCursor,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(history_capacity: usize) -> Self {
        DocumentStore {
            document: Document::new(),
            history: History::new(history_capacity),
            palette: PaletteCursor::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut Document, &mut PaletteCursor) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let snapshot = self.document.clone();
        let palette_before = self.palette;
        match f(&mut self.document, &mut self.palette) {
            Ok(value) => {
                self.history.push(snapshot);
                self.document.modified = true;
                Ok(value)
            }
            Err(e) => {
                self.document = snapshot;
                self.palette = palette_before;
                Err(e)
            }
        }
    }

    /// Snapshot-then-apply for mutations that cannot fail.
    fn mutate_ok<T>(&mut self, f: impl FnOnce(&mut Document, &mut PaletteCursor) -> T) -> T {
        let snapshot = self.document.clone();
        let value = f(&mut self.document, &mut self.palette);
        self.history.push(snapshot);
        self.document.modified = true;
        value
    }

    // ---- import / export ----

    /// Parses GPX text and appends its contents to the document. A parse
    /// failure leaves document, history and palette untouched.
    pub fn import_gpx(&mut self, xml: &str) -> Result<(), EngineError> {
        self.mutate(|document, palette| {
            let parsed = import_data::parse_gpx(xml, palette)?;
            merge_import(document, parsed);
            Ok(())
        })
    }

    pub fn import_kml(&mut self, text: &str) -> Result<(), EngineError> {
        self.mutate(|document, palette| {
            let parsed = import_data::parse_kml(text, palette)?;
            merge_import(document, parsed);
            Ok(())
        })
    }

    pub fn export_gpx(&self) -> String {
        export_data::export_gpx(&self.document)
    }

    pub fn export_kml(&self) -> String {
        export_data::export_kml(&self.document)
    }

    // ---- creation ----

    pub fn create_waypoint(&mut self, latitude: f64, longitude: f64) -> Uuid {
        self.mutate_ok(|document, _| {
            let point = Waypoint::new(latitude, longitude);
            let id = point.id;
            document.waypoints.push(point);
            id
        })
    }

    pub fn route_from_waypoints(&mut self, ids: &[Uuid]) -> Result<Uuid, EngineError> {
        self.mutate(|document, palette| {
            let route = operations::route_from_waypoints(document, ids, palette)?;
            let id = route.id;
            document.routes.push(route);
            Ok(id)
        })
    }

    // ---- structural track/route operations ----

    /// Replaces the track with its two halves, in place. Returns the new
    /// track ids.
    pub fn split_track(
        &mut self,
        track_id: Uuid,
        segment_id: Uuid,
        point_index: usize,
    ) -> Result<(Uuid, Uuid), EngineError> {
        self.mutate(|document, _| {
            let position = track_position(document, track_id)?;
            let (first, second) =
                operations::split_track(&document.tracks[position], segment_id, point_index)?;
            let ids = (first.id, second.id);
            document.tracks[position] = first;
            document.tracks.insert(position + 1, second);
            Ok(ids)
        })
    }

    /// Replaces the first track with the join and removes the second.
    pub fn join_tracks(&mut self, first_id: Uuid, second_id: Uuid) -> Result<Uuid, EngineError> {
        self.mutate(|document, _| {
            let first_position = track_position(document, first_id)?;
            let second_position = track_position(document, second_id)?;
            let joined =
                operations::join_tracks(&document.tracks[first_position], &document.tracks[second_position]);
            let id = joined.id;
            document.tracks[first_position] = joined;
            document.tracks.retain(|t| t.id != second_id);
            Ok(id)
        })
    }

    pub fn reverse_track(&mut self, track_id: Uuid) -> Result<(), EngineError> {
        self.mutate(|document, _| {
            let position = track_position(document, track_id)?;
            document.tracks[position] = operations::reverse_track(&document.tracks[position]);
            Ok(())
        })
    }

    pub fn merge_track_segments(&mut self, track_id: Uuid) -> Result<Uuid, EngineError> {
        self.mutate(|document, _| {
            let position = track_position(document, track_id)?;
            let merged = operations::merge_segments(&document.tracks[position]);
            let id = merged.id;
            document.tracks[position] = merged;
            Ok(id)
        })
    }

    /// Converts a route into a track, removing the route.
    pub fn route_to_track(&mut self, route_id: Uuid) -> Result<Uuid, EngineError> {
        self.mutate(|document, _| {
            let position = route_position(document, route_id)?;
            let track = operations::route_to_track(&document.routes[position]);
            let id = track.id;
            document.routes.remove(position);
            document.tracks.push(track);
            Ok(id)
        })
    }

    /// Converts a track into a route, removing the track. Segment
    /// boundaries are flattened and cannot be recovered.
    pub fn track_to_route(&mut self, track_id: Uuid) -> Result<Uuid, EngineError> {
        self.mutate(|document, _| {
            let position = track_position(document, track_id)?;
            let route = operations::track_to_route(&document.tracks[position]);
            let id = route.id;
            document.tracks.remove(position);
            document.routes.push(route);
            Ok(id)
        })
    }

    pub fn simplify_track(&mut self, track_id: Uuid, tolerance: f64) -> Result<Uuid, EngineError> {
        self.mutate(|document, _| {
            let position = track_position(document, track_id)?;
            let simplified = simplify::simplify_track(&document.tracks[position], tolerance);
            let id = simplified.id;
            document.tracks[position] = simplified;
            Ok(id)
        })
    }

    pub fn simplify_route(&mut self, route_id: Uuid, tolerance: f64) -> Result<Uuid, EngineError> {
        self.mutate(|document, _| {
            let position = route_position(document, route_id)?;
            let simplified = simplify::simplify_route(&document.routes[position], tolerance);
            let id = simplified.id;
            document.routes[position] = simplified;
            Ok(id)
        })
    }

    pub fn delete_points_in_box(&mut self, bounds: &crate::geo::BoundingBox) {
        let bounds = *bounds;
        self.mutate_ok(|document, _| {
            *document = operations::delete_points_in_box(document, &bounds);
        });
    }

    // ---- item-addressed edits ----

    /// Deletes one item. Deleting a container cascades to everything it
    /// owns; deleting the last segment drops its track.
    pub fn delete_item(&mut self, item: ItemRef) -> Result<(), EngineError> {
        self.mutate(|document, _| match item {
            ItemRef::Waypoint(id) => {
                if document.waypoint(id).is_none() {
                    return Err(ValidationError::UnknownItem(id).into());
                }
                document.waypoints.retain(|w| w.id != id);
                Ok(())
            }
            ItemRef::Route(id) => {
                if document.route(id).is_none() {
                    return Err(ValidationError::UnknownItem(id).into());
                }
                document.routes.retain(|r| r.id != id);
                Ok(())
            }
            ItemRef::Track(id) => {
                if document.track(id).is_none() {
                    return Err(ValidationError::UnknownItem(id).into());
                }
                document.tracks.retain(|t| t.id != id);
                Ok(())
            }
            ItemRef::Segment { track, segment } => {
                let position = track_position(document, track)?;
                let segments = &mut document.tracks[position].segments;
                let before = segments.len();
                segments.retain(|s| s.id != segment);
                if segments.len() == before {
                    return Err(ValidationError::UnknownItem(segment).into());
                }
                if segments.is_empty() {
                    document.tracks.remove(position);
                }
                Ok(())
            }
        })
    }

    /// Field-only edit: every identifier is preserved.
    pub fn rename_item(&mut self, item: ItemRef, name: Option<String>) -> Result<(), EngineError> {
        self.mutate(|document, _| match item {
            ItemRef::Waypoint(id) => {
                let point = document
                    .waypoints
                    .iter_mut()
                    .find(|w| w.id == id)
                    .ok_or(ValidationError::UnknownItem(id))?;
                point.name = name;
                Ok(())
            }
            ItemRef::Route(id) => {
                let route = document
                    .routes
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or(ValidationError::UnknownItem(id))?;
                route.name = name;
                Ok(())
            }
            ItemRef::Track(id) => {
                let track = document
                    .tracks
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or(ValidationError::UnknownItem(id))?;
                track.name = name;
                Ok(())
            }
            // segments carry no name
            ItemRef::Segment { segment, .. } => Err(ValidationError::UnknownItem(segment).into()),
        })
    }

    /// Field-only edit: identifiers are preserved. Disabled items stay in
    /// the document but are excluded from export.
    pub fn set_item_visible(&mut self, item: ItemRef, visible: bool) -> Result<(), EngineError> {
        self.mutate(|document, _| match item {
            ItemRef::Waypoint(id) => {
                let point = document
                    .waypoints
                    .iter_mut()
                    .find(|w| w.id == id)
                    .ok_or(ValidationError::UnknownItem(id))?;
                point.visible = visible;
                Ok(())
            }
            ItemRef::Route(id) => {
                let route = document
                    .routes
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or(ValidationError::UnknownItem(id))?;
                route.visible = visible;
                Ok(())
            }
            ItemRef::Track(id) => {
                let track = document
                    .tracks
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or(ValidationError::UnknownItem(id))?;
                track.visible = visible;
                Ok(())
            }
            ItemRef::Segment { track, segment } => {
                let position = track_position(document, track)?;
                let seg = document.tracks[position]
                    .segments
                    .iter_mut()
                    .find(|s| s.id == segment)
                    .ok_or(ValidationError::UnknownItem(segment))?;
                for point in &mut seg.points {
                    point.visible = visible;
                }
                Ok(())
            }
        })
    }

    // ---- history ----

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.document.clone()) {
            Some(previous) => {
                self.document = previous;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.document.clone()) {
            Some(next) => {
                self.document = next;
                true
            }
            None => false,
        }
    }

    // ---- derived data ----

    pub fn track_statistics(&self, track_id: Uuid) -> Result<Statistics, EngineError> {
        let track = self
            .document
            .track(track_id)
            .ok_or(ValidationError::UnknownItem(track_id))?;
        Ok(statistics::track_statistics(track))
    }

    pub fn route_statistics(&self, route_id: Uuid) -> Result<Statistics, EngineError> {
        let route = self
            .document
            .route(route_id)
            .ok_or(ValidationError::UnknownItem(route_id))?;
        Ok(statistics::route_statistics(route))
    }
}

fn track_position(document: &Document, id: Uuid) -> Result<usize, ValidationError> {
    document
        .tracks
        .iter()
        .position(|t| t.id == id)
        .ok_or(ValidationError::UnknownItem(id))
}

fn route_position(document: &Document, id: Uuid) -> Result<usize, ValidationError> {
    document
        .routes
        .iter()
        .position(|r| r.id == id)
        .ok_or(ValidationError::UnknownItem(id))
}

/// Appends an imported batch. Document metadata is adopted only when the
/// target is still empty, so importing into existing work never clobbers
/// its header.
fn merge_import(document: &mut Document, parsed: Document) {
    if document.is_empty() && document.metadata == Default::default() {
        document.metadata = parsed.metadata;
    }
    document.waypoints.extend(parsed.waypoints);
    document.routes.extend(parsed.routes);
    document.tracks.extend(parsed.tracks);
}
