use tracklab_core::document::ItemRef;
use tracklab_core::store::DocumentStore;

mod test_utils;

const FIVE_POINT_TRACK: &str = r#"<gpx version="1.1">
  <trk><name>long ride</name><trkseg>
    <trkpt lat="45.0" lon="-120.0"/>
    <trkpt lat="45.1" lon="-120.1"/>
    <trkpt lat="45.2" lon="-120.2"/>
    <trkpt lat="45.3" lon="-120.3"/>
    <trkpt lat="45.4" lon="-120.4"/>
  </trkseg></trk>
</gpx>"#;

fn seeded_store() -> DocumentStore {
    test_utils::init_logging();
    let mut store = DocumentStore::new();
    store.import_gpx(FIVE_POINT_TRACK).unwrap();
    store
}

#[test]
fn undo_and_redo_restore_exact_documents() {
    let mut store = seeded_store();
    let before = store.document().clone();

    store.create_waypoint(44.0, -119.0);
    let after = store.document().clone();
    assert_ne!(before, after);

    assert!(store.undo());
    assert_eq!(store.document(), &before);
    assert!(store.can_redo());

    assert!(store.redo());
    assert_eq!(store.document(), &after);
    assert!(!store.can_redo());
}

#[test]
fn mutation_after_undo_discards_the_redo_branch() {
    let mut store = seeded_store();
    store.create_waypoint(44.0, -119.0);
    assert!(store.undo());
    assert!(store.can_redo());

    store.create_waypoint(43.0, -118.0);
    assert!(!store.can_redo());
    assert!(!store.redo());
}

#[test]
fn failed_operation_changes_nothing_and_records_nothing() {
    let mut store = seeded_store();
    let before = store.document().clone();
    let track_id = before.tracks[0].id;
    let segment_id = before.tracks[0].segments[0].id;

    // index 0 is not an interior point
    assert!(store.split_track(track_id, segment_id, 0).is_err());
    // unknown segment
    assert!(store
        .split_track(track_id, uuid::Uuid::new_v4(), 2)
        .is_err());

    assert_eq!(store.document(), &before);
    // only the import is undoable
    assert!(store.undo());
    assert!(!store.can_undo());
}

#[test]
fn history_is_bounded() {
    let mut store = DocumentStore::with_capacity(2);
    store.create_waypoint(1.0, 1.0);
    store.create_waypoint(2.0, 2.0);
    store.create_waypoint(3.0, 3.0);

    assert!(store.undo());
    assert!(store.undo());
    // the oldest snapshot was evicted
    assert!(!store.undo());
    assert_eq!(store.document().waypoints.len(), 1);
}

#[test]
fn splitting_a_five_point_track_yields_two_three_point_halves() {
    let mut store = seeded_store();
    let track_id = store.document().tracks[0].id;
    let segment_id = store.document().tracks[0].segments[0].id;

    let (first_id, second_id) = store.split_track(track_id, segment_id, 2).unwrap();

    let doc = store.document();
    assert_eq!(doc.tracks.len(), 2);
    assert_eq!(doc.tracks[0].id, first_id);
    assert_eq!(doc.tracks[1].id, second_id);
    assert_eq!(doc.tracks[0].point_count(), 3);
    assert_eq!(doc.tracks[1].point_count(), 3);
    // the split point is shared
    assert_eq!(doc.tracks[0].segments[0].points[2].latitude, 45.2);
    assert_eq!(doc.tracks[1].segments[0].points[0].latitude, 45.2);
    // both halves are new items
    assert_ne!(first_id, track_id);
    assert_ne!(second_id, track_id);

    assert!(store.undo());
    assert_eq!(store.document().tracks.len(), 1);
    assert_eq!(store.document().tracks[0].id, track_id);
}

#[test]
fn field_edits_preserve_identity() {
    let mut store = seeded_store();
    let track_id = store.document().tracks[0].id;
    let point_ids: Vec<_> = store.document().tracks[0].points().map(|p| p.id).collect();

    store
        .rename_item(ItemRef::Track(track_id), Some("renamed".to_string()))
        .unwrap();
    store.set_item_visible(ItemRef::Track(track_id), false).unwrap();
    store.reverse_track(track_id).unwrap();

    let track = store.document().track(track_id).unwrap();
    assert_eq!(track.name.as_deref(), Some("renamed"));
    assert!(!track.visible);
    let mut reversed_ids: Vec<_> = track.points().map(|p| p.id).collect();
    reversed_ids.reverse();
    assert_eq!(reversed_ids, point_ids);
}

#[test]
fn structural_edits_mint_fresh_identity() {
    let mut store = seeded_store();
    let track_id = store.document().tracks[0].id;

    let simplified_id = store.simplify_track(track_id, 0.0).unwrap();
    assert_ne!(simplified_id, track_id);
    assert!(store.document().track(track_id).is_none());

    let route_id = store.track_to_route(simplified_id).unwrap();
    assert_ne!(route_id, simplified_id);
    assert!(store.document().tracks.is_empty());
    assert_eq!(store.document().routes.len(), 1);
}

#[test]
fn route_from_waypoints_skips_unknown_ids() {
    let mut store = DocumentStore::new();
    let a = store.create_waypoint(45.0, -120.0);
    let b = store.create_waypoint(45.1, -120.1);

    let route_id = store
        .route_from_waypoints(&[a, uuid::Uuid::new_v4(), b])
        .unwrap();
    let route = store.document().route(route_id).unwrap();
    assert_eq!(route.points.len(), 2);
    // route points are copies, not moves
    assert_eq!(store.document().waypoints.len(), 2);

    // fewer than two resolvable anchors is an error
    assert!(store.route_from_waypoints(&[a]).is_err());
}

#[test]
fn deleting_the_last_segment_drops_the_track() {
    let mut store = seeded_store();
    let track_id = store.document().tracks[0].id;
    let segment_id = store.document().tracks[0].segments[0].id;

    store
        .delete_item(ItemRef::Segment {
            track: track_id,
            segment: segment_id,
        })
        .unwrap();
    assert!(store.document().tracks.is_empty());

    assert!(store.undo());
    assert_eq!(store.document().tracks.len(), 1);
}

#[test]
fn document_snapshot_survives_serde() {
    let mut store = seeded_store();
    store.create_waypoint(44.5, -119.5);

    let json = serde_json::to_string(store.document()).unwrap();
    let restored: tracklab_core::document::Document = serde_json::from_str(&json).unwrap();
    assert_eq!(&restored, store.document());
}

#[test]
fn box_deletion_splits_runs_and_is_undoable() {
    let mut store = seeded_store();
    let before = store.document().clone();

    // carve out the middle point
    let bounds = tracklab_core::geo::BoundingBox::from_points([(45.2, -120.2)]);
    store.delete_points_in_box(&bounds);

    let after = store.document().clone();
    assert_eq!(after.tracks.len(), 1);
    assert_eq!(after.tracks[0].segments.len(), 2);
    assert_eq!(after.tracks[0].segments[0].points.len(), 2);
    assert_eq!(after.tracks[0].segments[1].points.len(), 2);

    assert!(store.undo());
    assert_eq!(store.document(), &before);
    assert!(store.redo());
    assert_eq!(store.document(), &after);
}
