use mixlane_core::{
    MixConfig, MixEvent, MixSession, NewTrack, OfflineBackend, TrackKind, TrackPatch,
};
use uuid::Uuid;

fn session_with_tracks(names: &[&str]) -> (MixSession, Vec<Uuid>) {
    let mut session = MixSession::new(MixConfig::default());
    session
        .initialize(&mut OfflineBackend)
        .expect("offline backend should open");
    let ids = names
        .iter()
        .map(|name| session.add_track(NewTrack::named(*name, TrackKind::Music)))
        .collect();
    (session, ids)
}

#[test]
fn removing_middle_track_renumbers_order() {
    let (mut session, ids) = session_with_tracks(&["Intro", "Voice", "Outro"]);

    assert!(session.remove_track(ids[1]));

    let remaining: Vec<(Uuid, usize)> = session
        .tracks()
        .iter()
        .map(|track| (track.id, track.order))
        .collect();
    assert_eq!(remaining, vec![(ids[0], 0), (ids[2], 1)]);
    assert!(session.signal_path(ids[1]).is_none());
}

#[test]
fn unknown_ids_are_ignored() {
    let (mut session, _ids) = session_with_tracks(&["Only"]);
    let stranger = Uuid::new_v4();

    assert!(!session.remove_track(stranger));
    assert!(session.update_track(stranger, TrackPatch::default()).is_none());
    assert!(!session.set_track_volume(stranger, 0.5));
    assert!(session.duplicate_track(stranger).is_none());
    assert_eq!(session.tracks().len(), 1);
}

#[test]
fn duplicate_copies_fields_with_fresh_identity() {
    let mut session = MixSession::new(MixConfig::default());
    let original = session.add_track(NewTrack {
        volume: 0.4,
        pan: -0.5,
        start_time: 2.0,
        duration: 3.0,
        ..NewTrack::named("Bed", TrackKind::Ambient)
    });

    let copy = session
        .duplicate_track(original)
        .expect("known track should duplicate");

    let source = session.track(original).expect("original exists");
    let duplicate = session.track(copy).expect("copy exists");
    assert_ne!(copy, original);
    assert_eq!(duplicate.order, 1);
    assert_eq!(duplicate.volume, source.volume);
    assert_eq!(duplicate.pan, source.pan);
    assert_eq!(duplicate.start_time, source.start_time);
    assert_eq!(duplicate.kind, TrackKind::Ambient);
    assert_eq!(session.total_duration(), 5.0);
}

#[test]
fn track_updates_clamp_values_and_emit_events() {
    let (mut session, ids) = session_with_tracks(&["Lead"]);
    let events = session.subscribe();

    let updated = session
        .update_track(
            ids[0],
            TrackPatch {
                volume: Some(3.0),
                pan: Some(-4.0),
                ..TrackPatch::default()
            },
        )
        .expect("update should apply");

    assert_eq!(updated.volume, 1.0);
    assert_eq!(updated.pan, -1.0);
    match events.try_recv().expect("update event") {
        MixEvent::TrackUpdated { track } => assert_eq!(track.id, ids[0]),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn reorder_requires_full_permutation() {
    let (mut session, ids) = session_with_tracks(&["A", "B", "C"]);

    assert!(!session.reorder_tracks(&[ids[2], ids[0]]));
    assert!(!session.reorder_tracks(&[ids[2], ids[2], ids[0]]));
    assert!(session.reorder_tracks(&[ids[2], ids[0], ids[1]]));

    let ordered: Vec<Uuid> = session.tracks().iter().map(|track| track.id).collect();
    assert_eq!(ordered, vec![ids[2], ids[0], ids[1]]);
    assert!(
        session
            .tracks()
            .iter()
            .enumerate()
            .all(|(index, track)| track.order == index)
    );
}

#[test]
fn edits_before_initialize_are_wired_on_init() {
    let mut session = MixSession::new(MixConfig::default());
    let track_id = session.add_track(NewTrack::named("Early", TrackKind::Voice));
    assert!(session.signal_path(track_id).is_none());

    session
        .initialize(&mut OfflineBackend)
        .expect("offline backend should open");

    assert!(session.is_initialized());
    assert!(session.signal_path(track_id).is_some());
}
