use mixlane_core::{
    EffectKind, EffectPatch, MixConfig, MixSession, NewEffect, NewTrack,
    OfflineBackend, StageDescriptor, TrackKind,
};
use uuid::Uuid;

fn live_session() -> MixSession {
    let mut session = MixSession::new(MixConfig::default());
    session
        .initialize(&mut OfflineBackend)
        .expect("offline backend should open");
    session
}

fn effect_kinds(session: &MixSession, track_id: Uuid) -> Vec<EffectKind> {
    session
        .signal_path(track_id)
        .expect("track should have a graph")
        .into_iter()
        .filter_map(|stage| match stage {
            StageDescriptor::Effect { kind, .. } => Some(kind),
            _ => None,
        })
        .collect()
}

fn gain_linear(session: &MixSession, track_id: Uuid) -> f32 {
    session
        .signal_path(track_id)
        .expect("track should have a graph")
        .into_iter()
        .find_map(|stage| match stage {
            StageDescriptor::Gain { linear } => Some(linear),
            _ => None,
        })
        .expect("gain stage should exist")
}

#[test]
fn reordering_effects_rewires_the_chain() {
    let mut session = live_session();
    let track_id = session.add_track(NewTrack::named("Voice", TrackKind::Voice));
    let eq = session
        .add_effect(track_id, NewEffect::new(EffectKind::Eq))
        .expect("eq added");
    let delay = session
        .add_effect(track_id, NewEffect::new(EffectKind::Delay))
        .expect("delay added");

    assert_eq!(
        effect_kinds(&session, track_id),
        vec![EffectKind::Eq, EffectKind::Delay]
    );

    assert!(session.reorder_effects(track_id, &[delay, eq]));
    assert_eq!(
        effect_kinds(&session, track_id),
        vec![EffectKind::Delay, EffectKind::Eq]
    );
    let track = session.track(track_id).expect("track exists");
    assert_eq!(track.effects[0].id, delay);
    assert_eq!(track.effects[0].order, 0);
}

#[test]
fn unsupported_and_disabled_effects_are_bypassed() {
    let mut session = live_session();
    let track_id = session.add_track(NewTrack::named("Music", TrackKind::Music));
    session.add_effect(track_id, NewEffect::new(EffectKind::Reverb));
    let tremolo = session
        .add_effect(track_id, NewEffect::new(EffectKind::Tremolo))
        .expect("tremolo added");

    assert_eq!(effect_kinds(&session, track_id), vec![EffectKind::Tremolo]);
    assert_eq!(session.track(track_id).expect("track").effects.len(), 2);

    session
        .update_effect(
            track_id,
            tremolo,
            EffectPatch {
                enabled: Some(false),
                ..EffectPatch::default()
            },
        )
        .expect("tremolo updated");
    assert!(effect_kinds(&session, track_id).is_empty());
}

#[test]
fn gain_effect_reports_linear_factor() {
    let mut session = live_session();
    let track_id = session.add_track(NewTrack::named("Lead", TrackKind::Voice));
    session.add_effect(
        track_id,
        NewEffect::new(EffectKind::Gain).with_param("gainDb", 6.0),
    );

    let linear = session
        .signal_path(track_id)
        .expect("graph")
        .into_iter()
        .find_map(|stage| match stage {
            StageDescriptor::Effect { linear_gain, .. } => linear_gain,
            _ => None,
        })
        .expect("gain effect reports a factor");
    assert!((linear - 1.995).abs() < 1e-3);
}

#[test]
fn soloing_one_track_silences_the_rest() {
    let mut session = live_session();
    let ids: Vec<Uuid> = ["A", "B", "C"]
        .into_iter()
        .map(|name| session.add_track(NewTrack::named(name, TrackKind::Sfx)))
        .collect();

    assert!(session.set_track_solo(ids[1], true));

    assert_eq!(gain_linear(&session, ids[0]), 0.0);
    assert_eq!(gain_linear(&session, ids[1]), 1.0);
    assert_eq!(gain_linear(&session, ids[2]), 0.0);

    assert!(session.set_track_solo(ids[1], false));
    assert!(ids.iter().all(|id| gain_linear(&session, *id) == 1.0));
}

#[test]
fn effect_events_follow_chain_edits() {
    let mut session = live_session();
    let track_id = session.add_track(NewTrack::named("Bed", TrackKind::Ambient));
    let events = session.subscribe();

    let effect_id = session
        .add_effect(
            track_id,
            NewEffect::new(EffectKind::Filter).with_param("filterType", "highpass"),
        )
        .expect("filter added");
    assert!(session.remove_effect(track_id, effect_id));
    assert!(!session.remove_effect(track_id, effect_id));

    let names: Vec<&str> = events.try_iter().map(|event| event.name()).collect();
    assert_eq!(names, vec!["effect:added", "effect:removed"]);
    assert!(
        session
            .add_effect(Uuid::new_v4(), NewEffect::new(EffectKind::Gain))
            .is_none()
    );
    assert!(events.try_recv().is_err());
}
