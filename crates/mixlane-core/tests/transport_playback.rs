use mixlane_core::{
    DecodedAudio, MixConfig, MixEvent, MixSession, NewTrack, OfflineBackend, TrackKind,
    TransportState, dsp::peak,
};
use uuid::Uuid;

const SAMPLE_RATE: u32 = 48_000;
const BLOCK: usize = 480;

fn tone_session(seconds: f64) -> (MixSession, Uuid) {
    let mut session = MixSession::new(MixConfig::default());
    session
        .initialize(&mut OfflineBackend)
        .expect("offline backend should open");
    let track_id = session.add_track(NewTrack::named("Tone", TrackKind::Music));
    assert!(session.attach_source(
        track_id,
        DecodedAudio::sine(440.0, 0.25, seconds, SAMPLE_RATE)
    ));
    (session, track_id)
}

#[test]
fn transport_requires_initialization() {
    let mut session = MixSession::new(MixConfig::default());
    assert!(!session.play());
    assert!(!session.seek(1.0));
    assert!(!session.stop());
    assert!(session.render_block(BLOCK).is_none());
    assert_eq!(session.transport_state(), TransportState::Stopped);
}

#[test]
fn attached_source_sets_duration_and_plays() {
    let (mut session, track_id) = tone_session(1.0);
    assert_eq!(session.total_duration(), 1.0);

    assert!(session.play());
    assert!(!session.play());
    assert!(session.is_voice_active(track_id));

    let block = session.render_block(BLOCK).expect("initialized").to_vec();
    assert_eq!(block.len(), BLOCK * 2);
    assert!(peak(&block) > 0.1);
    assert!((session.current_time() - 0.01).abs() < 1e-9);
}

#[test]
fn pause_freezes_and_stop_rewinds() {
    let (mut session, track_id) = tone_session(1.0);
    let events = session.subscribe();

    session.play();
    for _ in 0..10 {
        session.render_block(BLOCK);
    }
    assert!(session.pause());
    let paused_at = session.current_time();
    assert!((paused_at - 0.1).abs() < 1e-9);
    assert!(!session.is_voice_active(track_id));

    let silent = session.render_block(BLOCK).expect("initialized").to_vec();
    assert_eq!(peak(&silent), 0.0);
    assert_eq!(session.current_time(), paused_at);

    assert!(session.stop());
    assert_eq!(session.current_time(), 0.0);
    assert_eq!(session.transport_state(), TransportState::Stopped);

    let names: Vec<&str> = events.try_iter().map(|event| event.name()).collect();
    assert_eq!(
        names,
        vec!["playback:started", "playback:paused", "playback:stopped"]
    );
}

#[test]
fn seek_moves_playhead_and_clamps_negative() {
    let (mut session, _track_id) = tone_session(1.0);
    let events = session.subscribe();

    assert!(session.seek(0.5));
    assert_eq!(session.current_time(), 0.5);
    assert!(session.seek(-3.0));
    assert_eq!(session.current_time(), 0.0);

    let seeked: Vec<f64> = events
        .try_iter()
        .filter_map(|event| match event {
            MixEvent::PlaybackSeeked { current_time } => Some(current_time),
            _ => None,
        })
        .collect();
    assert_eq!(seeked, vec![0.5, 0.0]);
}

#[test]
fn playback_stops_itself_at_the_end() {
    let (mut session, _track_id) = tone_session(0.05);
    let events = session.subscribe();
    session.play();

    for _ in 0..10 {
        session.render_block(BLOCK);
    }

    assert_eq!(session.transport_state(), TransportState::Stopped);
    assert_eq!(session.current_time(), 0.0);
    assert!(
        events
            .try_iter()
            .any(|event| event == MixEvent::PlaybackStopped)
    );
}

#[test]
fn muted_track_renders_silence() {
    let (mut session, track_id) = tone_session(1.0);
    session.play();
    assert!(session.set_track_muted(track_id, true));
    assert!(!session.is_voice_active(track_id));

    let block = session.render_block(BLOCK).expect("initialized").to_vec();
    assert_eq!(peak(&block), 0.0);

    assert!(session.set_track_muted(track_id, false));
    assert!(session.is_voice_active(track_id));
}

#[test]
fn master_volume_is_clamped() {
    let (mut session, _track_id) = tone_session(1.0);
    assert_eq!(session.set_master_volume(1.7), 1.0);
    assert_eq!(session.set_master_volume(-0.2), 0.0);
    assert_eq!(session.snapshot().master_volume, 0.0);
}

#[test]
fn recording_captures_rendered_blocks() {
    let (mut session, _track_id) = tone_session(1.0);
    assert!(session.start_recording().expect("initialized"));
    assert!(!session.start_recording().expect("initialized"));
    session.play();
    for _ in 0..5 {
        session.render_block(BLOCK);
    }

    let blob = session
        .stop_recording()
        .expect("recording encodes")
        .expect("a capture was running");
    assert_eq!(blob.sample_rate, SAMPLE_RATE);
    assert_eq!(blob.channels, 2);
    assert!((blob.duration_seconds - 0.05).abs() < 1e-9);
    assert_eq!(&blob.bytes[0..4], b"RIFF");
    assert!(session.stop_recording().expect("idle stop").is_none());
}

#[test]
fn recording_before_initialize_is_rejected() {
    let mut session = MixSession::new(MixConfig::default());
    assert!(matches!(
        session.start_recording(),
        Err(mixlane_core::MixError::NotInitialized)
    ));
}

fn flat_source(silent_frames: usize, total_frames: usize, level: f32) -> DecodedAudio {
    let mut samples = vec![0.0; total_frames * 2];
    samples[silent_frames * 2..].fill(level);
    DecodedAudio::from_stereo(SAMPLE_RATE, samples)
}

fn flat_session(silent_frames: usize) -> (MixSession, Uuid) {
    let mut session = MixSession::new(MixConfig::default());
    session
        .initialize(&mut OfflineBackend)
        .expect("offline backend should open");
    let track_id = session.add_track(NewTrack::named("Flat", TrackKind::Music));
    assert!(session.attach_source(track_id, flat_source(silent_frames, 48_000, 0.2)));
    (session, track_id)
}

#[test]
fn seeking_while_playing_restarts_at_the_new_offset() {
    // silent first half, flat 0.2 second half
    let (mut session, track_id) = flat_session(24_000);
    session.play();
    let quiet = session.render_block(BLOCK).expect("initialized").to_vec();
    assert_eq!(peak(&quiet), 0.0);

    assert!(session.seek(0.6));
    assert_eq!(session.transport_state(), TransportState::Playing);
    assert!(session.is_voice_active(track_id));

    let loud = session.render_block(BLOCK).expect("initialized").to_vec();
    assert!(loud.iter().all(|sample| (sample - 0.2).abs() < 1e-4));
    assert!((session.current_time() - 0.61).abs() < 1e-9);
}

#[test]
fn fades_shape_rendered_blocks() {
    let (mut session, track_id) = flat_session(0);
    assert!(session.set_track_fade_in(track_id, 0.5));
    assert!(session.set_track_fade_out(track_id, 0.5));
    session.play();

    let opening = session.render_block(BLOCK).expect("initialized").to_vec();
    assert_eq!(opening[0], 0.0);
    assert!(peak(&opening) < 0.0041);

    session.seek(0.25);
    let rising = session.render_block(BLOCK).expect("initialized").to_vec();
    assert!((rising[0] - 0.1).abs() < 1e-4);
    assert!(rising[rising.len() - 1] > rising[0]);
    assert!(peak(&rising) < 0.1021);

    session.seek(0.75);
    let falling = session.render_block(BLOCK).expect("initialized").to_vec();
    assert!((falling[0] - 0.1).abs() < 1e-4);
    assert!(falling[falling.len() - 1] < falling[0]);
}
