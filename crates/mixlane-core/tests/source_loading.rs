use std::time::Duration;

use mixlane_core::{
    DecodedAudio, MixConfig, MixEvent, MixSession, NewTrack, OfflineBackend, TrackKind,
    export::encode_wav, waveform_peaks,
};

fn write_tone(path: &std::path::Path, seconds: f64) {
    let tone = DecodedAudio::sine(440.0, 0.5, seconds, 44_100);
    let bytes = encode_wav(&tone.samples, 2, 44_100).expect("tone should encode");
    std::fs::write(path, bytes).expect("tone should be written");
}

#[test]
fn decoded_file_sets_track_duration() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("tone.wav");
    write_tone(&path, 0.5);

    let mut session = MixSession::new(MixConfig::default());
    session
        .initialize(&mut OfflineBackend)
        .expect("offline backend should open");
    let track_id = session.add_track(NewTrack {
        source: path.display().to_string(),
        ..NewTrack::named("From Disk", TrackKind::Sfx)
    });

    assert_eq!(session.wait_for_sources(Duration::from_secs(10)), 1);
    assert_eq!(session.pending_sources(), 0);

    let track = session.track(track_id).expect("track exists");
    assert!((track.duration - 0.5).abs() < 1e-3);
    assert!((session.total_duration() - 0.5).abs() < 1e-3);
    assert!(session.last_error().is_none());
}

#[test]
fn missing_file_leaves_a_silent_track() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let mut session = MixSession::new(MixConfig::default());
    let events = session.subscribe();
    let track_id = session.add_track(NewTrack::named("Ghost", TrackKind::Voice));

    assert!(session.load_source(track_id, temp.path().join("absent.wav").display().to_string()));
    session.wait_for_sources(Duration::from_secs(10));

    let track = session.track(track_id).expect("track survives");
    assert_eq!(track.duration, 0.0);
    assert!(session.last_error().is_some());
    assert!(
        events
            .try_iter()
            .any(|event| matches!(event, MixEvent::Error { .. }))
    );
}

#[test]
fn explicit_duration_is_kept_when_source_arrives() {
    let mut session = MixSession::new(MixConfig::default());
    let track_id = session.add_track(NewTrack {
        duration: 0.25,
        ..NewTrack::named("Trimmed", TrackKind::Music)
    });

    assert!(session.attach_source(track_id, DecodedAudio::sine(220.0, 0.3, 2.0, 48_000)));

    assert_eq!(session.track(track_id).expect("track").duration, 0.25);
    assert_eq!(session.total_duration(), 0.25);
}

#[test]
fn waveform_peaks_bucket_the_source() {
    let tone = DecodedAudio::sine(100.0, 0.5, 1.0, 48_000);
    let peaks = waveform_peaks(&tone, 4_800);
    assert_eq!(peaks.len(), 10);
    assert!(peaks.iter().all(|peak| (*peak - 0.5).abs() < 0.01));
}
