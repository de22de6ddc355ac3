use uuid::Uuid;

use crate::{
    assets::DecodedAudio,
    config::MixConfig,
    model::{DuckingConfig, EffectKind, NewEffect, NewTrack, TrackKind},
    session::MixSession,
};

pub const DEMO_LENGTH_SECONDS: f64 = 4.0;
pub const DEMO_NARRATION_START: f64 = 1.0;
pub const DEMO_NARRATION_SECONDS: f64 = 2.0;

pub struct DemoMix {
    pub session: MixSession,
    pub music_id: Uuid,
    pub narration_id: Uuid,
}

/// Narration over a music bed, with generated tones and the bed ducked under the voice.
///
/// The session is returned uninitialized; callers open their own backend.
#[must_use]
pub fn demo_session(config: MixConfig) -> DemoMix {
    let sample_rate = config.audio.sample_rate;
    let mut session = MixSession::new(config);

    let music_id = session.add_track(NewTrack {
        volume: 0.8,
        fade_in: 0.25,
        fade_out: 0.5,
        color: "#f77f00".to_string(),
        ..NewTrack::named("Music Bed", TrackKind::Music)
    });
    session.attach_source(
        music_id,
        DecodedAudio::sine(110.0, 0.4, DEMO_LENGTH_SECONDS, sample_rate),
    );
    session.add_effect(
        music_id,
        NewEffect::new(EffectKind::Eq)
            .with_param("lowGain", 3.0)
            .with_param("highGain", -2.0),
    );

    let narration_id = session.add_track(NewTrack {
        start_time: DEMO_NARRATION_START,
        color: "#00d1b2".to_string(),
        ..NewTrack::named("Narration", TrackKind::Narration)
    });
    session.attach_source(
        narration_id,
        DecodedAudio::sine(330.0, 0.5, DEMO_NARRATION_SECONDS, sample_rate),
    );
    session.add_effect(
        narration_id,
        NewEffect::new(EffectKind::Compressor)
            .with_param("ratio", 3.0)
            .with_param("attack", 5.0),
    );
    session.add_effect(
        narration_id,
        NewEffect::new(EffectKind::NoiseReduction).with_param("noiseFloorDb", -70.0),
    );

    session.set_ducking(DuckingConfig {
        enabled: true,
        target_track_id: music_id,
        trigger_track_id: narration_id,
        ..DuckingConfig::default()
    });

    DemoMix {
        session,
        music_id,
        narration_id,
    }
}
