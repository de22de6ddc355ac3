use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::model::{Track, TransportState};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transport {
    state: TransportState,
    current_time: f64,
}

impl Transport {
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Returns `false` when already playing.
    pub fn play(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        self.state = TransportState::Playing;
        true
    }

    /// Freezes the playhead; only valid while playing.
    pub fn pause(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state = TransportState::Paused;
        true
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.current_time = 0.0;
    }

    pub fn seek(&mut self, seconds: f64) -> f64 {
        self.current_time = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
        self.current_time
    }

    /// Moves the playhead while playing. Returns `true` once `total_duration` has been reached.
    pub fn advance(&mut self, seconds: f64, total_duration: f64) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.current_time += seconds.max(0.0);
        total_duration > 0.0 && self.current_time >= total_duration
    }
}

/// Solo overrides mute: with any solo active only soloed, unmuted tracks are heard.
#[must_use]
pub fn is_audible(track: &Track, any_solo: bool) -> bool {
    !track.muted && (!any_solo || track.solo)
}

#[must_use]
pub fn any_solo<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> bool {
    tracks.into_iter().any(|track| track.solo)
}

/// Linear fade envelope at `elapsed` seconds into a region of `duration` seconds.
#[must_use]
pub fn fade_gain(elapsed: f64, duration: f64, fade_in: f64, fade_out: f64) -> f32 {
    if elapsed < 0.0 || elapsed >= duration {
        return 0.0;
    }
    let mut gain = 1.0_f64;
    if fade_in > 0.0 && elapsed < fade_in {
        gain = gain.min(elapsed / fade_in);
    }
    let remaining = duration - elapsed;
    if fade_out > 0.0 && remaining < fade_out {
        gain = gain.min(remaining / fade_out);
    }
    gain.clamp(0.0, 1.0) as f32
}

/// A source voice armed against the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSource {
    pub track_id: Uuid,
    pub start_time: f64,
    pub end_time: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    /// Session time at which the voice becomes audible.
    pub starts_at: f64,
}

impl ScheduledSource {
    /// `None` when the track has nothing left to play after `now`.
    #[must_use]
    pub fn for_track(track: &Track, now: f64) -> Option<Self> {
        if track.duration <= 0.0 || track.end_time() <= now {
            return None;
        }
        Some(Self {
            track_id: track.id,
            start_time: track.start_time,
            end_time: track.end_time(),
            fade_in: track.fade_in,
            fade_out: track.fade_out,
            starts_at: now.max(track.start_time),
        })
    }

    /// Seconds between `now` and the voice becoming audible.
    #[must_use]
    pub fn delay(&self, now: f64) -> f64 {
        (self.starts_at - now).max(0.0)
    }

    /// Offset into the source at which playback begins.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.starts_at - self.start_time
    }

    #[must_use]
    pub fn is_finished(&self, now: f64) -> bool {
        now >= self.end_time
    }

    /// Source position and envelope gain at session time `t`, if the voice sounds there.
    #[must_use]
    pub fn sample_at(&self, t: f64) -> Option<(f64, f32)> {
        if t < self.starts_at || t >= self.end_time {
            return None;
        }
        let elapsed = t - self.start_time;
        let gain = fade_gain(
            elapsed,
            self.end_time - self.start_time,
            self.fade_in,
            self.fade_out,
        );
        Some((elapsed, gain))
    }
}

/// Voices to start at `now` for every audible track with a loaded source.
#[must_use]
pub fn schedule_sources<'a>(
    tracks: impl IntoIterator<Item = &'a Track> + Clone,
    now: f64,
    has_source: impl Fn(Uuid) -> bool,
) -> Vec<ScheduledSource> {
    let soloing = any_solo(tracks.clone());
    tracks
        .into_iter()
        .filter(|track| {
            let audible = is_audible(track, soloing);
            if !audible {
                debug!(track_id = %track.id, "silent track not scheduled");
            }
            audible && has_source(track.id)
        })
        .filter_map(|track| ScheduledSource::for_track(track, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTrack, TrackKind};

    fn track(start: f64, duration: f64) -> Track {
        Track::from_request(
            NewTrack {
                start_time: start,
                duration,
                ..NewTrack::named("t", TrackKind::Music)
            },
            0,
        )
    }

    #[test]
    fn stop_rewinds_and_pause_freezes() {
        let mut transport = Transport::default();
        assert!(!transport.pause());
        assert!(transport.play());
        assert!(!transport.play());
        transport.advance(1.5, 10.0);
        assert!(transport.pause());
        transport.advance(1.0, 10.0);
        assert!((transport.current_time() - 1.5).abs() < 1e-12);
        transport.stop();
        assert_eq!(transport.current_time(), 0.0);
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn advance_reports_end_of_mix() {
        let mut transport = Transport::default();
        transport.play();
        assert!(!transport.advance(0.5, 1.0));
        assert!(transport.advance(0.5, 1.0));
    }

    #[test]
    fn fades_are_linear_and_land_on_end() {
        assert!((fade_gain(0.5, 10.0, 1.0, 0.0) - 0.5).abs() < 1e-6);
        assert_eq!(fade_gain(5.0, 10.0, 1.0, 2.0), 1.0);
        assert!((fade_gain(9.0, 10.0, 0.0, 2.0) - 0.5).abs() < 1e-6);
        assert_eq!(fade_gain(10.0, 10.0, 0.0, 2.0), 0.0);
    }

    #[test]
    fn later_tracks_are_delayed_and_earlier_ones_offset() {
        let early = track(0.0, 4.0);
        let late = track(3.0, 2.0);
        let now = 1.0;
        let early_voice = ScheduledSource::for_track(&early, now).expect("early voice");
        assert_eq!(early_voice.delay(now), 0.0);
        assert!((early_voice.offset() - 1.0).abs() < 1e-12);
        let late_voice = ScheduledSource::for_track(&late, now).expect("late voice");
        assert!((late_voice.delay(now) - 2.0).abs() < 1e-12);
        assert_eq!(late_voice.offset(), 0.0);
        assert!(ScheduledSource::for_track(&early, 4.0).is_none());
    }

    #[test]
    fn solo_silences_everything_else() {
        let mut tracks = vec![track(0.0, 1.0), track(0.0, 1.0), track(0.0, 1.0)];
        tracks[1].solo = true;
        let voices = schedule_sources(&tracks, 0.0, |_| true);
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].track_id, tracks[1].id);

        tracks[1].solo = false;
        tracks[2].muted = true;
        assert_eq!(schedule_sources(&tracks, 0.0, |_| true).len(), 2);
    }
}
