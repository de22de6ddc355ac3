#[must_use]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }

    (seconds * f64::from(sample_rate)).round() as u64
}

#[must_use]
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frames as f64 / f64::from(sample_rate)
}

/// Frame count covering `seconds` completely, rounding partial frames up.
#[must_use]
pub fn frames_covering(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }

    let frames = (seconds * f64::from(sample_rate) - 1e-9).ceil();
    usize::try_from(frames as u64).unwrap_or(usize::MAX)
}

#[must_use]
pub fn seconds_per_beat(bpm: f64) -> f64 {
    if bpm <= 0.0 {
        return 0.0;
    }

    60.0 / bpm
}

#[must_use]
pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    if bpm <= 0.0 {
        return 0.0;
    }

    seconds * (bpm / 60.0)
}

#[must_use]
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * seconds_per_beat(bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip_is_stable() {
        let sample_rate = 48_000;
        let frames = 123_456;
        let seconds = frames_to_seconds(frames, sample_rate);
        assert_eq!(seconds_to_frames(seconds, sample_rate), frames);
    }

    #[test]
    fn beat_round_trip_is_stable() {
        let bpm = 128.0;
        let seconds = beats_to_seconds(32.0, bpm);
        assert!((seconds_to_beats(seconds, bpm) - 32.0).abs() < 1e-9);
    }

    #[test]
    fn covering_rounds_partial_frames_up() {
        assert_eq!(frames_covering(1.0, 48_000), 48_000);
        assert_eq!(frames_covering(0.5 / 48_000.0 + 1.0, 48_000), 48_001);
        assert_eq!(frames_covering(-1.0, 48_000), 0);
    }
}
