use tracing::{debug, info, warn};

use crate::{
    model::{QuantizeUnit, SyncConfig, SyncState},
    time::{seconds_per_beat, seconds_to_beats},
};

/// Drift under this many seconds still counts as locked to the external clock.
pub const DRIFT_TOLERANCE_SEC: f64 = 0.005;

#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    state: SyncState,
    sample_rate: u32,
}

impl SyncEngine {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            config: SyncConfig::default(),
            state: SyncState {
                is_synced: true,
                ..SyncState::default()
            },
            sample_rate,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    pub fn set_config(&mut self, mut config: SyncConfig, current_time: f64) -> SyncState {
        if !config.master_tempo_bpm.is_finite() || config.master_tempo_bpm <= 0.0 {
            warn!(
                bpm = config.master_tempo_bpm,
                "invalid tempo replaced with default"
            );
            config.master_tempo_bpm = SyncConfig::default().master_tempo_bpm;
        }
        config.time_sig_num = config.time_sig_num.max(1);
        config.time_sig_denom = config.time_sig_denom.max(1);
        info!(
            bpm = config.master_tempo_bpm,
            num = config.time_sig_num,
            denom = config.time_sig_denom,
            external = config.external_sync,
            "sync config applied"
        );
        self.config = config;
        self.state.drift = 0.0;
        self.update(current_time)
    }

    /// Seconds per beat, honouring the time-signature denominator (quarter note = 4).
    #[must_use]
    pub fn beat_length(&self) -> f64 {
        seconds_per_beat(self.config.master_tempo_bpm) * 4.0 / f64::from(self.config.time_sig_denom)
    }

    #[must_use]
    pub fn bar_length(&self) -> f64 {
        self.beat_length() * f64::from(self.config.time_sig_num)
    }

    fn offset_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.config.frame_offset as f64 / f64::from(self.sample_rate)
    }

    /// Derives beat/bar counters from the playhead.
    pub fn update(&mut self, current_time: f64) -> SyncState {
        let position = (current_time + self.offset_seconds()).max(0.0);
        let beat_length = self.beat_length();
        let beats = if beat_length > 0.0 {
            position / beat_length
        } else {
            seconds_to_beats(position, self.config.master_tempo_bpm)
        };
        let current_beat = beats.floor() as u64;
        self.state.current_beat = current_beat;
        self.state.current_bar = current_beat / u64::from(self.config.time_sig_num);
        self.state.current_position = position;
        self.state.is_synced =
            !self.config.external_sync || self.state.drift.abs() <= DRIFT_TOLERANCE_SEC;
        self.state
    }

    /// Snaps `seconds` to the nearest grid line of the configured unit.
    #[must_use]
    pub fn quantize(&self, seconds: f64) -> f64 {
        let grid = match self.config.quantize_to {
            QuantizeUnit::Beat => self.beat_length(),
            // a measure and a bar are the same span here
            QuantizeUnit::Bar | QuantizeUnit::Measure => self.bar_length(),
        };
        if grid <= 0.0 || !seconds.is_finite() {
            return seconds.max(0.0);
        }
        ((seconds / grid).round() * grid).max(0.0)
    }

    /// Records how far the local playhead is ahead (positive) of an external clock.
    pub fn report_external_position(&mut self, external_seconds: f64, current_time: f64) -> SyncState {
        if !self.config.external_sync {
            debug!("external position ignored while external sync is off");
            return self.state;
        }
        self.state.drift = current_time - external_seconds;
        let synced = self.state.drift.abs() <= DRIFT_TOLERANCE_SEC;
        if !synced && self.state.is_synced {
            warn!(drift = self.state.drift, "external sync drifted out of tolerance");
        }
        self.update(current_time)
    }
}
