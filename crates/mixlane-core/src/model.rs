use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_TRACK_VOLUME: f32 = 1.0;
pub const DEFAULT_TRACK_PAN: f32 = 0.0;
pub const DEFAULT_TRACK_COLOR: &str = "#52e1c4";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Voice,
    Music,
    Sfx,
    Ambient,
    Narration,
}

/// Normalized listener-relative placement: `x`/`y` in [-1, 1], `z` in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Position3d {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        }
    }
}

impl Position3d {
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }.clamped()
    }

    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            x: finite_or(self.x, 0.0).clamp(-1.0, 1.0),
            y: finite_or(self.y, 0.0).clamp(-1.0, 1.0),
            z: finite_or(self.z, 0.0).clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub kind: TrackKind,
    pub source: String,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub locked: bool,
    pub start_time: f64,
    pub duration: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    pub effects: Vec<EffectSpec>,
    pub order: usize,
    pub color: String,
    #[serde(default)]
    pub position: Position3d,
}

impl Track {
    /// `pan` and `position.x` are one control; a non-zero `pan` wins over the position.
    #[must_use]
    pub fn from_request(request: NewTrack, order: usize) -> Self {
        let position = request.position.clamped();
        let pan = if request.pan == 0.0 {
            position.x
        } else {
            clamp_pan(request.pan)
        };
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            kind: request.kind,
            source: request.source,
            volume: clamp_volume(request.volume),
            pan,
            muted: request.muted,
            solo: request.solo,
            locked: request.locked,
            start_time: non_negative(request.start_time),
            duration: non_negative(request.duration),
            fade_in: non_negative(request.fade_in),
            fade_out: non_negative(request.fade_out),
            effects: Vec::new(),
            order,
            color: request.color,
            position: Position3d { x: pan, ..position },
        }
    }

    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    #[must_use]
    pub fn contains_time(&self, seconds: f64) -> bool {
        seconds >= self.start_time && seconds < self.end_time()
    }

    /// Effects in ascending `order`, the sequence the chain is wired in.
    #[must_use]
    pub fn ordered_effects(&self) -> Vec<&EffectSpec> {
        let mut effects: Vec<&EffectSpec> = self.effects.iter().collect();
        effects.sort_by_key(|effect| effect.order);
        effects
    }

    pub fn renumber_effects(&mut self) {
        self.effects.sort_by_key(|effect| effect.order);
        for (index, effect) in self.effects.iter_mut().enumerate() {
            effect.order = index;
        }
    }

    pub fn apply(&mut self, patch: TrackPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        if let Some(volume) = patch.volume {
            self.volume = clamp_volume(volume);
        }
        if let Some(pan) = patch.pan {
            self.pan = clamp_pan(pan);
            self.position.x = self.pan;
        }
        if let Some(muted) = patch.muted {
            self.muted = muted;
        }
        if let Some(solo) = patch.solo {
            self.solo = solo;
        }
        if let Some(locked) = patch.locked {
            self.locked = locked;
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = non_negative(start_time);
        }
        if let Some(duration) = patch.duration {
            self.duration = non_negative(duration);
        }
        if let Some(fade_in) = patch.fade_in {
            self.fade_in = non_negative(fade_in);
        }
        if let Some(fade_out) = patch.fade_out {
            self.fade_out = non_negative(fade_out);
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(position) = patch.position {
            self.position = position.clamped();
            self.pan = self.position.x;
        }
        if let Some(effects) = patch.effects {
            self.effects = effects;
            self.renumber_effects();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTrack {
    pub name: String,
    pub kind: TrackKind,
    pub source: String,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub locked: bool,
    pub start_time: f64,
    pub duration: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    pub color: String,
    pub position: Position3d,
}

impl Default for NewTrack {
    fn default() -> Self {
        Self {
            name: "Track".to_string(),
            kind: TrackKind::Music,
            source: String::new(),
            volume: DEFAULT_TRACK_VOLUME,
            pan: DEFAULT_TRACK_PAN,
            muted: false,
            solo: false,
            locked: false,
            start_time: 0.0,
            duration: 0.0,
            fade_in: 0.0,
            fade_out: 0.0,
            color: DEFAULT_TRACK_COLOR.to_string(),
            position: Position3d::default(),
        }
    }
}

impl NewTrack {
    #[must_use]
    pub fn named(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackPatch {
    pub name: Option<String>,
    pub kind: Option<TrackKind>,
    pub source: Option<String>,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
    pub muted: Option<bool>,
    pub solo: Option<bool>,
    pub locked: Option<bool>,
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    pub fade_in: Option<f64>,
    pub fade_out: Option<f64>,
    pub color: Option<String>,
    pub position: Option<Position3d>,
    pub effects: Option<Vec<EffectSpec>>,
}

impl TrackPatch {
    #[must_use]
    pub fn touches_timing(&self) -> bool {
        self.start_time.is_some()
            || self.duration.is_some()
            || self.fade_in.is_some()
            || self.fade_out.is_some()
    }

}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    Gain,
    Eq,
    BassBoost,
    TrebleBoost,
    Distortion,
    Compressor,
    NoiseReduction,
    Reverb,
    Delay,
    Filter,
    Chorus,
    Phaser,
    Tremolo,
    PitchShift,
    TimeStretch,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f32),
    Text(String),
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        Self::Number(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value as f32)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectSpec {
    pub id: Uuid,
    pub kind: EffectKind,
    pub enabled: bool,
    pub order: usize,
    pub params: BTreeMap<String, ParamValue>,
}

impl EffectSpec {
    #[must_use]
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            enabled: true,
            order: 0,
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Looks `key` up as written, then in its snake_case spelling (`gainDb` -> `gain_db`).
    fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params
            .get(key)
            .or_else(|| self.params.get(&snake_case_key(key)))
    }

    #[must_use]
    pub fn number(&self, key: &str) -> Option<f32> {
        match self.param(key) {
            Some(ParamValue::Number(value)) if value.is_finite() => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn number_or(&self, key: &str, default: f32) -> f32 {
        self.number(key).unwrap_or(default)
    }

    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.param(key) {
            Some(ParamValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEffect {
    pub kind: EffectKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl NewEffect {
    #[must_use]
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectPatch {
    pub enabled: Option<bool>,
    pub params: BTreeMap<String, ParamValue>,
}

impl EffectSpec {
    pub fn apply(&mut self, patch: EffectPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        self.params.extend(patch.params);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuckingConfig {
    pub enabled: bool,
    pub target_track_id: Uuid,
    pub trigger_track_id: Uuid,
    pub threshold_db: f32,
    pub duck_amount_db: f32,
    pub attack_sec: f32,
    pub release_sec: f32,
    pub hold_sec: f32,
    pub range_db: f32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_track_id: Uuid::nil(),
            trigger_track_id: Uuid::nil(),
            threshold_db: -30.0,
            duck_amount_db: 12.0,
            attack_sec: 0.05,
            release_sec: 0.3,
            hold_sec: 0.1,
            range_db: 24.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DuckingState {
    pub current_duck_level: f32,
    pub is_active: bool,
    pub release_time_remaining: f32,
}

impl Default for DuckingState {
    fn default() -> Self {
        Self {
            current_duck_level: 1.0,
            is_active: false,
            release_time_remaining: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeCurve {
    #[default]
    Linear,
    EqualPower,
    EqualGain,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    pub input: f32,
    pub output: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrossfadeConfig {
    pub curve_type: CrossfadeCurve,
    pub custom_points: Option<Vec<CurvePoint>>,
    pub duration_sec: f64,
    pub auto_crossfade: bool,
    pub track_a: Option<Uuid>,
    pub track_b: Option<Uuid>,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            curve_type: CrossfadeCurve::Linear,
            custom_points: None,
            duration_sec: 2.0,
            auto_crossfade: false,
            track_a: None,
            track_b: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CrossfadeState {
    pub progress: f32,
    pub volume_a: f32,
    pub volume_b: f32,
}

impl Default for CrossfadeState {
    fn default() -> Self {
        Self {
            progress: 0.0,
            volume_a: 1.0,
            volume_b: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantizeUnit {
    #[default]
    Beat,
    Bar,
    Measure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub master_tempo_bpm: f64,
    pub quantize_to: QuantizeUnit,
    pub time_sig_num: u8,
    pub time_sig_denom: u8,
    pub frame_offset: i64,
    pub external_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            master_tempo_bpm: 120.0,
            quantize_to: QuantizeUnit::Beat,
            time_sig_num: 4,
            time_sig_denom: 4,
            frame_offset: 0,
            external_sync: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncState {
    pub current_beat: u64,
    pub current_bar: u64,
    pub current_position: f64,
    pub is_synced: bool,
    pub drift: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SurroundMode {
    #[default]
    #[serde(rename = "stereo")]
    Stereo,
    #[serde(rename = "5.1")]
    Surround51,
    #[serde(rename = "7.1")]
    Surround71,
}

impl SurroundMode {
    #[must_use]
    pub const fn channel_count(self) -> usize {
        match self {
            Self::Stereo => 2,
            Self::Surround51 => 6,
            Self::Surround71 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixingState {
    pub tracks: Vec<Track>,
    pub master_volume: f32,
    pub master_muted: bool,
    pub transport: TransportState,
    pub is_playing: bool,
    pub current_time: f64,
    pub total_duration: f64,
    pub graph_ready: bool,
    pub sample_rate: u32,
    pub surround_mode: SurroundMode,
    pub is_recording: bool,
    pub recording_duration: f64,
    pub last_error: Option<String>,
}

/// Longest `start_time + duration` across the mix.
#[must_use]
pub fn total_duration(tracks: &[Track]) -> f64 {
    tracks.iter().map(Track::end_time).fold(0.0, f64::max)
}

fn snake_case_key(key: &str) -> String {
    let mut snake = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            snake.push('_');
            snake.push(ch.to_ascii_lowercase());
        } else {
            snake.push(ch);
        }
    }
    snake
}

const fn default_enabled() -> bool {
    true
}

fn clamp_volume(volume: f32) -> f32 {
    finite_or(volume, DEFAULT_TRACK_VOLUME).clamp(0.0, 1.0)
}

fn clamp_pan(pan: f32) -> f32 {
    finite_or(pan, DEFAULT_TRACK_PAN).clamp(-1.0, 1.0)
}

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}
