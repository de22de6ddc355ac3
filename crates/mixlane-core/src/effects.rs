use std::sync::Arc;

use tracing::debug;

use crate::{
    dsp::{Biquad, BiquadKind, Compressor, db_to_linear},
    model::{EffectKind, EffectSpec},
};

pub const DISTORTION_CURVE_POINTS: usize = 44_100;
pub const DISTORTION_OVERSAMPLE: usize = 4;

pub const EQ_LOW_SHELF_HZ: f32 = 200.0;
pub const EQ_MID_PEAK_HZ: f32 = 1_000.0;
pub const EQ_MID_Q: f32 = 1.0;
pub const EQ_HIGH_SHELF_HZ: f32 = 5_000.0;
pub const BASS_BOOST_HZ: f32 = 100.0;
pub const TREBLE_BOOST_HZ: f32 = 8_000.0;
pub const DEFAULT_BOOST_DB: f32 = 6.0;

pub const COMPRESSOR_THRESHOLD_DB: f32 = -24.0;
pub const COMPRESSOR_KNEE_DB: f32 = 30.0;
pub const COMPRESSOR_RELEASE_SEC: f32 = 0.25;
const DEFAULT_COMPRESSOR_RATIO: f32 = 4.0;
const DEFAULT_COMPRESSOR_ATTACK_MS: f32 = 3.0;

pub const NOISE_REDUCTION_Q: f32 = 0.7;
const DEFAULT_NOISE_FLOOR_DB: f32 = -60.0;

/// Slope of the fuzz transfer at full drive; anything louder than `1 / FUZZ_DRIVE` is clipped.
const FUZZ_DRIVE: f32 = 1_000.0;

const SHELF_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionCurve {
    #[default]
    Soft,
    Hard,
    Tube,
    Fuzz,
}

impl DistortionCurve {
    /// Unknown names fall back to `Soft`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "hard" => Self::Hard,
            "tube" => Self::Tube,
            "fuzz" => Self::Fuzz,
            _ => Self::Soft,
        }
    }

    #[must_use]
    pub fn shape(self, x: f32, amount: f32) -> f32 {
        let amount = amount.clamp(0.0, 1.0);
        match self {
            Self::Soft => {
                let drive = 1.0 + amount * 20.0;
                (drive * x).tanh() / drive.tanh()
            }
            Self::Hard => (x * (1.0 + amount * 9.0)).clamp(-1.0, 1.0),
            Self::Tube => {
                // the negative half saturates later than the positive half
                let drive = if x >= 0.0 {
                    1.0 + amount * 10.0
                } else {
                    1.0 + amount * 4.0
                };
                (drive * x).tanh() / drive.tanh()
            }
            // binary clip; drive only narrows the knee around zero
            Self::Fuzz => {
                let driven = x.abs() * FUZZ_DRIVE * (1.0 + amount * 9.0);
                x.signum() * driven.min(1.0)
            }
        }
    }
}

/// Static transfer curve sampled over [-1, 1].
#[must_use]
pub fn distortion_curve(curve: DistortionCurve, amount: f32) -> Vec<f32> {
    let last = (DISTORTION_CURVE_POINTS - 1) as f32;
    (0..DISTORTION_CURVE_POINTS)
        .map(|index| {
            let x = index as f32 * 2.0 / last - 1.0;
            curve.shape(x, amount).clamp(-1.0, 1.0)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct WaveShaper {
    curve: Arc<[f32]>,
    kind: DistortionCurve,
    amount: f32,
    previous: Vec<f32>,
}

impl WaveShaper {
    #[must_use]
    pub fn new(kind: DistortionCurve, amount: f32) -> Self {
        Self {
            curve: distortion_curve(kind, amount).into(),
            kind,
            amount: amount.clamp(0.0, 1.0),
            previous: Vec::new(),
        }
    }

    #[must_use]
    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    #[must_use]
    pub fn kind(&self) -> DistortionCurve {
        self.kind
    }

    #[must_use]
    pub fn amount(&self) -> f32 {
        self.amount
    }

    fn lookup(&self, x: f32) -> f32 {
        let last = self.curve.len() - 1;
        let position = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * last as f32;
        let index = (position.floor() as usize).min(last);
        let next = (index + 1).min(last);
        let fraction = position - index as f32;
        self.curve[index] + (self.curve[next] - self.curve[index]) * fraction
    }

    /// Interpolates four sub-samples between consecutive inputs, shapes each, and averages.
    pub fn process(&mut self, samples: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if self.previous.len() != channels {
            self.previous = vec![0.0; channels];
        }
        for frame in samples.chunks_exact_mut(channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                let start = self.previous[channel];
                let end = *sample;
                let mut acc = 0.0;
                for step in 1..=DISTORTION_OVERSAMPLE {
                    let t = step as f32 / DISTORTION_OVERSAMPLE as f32;
                    acc += self.lookup(start + (end - start) * t);
                }
                self.previous[channel] = end;
                *sample = acc / DISTORTION_OVERSAMPLE as f32;
            }
        }
    }

    pub fn reset(&mut self) {
        self.previous.iter_mut().for_each(|value| *value = 0.0);
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    delay_frames: usize,
    feedback: f32,
    mix: f32,
    lines: Vec<Vec<f32>>,
    cursor: usize,
}

impl FeedbackDelay {
    #[must_use]
    pub fn new(sample_rate: u32, time_ms: f32, feedback: f32, mix: f32) -> Self {
        let delay_frames =
            ((time_ms.clamp(1.0, 2_000.0) / 1_000.0) * sample_rate as f32).round() as usize;
        Self {
            delay_frames: delay_frames.max(1),
            feedback: feedback.clamp(0.0, 0.95),
            mix: mix.clamp(0.0, 1.0),
            lines: Vec::new(),
            cursor: 0,
        }
    }

    pub fn process(&mut self, samples: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if self.lines.len() != channels {
            self.lines = vec![vec![0.0; self.delay_frames]; channels];
            self.cursor = 0;
        }
        for frame in samples.chunks_exact_mut(channels) {
            for (sample, line) in frame.iter_mut().zip(self.lines.iter_mut()) {
                let delayed = line[self.cursor];
                line[self.cursor] = *sample + delayed * self.feedback;
                *sample = *sample * (1.0 - self.mix) + delayed * self.mix;
            }
            self.cursor = (self.cursor + 1) % self.delay_frames;
        }
    }

    pub fn reset(&mut self) {
        self.lines
            .iter_mut()
            .for_each(|line| line.iter_mut().for_each(|value| *value = 0.0));
        self.cursor = 0;
    }
}

#[derive(Debug, Clone)]
pub struct Tremolo {
    phase_increment: f32,
    depth: f32,
    phase: f32,
}

impl Tremolo {
    #[must_use]
    pub fn new(sample_rate: u32, rate_hz: f32, depth: f32) -> Self {
        Self {
            phase_increment: rate_hz.clamp(0.01, 40.0) / sample_rate.max(1) as f32,
            depth: depth.clamp(0.0, 1.0),
            phase: 0.0,
        }
    }

    pub fn process(&mut self, samples: &mut [f32], channels: usize) {
        for frame in samples.chunks_exact_mut(channels.max(1)) {
            let lfo = 0.5 + 0.5 * (std::f32::consts::TAU * self.phase).sin();
            let gain = 1.0 - self.depth * lfo;
            frame.iter_mut().for_each(|sample| *sample *= gain);
            self.phase = (self.phase + self.phase_increment).fract();
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// One live processing stage instantiated from an [`EffectSpec`].
#[derive(Debug, Clone)]
pub enum EffectStage {
    Gain { linear: f32 },
    Eq { low: Biquad, mid: Biquad, high: Biquad },
    Shelf(Biquad),
    Distortion(WaveShaper),
    Compressor(Compressor),
    NoiseReduction(Biquad),
    Filter(Biquad),
    Delay(FeedbackDelay),
    Tremolo(Tremolo),
}

impl EffectStage {
    /// Linear gain for a gain stage, `None` for everything else.
    #[must_use]
    pub fn linear_gain(&self) -> Option<f32> {
        match self {
            Self::Gain { linear } => Some(*linear),
            _ => None,
        }
    }

    pub fn process(&mut self, samples: &mut [f32], channels: usize) {
        match self {
            Self::Gain { linear } => samples.iter_mut().for_each(|sample| *sample *= *linear),
            Self::Eq { low, mid, high } => {
                low.process(samples, channels);
                mid.process(samples, channels);
                high.process(samples, channels);
            }
            Self::Shelf(filter) | Self::NoiseReduction(filter) | Self::Filter(filter) => {
                filter.process(samples, channels);
            }
            Self::Distortion(shaper) => shaper.process(samples, channels),
            Self::Compressor(compressor) => compressor.process(samples, channels),
            Self::Delay(delay) => delay.process(samples, channels),
            Self::Tremolo(tremolo) => tremolo.process(samples, channels),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Gain { .. } => {}
            Self::Eq { low, mid, high } => {
                low.reset();
                mid.reset();
                high.reset();
            }
            Self::Shelf(filter) | Self::NoiseReduction(filter) | Self::Filter(filter) => {
                filter.reset();
            }
            Self::Distortion(shaper) => shaper.reset(),
            Self::Compressor(compressor) => compressor.reset(),
            Self::Delay(delay) => delay.reset(),
            Self::Tremolo(tremolo) => tremolo.reset(),
        }
    }
}

#[must_use]
pub fn noise_reduction_cutoff(noise_floor_db: f32) -> f32 {
    (100.0 + (noise_floor_db + 60.0) * 5.0).max(20.0)
}

/// Disabled effects and kinds without a renderer yield `None` and are left out of the chain.
#[must_use]
pub fn build_stage(spec: &EffectSpec, sample_rate: u32) -> Option<EffectStage> {
    if !spec.enabled {
        debug!(effect_id = %spec.id, kind = ?spec.kind, "disabled effect bypassed");
        return None;
    }

    let stage = match spec.kind {
        EffectKind::Gain => EffectStage::Gain {
            linear: db_to_linear(spec.number_or("gainDb", 0.0)),
        },
        EffectKind::Eq => EffectStage::Eq {
            low: Biquad::new(
                BiquadKind::LowShelf,
                sample_rate,
                EQ_LOW_SHELF_HZ,
                SHELF_Q,
                spec.number_or("lowGain", 0.0),
            ),
            mid: Biquad::new(
                BiquadKind::Peaking,
                sample_rate,
                EQ_MID_PEAK_HZ,
                EQ_MID_Q,
                spec.number_or("midGain", 0.0),
            ),
            high: Biquad::new(
                BiquadKind::HighShelf,
                sample_rate,
                EQ_HIGH_SHELF_HZ,
                SHELF_Q,
                spec.number_or("highGain", 0.0),
            ),
        },
        EffectKind::BassBoost => EffectStage::Shelf(Biquad::new(
            BiquadKind::LowShelf,
            sample_rate,
            spec.number_or("frequency", BASS_BOOST_HZ),
            SHELF_Q,
            spec.number_or("gainDb", DEFAULT_BOOST_DB),
        )),
        EffectKind::TrebleBoost => EffectStage::Shelf(Biquad::new(
            BiquadKind::HighShelf,
            sample_rate,
            spec.number_or("frequency", TREBLE_BOOST_HZ),
            SHELF_Q,
            spec.number_or("gainDb", DEFAULT_BOOST_DB),
        )),
        EffectKind::Distortion => EffectStage::Distortion(WaveShaper::new(
            spec.text("curveType")
                .map(DistortionCurve::from_name)
                .unwrap_or_default(),
            spec.number_or("amount", 0.5),
        )),
        EffectKind::Compressor => EffectStage::Compressor(Compressor::new(
            sample_rate,
            COMPRESSOR_THRESHOLD_DB,
            COMPRESSOR_KNEE_DB,
            spec.number_or("ratio", DEFAULT_COMPRESSOR_RATIO),
            spec.number_or("attack", DEFAULT_COMPRESSOR_ATTACK_MS) / 1_000.0,
            COMPRESSOR_RELEASE_SEC,
        )),
        EffectKind::NoiseReduction => EffectStage::NoiseReduction(Biquad::new(
            BiquadKind::Highpass,
            sample_rate,
            noise_reduction_cutoff(spec.number_or("noiseFloorDb", DEFAULT_NOISE_FLOOR_DB)),
            NOISE_REDUCTION_Q,
            0.0,
        )),
        EffectKind::Filter => {
            let kind = match spec.text("filterType").unwrap_or("lowpass") {
                "highpass" => BiquadKind::Highpass,
                "bandpass" => BiquadKind::Bandpass,
                _ => BiquadKind::Lowpass,
            };
            EffectStage::Filter(Biquad::new(
                kind,
                sample_rate,
                spec.number_or("frequency", 1_000.0),
                spec.number_or("q", SHELF_Q),
                0.0,
            ))
        }
        EffectKind::Delay => EffectStage::Delay(FeedbackDelay::new(
            sample_rate,
            spec.number_or("timeMs", 250.0),
            spec.number_or("feedback", 0.35),
            spec.number_or("mix", 0.3),
        )),
        EffectKind::Tremolo => EffectStage::Tremolo(Tremolo::new(
            sample_rate,
            spec.number_or("rateHz", 5.0),
            spec.number_or("depth", 0.5),
        )),
        EffectKind::Reverb
        | EffectKind::Chorus
        | EffectKind::Phaser
        | EffectKind::PitchShift
        | EffectKind::TimeStretch
        | EffectKind::Unknown => {
            debug!(effect_id = %spec.id, kind = ?spec.kind, "no renderer for effect kind, skipped");
            return None;
        }
    };
    Some(stage)
}
