use std::f64::consts::PI;

pub const SILENCE_DB: f32 = -120.0;

pub const LIMITER_THRESHOLD_DB: f32 = -10.0;
pub const LIMITER_RATIO: f32 = 20.0;
pub const LIMITER_KNEE_DB: f32 = 0.0;
pub const LIMITER_ATTACK_SEC: f32 = 0.003;
pub const LIMITER_RELEASE_SEC: f32 = 0.25;

#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    10_f32.powf(db / 20.0)
}

#[must_use]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= db_to_linear(SILENCE_DB) {
        SILENCE_DB
    } else {
        20.0 * linear.log10()
    }
}

#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|sample| f64::from(*sample) * f64::from(*sample))
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|sample| sample.abs())
        .fold(0.0_f32, f32::max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
    Bandpass,
    Peaking,
    LowShelf,
    HighShelf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

/// RBJ cookbook biquad, transposed direct form II, one state pair per channel.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: BiquadKind,
    sample_rate: u32,
    frequency: f32,
    q: f32,
    gain_db: f32,
    coefficients: Coefficients,
    state: Vec<[f64; 2]>,
}

impl Biquad {
    #[must_use]
    pub fn new(kind: BiquadKind, sample_rate: u32, frequency: f32, q: f32, gain_db: f32) -> Self {
        let sample_rate = sample_rate.max(1);
        let nyquist_guard = sample_rate as f32 * 0.49;
        let frequency = frequency.clamp(10.0, nyquist_guard.max(10.0));
        let q = q.max(0.01);
        let gain_db = gain_db.clamp(-48.0, 48.0);
        Self {
            kind,
            sample_rate,
            frequency,
            q,
            gain_db,
            coefficients: coefficients(kind, sample_rate, frequency, q, gain_db),
            state: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BiquadKind {
        self.kind
    }

    #[must_use]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[must_use]
    pub fn q(&self) -> f32 {
        self.q
    }

    #[must_use]
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn process(&mut self, samples: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if self.state.len() != channels {
            self.state = vec![[0.0; 2]; channels];
        }
        let c = self.coefficients;
        for frame in samples.chunks_exact_mut(channels) {
            for (sample, state) in frame.iter_mut().zip(self.state.iter_mut()) {
                let input = f64::from(*sample);
                let output = c.b0 * input + state[0];
                state[0] = c.b1 * input - c.a1 * output + state[1];
                state[1] = c.b2 * input - c.a2 * output;
                *sample = output as f32;
            }
        }
    }

    pub fn reset(&mut self) {
        self.state.iter_mut().for_each(|state| *state = [0.0; 2]);
    }

    /// Linear magnitude of the transfer function at `frequency`.
    #[must_use]
    pub fn magnitude_at(&self, frequency: f32) -> f64 {
        let w = 2.0 * PI * f64::from(frequency) / f64::from(self.sample_rate);
        let (cos1, sin1) = (w.cos(), w.sin());
        let (cos2, sin2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let c = self.coefficients;
        let num_re = c.b0 + c.b1 * cos1 + c.b2 * cos2;
        let num_im = -(c.b1 * sin1 + c.b2 * sin2);
        let den_re = 1.0 + c.a1 * cos1 + c.a2 * cos2;
        let den_im = -(c.a1 * sin1 + c.a2 * sin2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}

fn coefficients(
    kind: BiquadKind,
    sample_rate: u32,
    frequency: f32,
    q: f32,
    gain_db: f32,
) -> Coefficients {
    let w0 = 2.0 * PI * f64::from(frequency) / f64::from(sample_rate);
    let cos_w0 = w0.cos();
    let sin_w0 = w0.sin();
    let a = 10_f64.powf(f64::from(gain_db) / 40.0);
    let alpha = sin_w0 / (2.0 * f64::from(q));

    let (b0, b1, b2, a0, a1, a2) = match kind {
        BiquadKind::Lowpass => (
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        ),
        BiquadKind::Highpass => (
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        ),
        BiquadKind::Bandpass => (
            alpha,
            0.0,
            -alpha,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        ),
        BiquadKind::Peaking => (
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        ),
        BiquadKind::LowShelf => {
            // shelf slope S = 1
            let shelf_alpha = sin_w0 / 2.0 * 2_f64.sqrt();
            let two_sqrt_a_alpha = 2.0 * a.sqrt() * shelf_alpha;
            (
                a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
            )
        }
        BiquadKind::HighShelf => {
            let shelf_alpha = sin_w0 / 2.0 * 2_f64.sqrt();
            let two_sqrt_a_alpha = 2.0 * a.sqrt() * shelf_alpha;
            (
                a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
            )
        }
    };

    Coefficients {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// Feed-forward peak compressor with a quadratic soft knee. Channels are linked.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_sec: f32,
    release_sec: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope_db: f32,
}

impl Compressor {
    #[must_use]
    pub fn new(
        sample_rate: u32,
        threshold_db: f32,
        knee_db: f32,
        ratio: f32,
        attack_sec: f32,
        release_sec: f32,
    ) -> Self {
        let attack_sec = attack_sec.max(0.0);
        let release_sec = release_sec.max(0.0);
        Self {
            threshold_db,
            knee_db: knee_db.max(0.0),
            ratio: ratio.max(1.0),
            attack_sec,
            release_sec,
            attack_coeff: smoothing_coeff(attack_sec, sample_rate),
            release_coeff: smoothing_coeff(release_sec, sample_rate),
            envelope_db: 0.0,
        }
    }

    #[must_use]
    pub fn limiter(sample_rate: u32) -> Self {
        Self::new(
            sample_rate,
            LIMITER_THRESHOLD_DB,
            LIMITER_KNEE_DB,
            LIMITER_RATIO,
            LIMITER_ATTACK_SEC,
            LIMITER_RELEASE_SEC,
        )
    }

    #[must_use]
    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    #[must_use]
    pub fn knee_db(&self) -> f32 {
        self.knee_db
    }

    #[must_use]
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    #[must_use]
    pub fn attack_sec(&self) -> f32 {
        self.attack_sec
    }

    #[must_use]
    pub fn release_sec(&self) -> f32 {
        self.release_sec
    }

    /// Current gain reduction in dB (zero or negative).
    #[must_use]
    pub fn reduction_db(&self) -> f32 {
        self.envelope_db
    }

    /// Static input/output curve in dB.
    #[must_use]
    pub fn curve_db(&self, input_db: f32) -> f32 {
        let overshoot = input_db - self.threshold_db;
        let slope = 1.0 / self.ratio - 1.0;
        if self.knee_db > 0.0 && (2.0 * overshoot).abs() <= self.knee_db {
            let knee_position = overshoot + self.knee_db / 2.0;
            input_db + slope * knee_position * knee_position / (2.0 * self.knee_db)
        } else if overshoot > 0.0 {
            self.threshold_db + overshoot / self.ratio
        } else {
            input_db
        }
    }

    pub fn process(&mut self, samples: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in samples.chunks_exact_mut(channels) {
            let level = frame.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
            let input_db = linear_to_db(level);
            let target = self.curve_db(input_db) - input_db;
            let coeff = if target < self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = target + coeff * (self.envelope_db - target);
            let gain = db_to_linear(self.envelope_db);
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }

    pub fn reset(&mut self) {
        self.envelope_db = 0.0;
    }
}

fn smoothing_coeff(time_sec: f32, sample_rate: u32) -> f32 {
    if time_sec <= 0.0 || sample_rate == 0 {
        return 0.0;
    }
    (-1.0 / (time_sec * sample_rate as f32)).exp()
}
