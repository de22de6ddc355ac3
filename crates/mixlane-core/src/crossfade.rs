use std::f32::consts::FRAC_PI_2;

use tracing::{debug, warn};

use crate::model::{CrossfadeConfig, CrossfadeCurve, CrossfadeState, CurvePoint};

/// Output volumes `(a, b)` for fade progress `p`; `a` is the outgoing side.
#[must_use]
pub fn crossfade_volumes(
    progress: f32,
    curve: CrossfadeCurve,
    custom_points: Option<&[CurvePoint]>,
) -> (f32, f32) {
    let p = if progress.is_finite() {
        progress.clamp(0.0, 1.0)
    } else {
        0.0
    };
    match curve {
        // equal_gain is kept as its own setting but currently shares the linear law
        CrossfadeCurve::Linear | CrossfadeCurve::EqualGain => (1.0 - p, p),
        // cos(pi/2) is slightly negative in f32
        CrossfadeCurve::EqualPower => (
            (p * FRAC_PI_2).cos().max(0.0),
            ((1.0 - p) * FRAC_PI_2).cos().max(0.0),
        ),
        CrossfadeCurve::Custom => match custom_points {
            Some(points) if points.len() >= 2 => (
                custom_curve_value(points, 1.0 - p),
                custom_curve_value(points, p),
            ),
            _ => (1.0 - p, p),
        },
    }
}

/// Piecewise-linear lookup over points sorted by input; outputs are forced non-decreasing.
#[must_use]
pub fn custom_curve_value(points: &[CurvePoint], x: f32) -> f32 {
    let mut sorted: Vec<CurvePoint> = points
        .iter()
        .copied()
        .filter(|point| point.input.is_finite() && point.output.is_finite())
        .collect();
    if sorted.is_empty() {
        return x.clamp(0.0, 1.0);
    }
    sorted.sort_by(|left, right| left.input.total_cmp(&right.input));

    let mut running = f32::NEG_INFINITY;
    for point in &mut sorted {
        point.output = point.output.clamp(0.0, 1.0).max(running);
        running = point.output;
    }

    let first = sorted[0];
    let last = sorted[sorted.len() - 1];
    if x <= first.input {
        return first.output;
    }
    if x >= last.input {
        return last.output;
    }

    sorted
        .windows(2)
        .find(|pair| x >= pair[0].input && x <= pair[1].input)
        .map_or(last.output, |pair| {
            let span = pair[1].input - pair[0].input;
            if span <= f32::EPSILON {
                return pair[1].output;
            }
            let t = (x - pair[0].input) / span;
            pair[0].output + (pair[1].output - pair[0].output) * t
        })
}

#[derive(Debug, Clone, Default)]
pub struct CrossfadeEngine {
    config: CrossfadeConfig,
    state: CrossfadeState,
}

impl CrossfadeEngine {
    #[must_use]
    pub fn config(&self) -> &CrossfadeConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> CrossfadeState {
        self.state
    }

    pub fn set_config(&mut self, config: CrossfadeConfig) -> CrossfadeState {
        if config.curve_type == CrossfadeCurve::Custom
            && config.custom_points.as_ref().is_none_or(|points| points.len() < 2)
        {
            warn!("custom crossfade without at least two points falls back to linear");
        }
        self.config = config;
        self.set_progress(self.state.progress)
    }

    /// Recomputes both volumes from `progress`; there is no internal clock.
    pub fn set_progress(&mut self, progress: f32) -> CrossfadeState {
        let (volume_a, volume_b) = crossfade_volumes(
            progress,
            self.config.curve_type,
            self.config.custom_points.as_deref(),
        );
        self.state = CrossfadeState {
            progress: if progress.is_finite() {
                progress.clamp(0.0, 1.0)
            } else {
                0.0
            },
            volume_a,
            volume_b,
        };
        debug!(
            progress = self.state.progress,
            volume_a, volume_b, "crossfade progress applied"
        );
        self.state
    }
}
