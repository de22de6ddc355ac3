use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    dsp::{db_to_linear, linear_to_db},
    model::{DuckingConfig, DuckingState},
};

const TIME_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuckPhase {
    #[default]
    Idle,
    Attacking,
    Held,
    Releasing,
}

/// Fraction of the target's level removed while fully ducked, in [0, 1].
///
/// The reduction is `duck_amount_db`, capped at `range_db`.
#[must_use]
pub fn normalized_duck_amount(config: &DuckingConfig) -> f32 {
    let reduction_db = config.duck_amount_db.abs().min(config.range_db.abs());
    if !reduction_db.is_finite() {
        return 0.0;
    }
    1.0 - db_to_linear(-reduction_db)
}

#[derive(Debug, Clone)]
pub struct DuckingEngine {
    config: DuckingConfig,
    phase: DuckPhase,
    level: f32,
    hold_remaining: f32,
    release_remaining: f32,
}

impl DuckingEngine {
    #[must_use]
    pub fn new(config: DuckingConfig) -> Self {
        Self {
            config,
            phase: DuckPhase::Idle,
            level: 1.0,
            hold_remaining: 0.0,
            release_remaining: 0.0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DuckingConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> DuckPhase {
        self.phase
    }

    #[must_use]
    pub fn level(&self) -> f32 {
        self.level
    }

    #[must_use]
    pub fn target_level(&self) -> f32 {
        1.0 - normalized_duck_amount(&self.config)
    }

    #[must_use]
    pub fn state(&self) -> DuckingState {
        DuckingState {
            current_duck_level: self.level,
            is_active: self.phase != DuckPhase::Idle,
            release_time_remaining: self.release_remaining,
        }
    }

    pub fn reset(&mut self) {
        self.phase = DuckPhase::Idle;
        self.level = 1.0;
        self.hold_remaining = 0.0;
        self.release_remaining = 0.0;
    }

    /// Advances the machine by `dt` seconds given the trigger's RMS (linear) and returns the duck level.
    pub fn update(&mut self, trigger_rms: f32, dt: f32) -> f32 {
        if !self.config.enabled {
            self.reset();
            return self.level;
        }

        let above = linear_to_db(trigger_rms) >= self.config.threshold_db;
        if above {
            self.hold_remaining = self.config.hold_sec.max(0.0);
        }

        let target = self.target_level();
        let depth = 1.0 - target;
        let mut remaining = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        loop {
            match self.phase {
                DuckPhase::Idle => {
                    if !above {
                        break;
                    }
                    self.transition(DuckPhase::Attacking);
                }
                DuckPhase::Attacking => {
                    let attack = self.config.attack_sec.max(0.0);
                    if attack <= TIME_EPSILON || depth <= TIME_EPSILON {
                        self.level = target;
                        self.transition(DuckPhase::Held);
                        continue;
                    }
                    let needed = (self.level - target).max(0.0) / depth * attack;
                    if remaining + TIME_EPSILON < needed {
                        self.level -= depth * remaining / attack;
                        break;
                    }
                    remaining -= needed.min(remaining);
                    self.level = target;
                    self.transition(DuckPhase::Held);
                }
                DuckPhase::Held => {
                    if above {
                        break;
                    }
                    if remaining + TIME_EPSILON < self.hold_remaining {
                        self.hold_remaining -= remaining;
                        break;
                    }
                    remaining -= self.hold_remaining.min(remaining);
                    self.hold_remaining = 0.0;
                    let release = self.config.release_sec.max(0.0);
                    self.release_remaining = if depth <= TIME_EPSILON {
                        0.0
                    } else {
                        release * (1.0 - self.level) / depth
                    };
                    self.transition(DuckPhase::Releasing);
                }
                DuckPhase::Releasing => {
                    if above {
                        self.release_remaining = 0.0;
                        self.transition(DuckPhase::Attacking);
                        continue;
                    }
                    let release = self.config.release_sec.max(0.0);
                    if remaining + TIME_EPSILON < self.release_remaining && release > TIME_EPSILON
                    {
                        self.release_remaining -= remaining;
                        self.level = 1.0 - depth * self.release_remaining / release;
                        break;
                    }
                    self.release_remaining = 0.0;
                    self.level = 1.0;
                    self.transition(DuckPhase::Idle);
                    break;
                }
            }
        }

        self.level
    }

    fn transition(&mut self, next: DuckPhase) {
        if self.phase == next {
            return;
        }
        debug!(from = ?self.phase, to = ?next, level = self.level, "ducking phase change");
        if next == DuckPhase::Attacking && self.phase == DuckPhase::Idle {
            info!(target_track_id = %self.config.target_track_id, "ducking engaged");
        }
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DuckingEngine {
        DuckingEngine::new(DuckingConfig {
            enabled: true,
            threshold_db: -30.0,
            duck_amount_db: 12.0,
            attack_sec: 0.1,
            release_sec: 0.5,
            hold_sec: 0.2,
            range_db: 24.0,
            ..DuckingConfig::default()
        })
    }

    #[test]
    fn range_caps_reduction() {
        let mut config = engine().config().clone();
        config.duck_amount_db = 40.0;
        config.range_db = 6.0;
        let expected = 1.0 - db_to_linear(-6.0);
        assert!((normalized_duck_amount(&config) - expected).abs() < 1e-6);
    }

    #[test]
    fn attack_ramps_linearly_toward_target() {
        let mut duck = engine();
        let target = duck.target_level();
        let halfway = duck.update(0.5, 0.05);
        assert_eq!(duck.phase(), DuckPhase::Attacking);
        assert!((halfway - (1.0 + target) / 2.0).abs() < 1e-5);
        let settled = duck.update(0.5, 0.05);
        assert_eq!(duck.phase(), DuckPhase::Held);
        assert_eq!(settled, target);
    }

    #[test]
    fn quiet_trigger_keeps_idle() {
        let mut duck = engine();
        assert_eq!(duck.update(0.001, 1.0), 1.0);
        assert_eq!(duck.phase(), DuckPhase::Idle);
        assert!(!duck.state().is_active);
    }

    #[test]
    fn hold_delays_release() {
        let mut duck = engine();
        duck.update(0.5, 0.2);
        duck.update(0.0, 0.15);
        assert_eq!(duck.phase(), DuckPhase::Held);
        duck.update(0.0, 0.1);
        assert_eq!(duck.phase(), DuckPhase::Releasing);
    }

    #[test]
    fn release_returns_to_unity_over_exactly_release_sec() {
        let mut duck = engine();
        let target = duck.target_level();
        duck.update(0.5, 0.1);
        assert_eq!(duck.phase(), DuckPhase::Held);
        duck.update(0.0, 0.2);
        assert_eq!(duck.phase(), DuckPhase::Releasing);
        assert!((duck.level() - target).abs() < 1e-5);

        let halfway = duck.update(0.0, 0.25);
        assert!((halfway - (1.0 + target) / 2.0).abs() < 1e-4);
        let almost = duck.update(0.0, 0.24);
        assert_eq!(duck.phase(), DuckPhase::Releasing);
        assert!(almost > halfway && almost < 1.0);

        assert_eq!(duck.update(0.0, 0.01), 1.0);
        assert_eq!(duck.phase(), DuckPhase::Idle);
    }

    #[test]
    fn retrigger_during_release_attacks_from_current_level() {
        let mut duck = engine();
        duck.update(0.5, 0.2);
        duck.update(0.0, 0.2);
        let partial = duck.update(0.0, 0.25);
        assert_eq!(duck.phase(), DuckPhase::Releasing);
        assert!(partial < 1.0 && partial > duck.target_level());
        let reattacked = duck.update(0.5, 0.01);
        assert_eq!(duck.phase(), DuckPhase::Attacking);
        assert!(reattacked < partial);
    }

    #[test]
    fn disabled_config_forces_unity() {
        let mut duck = engine();
        duck.update(0.5, 0.2);
        duck.config.enabled = false;
        assert_eq!(duck.update(0.5, 0.01), 1.0);
        assert_eq!(duck.phase(), DuckPhase::Idle);
    }
}
