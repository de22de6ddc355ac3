use serde::{Deserialize, Serialize};

use crate::model::{Position3d, SurroundMode};

/// LFE send is a fixed bed level, independent of placement.
pub const LFE_GAIN: u8 = 30;

/// Per-speaker gains in [0, 100]. Channels a layout does not have stay at 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelGains {
    pub front_left: u8,
    pub front_right: u8,
    pub center: u8,
    pub lfe: u8,
    pub surround_left: u8,
    pub surround_right: u8,
    pub side_left: u8,
    pub side_right: u8,
}

impl ChannelGains {
    /// Gains as 0..=1 multipliers in WAV channel order for `mode`.
    #[must_use]
    pub fn channel_multipliers(&self, mode: SurroundMode) -> Vec<f32> {
        let ordered: &[u8] = match mode {
            SurroundMode::Stereo => &[self.front_left, self.front_right],
            SurroundMode::Surround51 => &[
                self.front_left,
                self.front_right,
                self.center,
                self.lfe,
                self.surround_left,
                self.surround_right,
            ],
            SurroundMode::Surround71 => &[
                self.front_left,
                self.front_right,
                self.center,
                self.lfe,
                self.surround_left,
                self.surround_right,
                self.side_left,
                self.side_right,
            ],
        };
        ordered
            .iter()
            .map(|gain| f32::from(*gain) / 100.0)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpatialMix {
    Stereo { pan: f32 },
    Surround { gains: ChannelGains },
}

#[must_use]
pub fn spatialize(position: Position3d, mode: SurroundMode) -> SpatialMix {
    let position = position.clamped();
    match mode {
        SurroundMode::Stereo => SpatialMix::Stereo { pan: position.x },
        SurroundMode::Surround51 | SurroundMode::Surround71 => SpatialMix::Surround {
            gains: surround_gains(position, mode),
        },
    }
}

/// Height (`z`) has no speaker in these layouts and does not affect the result.
#[must_use]
pub fn surround_gains(position: Position3d, mode: SurroundMode) -> ChannelGains {
    let Position3d { x, y, .. } = position.clamped();
    let front = y.max(0.0);
    let rear = (-y).max(0.0);
    let left = (1.0 - x).max(0.0) * 0.5;
    let right = (1.0 + x).max(0.0) * 0.5;

    let mut gains = ChannelGains {
        front_left: to_gain(front * left),
        front_right: to_gain(front * right),
        center: to_gain(front * (1.0 - x.abs())),
        lfe: LFE_GAIN,
        surround_left: to_gain(rear * left),
        surround_right: to_gain(rear * right),
        side_left: 0,
        side_right: 0,
    };

    if mode == SurroundMode::Surround71 {
        // sides peak level with the listener; the far side keeps a quarter bleed
        let beside = 1.0 - y.abs();
        gains.side_left = to_gain(beside * (1.0 - x * 0.5) * 0.5);
        gains.side_right = to_gain(beside * (1.0 + x * 0.5) * 0.5);
    }

    gains
}

/// Linear pan law: unity on the near side, linear roll-off on the far side.
#[must_use]
pub fn linear_pan_gains(pan: f32) -> [f32; 2] {
    let pan = pan.clamp(-1.0, 1.0);
    [1.0 - pan.max(0.0), 1.0 + pan.min(0.0)]
}

fn to_gain(weight: f32) -> u8 {
    (weight * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_mode_pans_by_x() {
        assert_eq!(
            spatialize(Position3d::new(-0.4, 0.9, 0.5), SurroundMode::Stereo),
            SpatialMix::Stereo { pan: -0.4 }
        );
    }

    #[test]
    fn front_center_placement_in_five_one() {
        let gains = surround_gains(Position3d::new(0.0, 1.0, 0.0), SurroundMode::Surround51);
        assert!(gains.center > 0);
        assert!(gains.front_left > 0);
        assert_eq!(gains.front_left, gains.front_right);
        assert_eq!(gains.surround_left, 0);
        assert_eq!(gains.surround_right, 0);
        assert_eq!(gains.lfe, 30);
        assert_eq!(gains.side_left, 0);
    }

    #[test]
    fn hard_left_in_seven_one_favours_left_side() {
        let gains = surround_gains(Position3d::new(-1.0, 0.0, 0.0), SurroundMode::Surround71);
        assert!(gains.side_left > gains.side_right);
        assert!(gains.side_right > 0);
        assert_eq!(gains.center, 0);
    }

    #[test]
    fn rear_placement_feeds_surrounds_only() {
        let gains = surround_gains(Position3d::new(0.0, -1.0, 0.0), SurroundMode::Surround51);
        assert_eq!(gains.front_left, 0);
        assert_eq!(gains.center, 0);
        assert_eq!(gains.surround_left, 50);
        assert_eq!(gains.surround_right, 50);
    }

    #[test]
    fn multipliers_follow_layout_width() {
        let gains = surround_gains(Position3d::default(), SurroundMode::Surround71);
        assert_eq!(gains.channel_multipliers(SurroundMode::Stereo).len(), 2);
        assert_eq!(gains.channel_multipliers(SurroundMode::Surround51).len(), 6);
        let seven = gains.channel_multipliers(SurroundMode::Surround71);
        assert_eq!(seven.len(), 8);
        assert!((seven[3] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn linear_pan_is_unity_at_center() {
        assert_eq!(linear_pan_gains(0.0), [1.0, 1.0]);
        assert_eq!(linear_pan_gains(1.0), [0.0, 1.0]);
        assert_eq!(linear_pan_gains(-0.5), [1.0, 0.5]);
    }
}
