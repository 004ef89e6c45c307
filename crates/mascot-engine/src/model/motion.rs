use std::f64::consts::TAU;

use glam::Vec2;

/// Per-part pose produced by sampling motions at a point in time.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    pub translation: Vec2,
    pub scale: Vec2,
    pub opacity: f32,
    pub visible: bool,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        translation: Vec2::ZERO,
        scale: Vec2::ONE,
        opacity: 1.0,
        visible: true,
    };

    /// Stacks two poses: translations add, scales and opacities multiply.
    pub fn then(self, other: Pose) -> Pose {
        Pose {
            translation: self.translation + other.translation,
            scale: self.scale * other.scale,
            opacity: self.opacity * other.opacity,
            visible: self.visible && other.visible,
        }
    }

    /// Maps a rest-pose vertex, scaling about `pivot` before translating.
    #[inline]
    pub fn apply(&self, pivot: Vec2, p: Vec2) -> Vec2 {
        pivot + (p - pivot) * self.scale + self.translation
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Procedural animation attached to a mesh part.
///
/// Times are in seconds. A non-positive period or interval disables the
/// motion (it samples to [`Pose::IDENTITY`]).
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Motion {
    /// Sinusoidal translation; `phase` is a fraction of the period.
    Sway { amplitude: Vec2, period: f32, phase: f32 },
    /// Vertical stretch about the pivot.
    Breathe { amount: f32, period: f32 },
    /// Squashes the part flat once per `interval`, over `duration`.
    Blink { interval: f32, duration: f32 },
    /// Opacity oscillating between `min` and `max`.
    Pulse { min: f32, max: f32, period: f32 },
    /// Visible for `shown`, hidden for `hidden`, repeating.
    Flicker { shown: f32, hidden: f32 },
}

impl Motion {
    pub fn sample(&self, t: f64) -> Pose {
        match *self {
            Motion::Sway { amplitude, period, phase } => {
                if period <= 0.0 {
                    return Pose::IDENTITY;
                }
                let s = (TAU * (t / period as f64 + phase as f64)).sin() as f32;
                Pose {
                    translation: amplitude * s,
                    ..Pose::IDENTITY
                }
            }
            Motion::Breathe { amount, period } => {
                if period <= 0.0 {
                    return Pose::IDENTITY;
                }
                let s = (TAU * t / period as f64).sin() as f32;
                Pose {
                    scale: Vec2::new(1.0, 1.0 + amount * s),
                    ..Pose::IDENTITY
                }
            }
            Motion::Blink { interval, duration } => {
                if interval <= 0.0 || duration <= 0.0 {
                    return Pose::IDENTITY;
                }
                let duration = duration.min(interval) as f64;
                let into = t.rem_euclid(interval as f64) - (interval as f64 - duration);
                if into < 0.0 {
                    return Pose::IDENTITY;
                }
                // 1 -> 0 -> 1 across the blink window.
                let u = into / duration;
                let open = (1.0 - 2.0 * u).abs() as f32;
                Pose {
                    scale: Vec2::new(1.0, open),
                    ..Pose::IDENTITY
                }
            }
            Motion::Pulse { min, max, period } => {
                if period <= 0.0 {
                    return Pose::IDENTITY;
                }
                let s = 0.5 + 0.5 * (TAU * t / period as f64).sin() as f32;
                Pose {
                    opacity: (min + (max - min) * s).clamp(0.0, 1.0),
                    ..Pose::IDENTITY
                }
            }
            Motion::Flicker { shown, hidden } => {
                let cycle = (shown + hidden) as f64;
                if shown <= 0.0 || hidden < 0.0 || cycle <= 0.0 {
                    return Pose::IDENTITY;
                }
                Pose {
                    visible: t.rem_euclid(cycle) < shown as f64,
                    ..Pose::IDENTITY
                }
            }
        }
    }
}
