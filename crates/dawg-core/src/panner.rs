//! Constant-power stereo panner.

use core::f32::consts::FRAC_PI_2;
use libm::{cosf, sinf};

use crate::automation::AutomationParam;

/// Equal-power panner for mono and stereo inputs.
///
/// Mono input is placed with `angle = (pan + 1) / 2 * π/2`, so the summed
/// power is constant across the field. Stereo input is balanced: panning
/// left folds part of the right channel into the left and vice versa.
///
/// # Example
///
/// ```rust
/// use dawg_core::PannerNode;
///
/// let panner = PannerNode::new();
/// let (l, r) = panner.process_mono(0.0, 1.0, 0.0);
/// assert!((l * l + r * r - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct PannerNode {
    /// Position from -1.0 (left) to 1.0 (right).
    pub pan: AutomationParam,
}

impl Default for PannerNode {
    fn default() -> Self {
        Self::new()
    }
}

impl PannerNode {
    /// Create a centred panner.
    pub fn new() -> Self {
        Self {
            pan: AutomationParam::new(0.0, -1.0, 1.0),
        }
    }

    /// Create a panner fixed at `pan`.
    pub fn fixed(pan: f32) -> Self {
        let mut panner = Self::new();
        panner.pan.set_immediate(pan.clamp(-1.0, 1.0), 0.0);
        panner
    }

    /// Pan position at `time` plus an offset, clamped to [-1, 1].
    pub fn pan_at(&self, time: f64, offset: f32) -> f32 {
        (self.pan.value_at(time) + offset).clamp(-1.0, 1.0)
    }

    /// Place a mono sample in the stereo field.
    #[inline]
    pub fn process_mono(&self, time: f64, input: f32, offset: f32) -> (f32, f32) {
        let (gl, gr) = mono_gains(self.pan_at(time, offset));
        (input * gl, input * gr)
    }

    /// Balance a stereo frame.
    #[inline]
    pub fn process_stereo(&self, time: f64, left: f32, right: f32, offset: f32) -> (f32, f32) {
        let pan = self.pan_at(time, offset);
        if pan <= 0.0 {
            let x = (pan + 1.0) * FRAC_PI_2;
            (left + right * cosf(x), right * sinf(x))
        } else {
            let x = pan * FRAC_PI_2;
            (left * cosf(x), right + left * sinf(x))
        }
    }
}

/// Left/right gains for a mono source at `pan`.
#[inline]
pub fn mono_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5 * FRAC_PI_2;
    (cosf(angle), sinf(angle))
}
