//! Curve-lookup waveshaper.

use alloc::vec::Vec;
use libm::tanhf;

/// Maps input samples through a transfer curve.
///
/// The curve spans inputs from -1.0 (first entry) to 1.0 (last entry);
/// inputs in between are linearly interpolated and inputs outside are
/// clamped to the end points. An empty curve passes audio through.
///
/// # Example
///
/// ```rust
/// use dawg_core::{WaveShaperNode, soft_saturation_curve};
///
/// let shaper = WaveShaperNode::new(soft_saturation_curve(0.5, 1025));
/// assert!(shaper.process(0.0).abs() < 1e-6);
/// assert!(shaper.process(0.9) > 0.9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WaveShaperNode {
    curve: Vec<f32>,
}

impl WaveShaperNode {
    /// Create a shaper with the given transfer curve.
    pub fn new(curve: Vec<f32>) -> Self {
        Self { curve }
    }

    /// Replace the transfer curve.
    pub fn set_curve(&mut self, curve: Vec<f32>) {
        self.curve = curve;
    }

    /// Current transfer curve.
    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    /// Shape one sample.
    #[inline]
    pub fn process(&self, input: f32) -> f32 {
        let n = self.curve.len();
        match n {
            0 => input,
            1 => self.curve[0],
            _ => {
                let pos = (input.clamp(-1.0, 1.0) + 1.0) * 0.5 * (n - 1) as f32;
                let idx = (pos as usize).min(n - 2);
                let frac = pos - idx as f32;
                self.curve[idx] + (self.curve[idx + 1] - self.curve[idx]) * frac
            }
        }
    }
}

/// Build a tanh saturation curve.
///
/// `drive` (0.0–1.0) sets the pre-gain from 1× to 10×. The curve is
/// normalised so ±1.0 still maps to ±1.0.
pub fn soft_saturation_curve(drive: f32, len: usize) -> Vec<f32> {
    let len = len.max(2);
    let k = 1.0 + drive.clamp(0.0, 1.0) * 9.0;
    let norm = tanhf(k);
    (0..len)
        .map(|i| {
            let x = i as f32 / (len - 1) as f32 * 2.0 - 1.0;
            tanhf(k * x) / norm
        })
        .collect()
}
