//! Automatable gain stage.

use crate::automation::AutomationParam;

/// Multiplies its input by a scheduled gain.
///
/// # Example
///
/// ```rust
/// use dawg_core::GainNode;
///
/// let mut amp = GainNode::new(1.0);
/// amp.gain.set_immediate(0.5, 0.0);
/// assert_eq!(amp.process(0.0, 1.0, 0.0), 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct GainNode {
    /// Linear gain.
    pub gain: AutomationParam,
}

impl GainNode {
    /// Create a gain node. The gain parameter is allowed to range 0–`max`.
    pub fn new(max: f32) -> Self {
        Self {
            gain: AutomationParam::new(1.0, 0.0, max),
        }
    }

    /// Gain at `time` plus an external offset, floored at zero.
    #[inline]
    pub fn gain_at(&self, time: f64, offset: f32) -> f32 {
        (self.gain.value_at(time) + offset).max(0.0)
    }

    /// Scale one sample.
    #[inline]
    pub fn process(&self, time: f64, input: f32, offset: f32) -> f32 {
        input * self.gain_at(time, offset)
    }

    /// Scale a stereo pair.
    #[inline]
    pub fn process_stereo(&self, time: f64, left: f32, right: f32, offset: f32) -> (f32, f32) {
        let g = self.gain_at(time, offset);
        (left * g, right * g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_follows_ramp() {
        let mut amp = GainNode::new(1.0);
        amp.gain.set_immediate(0.0, 0.0);
        amp.gain.ramp_linear(1.0, 1.0);
        assert!((amp.process(0.5, 2.0, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_offset_floors_at_zero() {
        let amp = GainNode::new(1.0);
        assert_eq!(amp.process(0.0, 1.0, -3.0), 0.0);
        let (l, r) = amp.process_stereo(0.0, 1.0, -1.0, -0.5);
        assert_eq!((l, r), (0.5, -0.5));
    }
}
