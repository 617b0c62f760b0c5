//! Resonant filter node.
//!
//! A 2-pole (12 dB/oct) state-variable filter using the Topology-Preserving
//! Transform after Zavalishin, "The Art of VA Filter Design". The TPT form
//! stays stable while cutoff is swept every sample, which is exactly what
//! envelope and LFO modulation do to it.
//!
//! Left and right channels keep separate integrator state and share
//! coefficients.

use core::f32::consts::PI;
use libm::tanf;

use crate::automation::AutomationParam;
use crate::math::{clamp_finite, flush_denormal};

/// Lowest cutoff the filter accepts, in Hz.
pub const MIN_CUTOFF: f32 = 20.0;
/// Highest cutoff the filter accepts, in Hz.
pub const MAX_CUTOFF: f32 = 20000.0;
/// Lowest resonance (Q).
pub const MIN_Q: f32 = 0.1;
/// Highest resonance (Q).
pub const MAX_Q: f32 = 30.0;

/// Filter response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FilterKind {
    /// Passes frequencies below the cutoff.
    #[default]
    Lowpass,
    /// Passes frequencies above the cutoff.
    Highpass,
    /// Passes frequencies near the cutoff.
    Bandpass,
    /// Rejects frequencies near the cutoff.
    Notch,
}

#[derive(Debug, Clone, Copy, Default)]
struct SvfState {
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfState {
    #[inline]
    fn tick(&mut self, input: f32, g: f32, k: f32, kind: FilterKind) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = (g * v3 + self.ic1eq) / (1.0 + g * (g + k));
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = flush_denormal(2.0 * v1 - self.ic1eq);
        self.ic2eq = flush_denormal(2.0 * v2 - self.ic2eq);

        let lp = v2;
        let bp = v1;
        let hp = input - k * v1 - v2;
        match kind {
            FilterKind::Lowpass => lp,
            FilterKind::Highpass => hp,
            FilterKind::Bandpass => bp,
            FilterKind::Notch => lp + hp,
        }
    }
}

/// Stereo state-variable filter with automatable cutoff and Q.
///
/// ## Parameters
///
/// - `frequency`: cutoff in Hz (20.0 to 20000.0, further limited to 0.49 × sample rate)
/// - `q`: resonance (0.1 to 30.0)
///
/// # Example
///
/// ```rust
/// use dawg_core::{FilterKind, FilterNode};
///
/// let mut filter = FilterNode::new(48000.0, FilterKind::Lowpass);
/// filter.frequency.set_immediate(500.0, 0.0);
/// let (l, r) = filter.process_stereo(0.0, 1.0, 1.0, 0.0, 0.0);
/// assert!(l > 0.0 && (l - r).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct FilterNode {
    /// Cutoff frequency in Hz.
    pub frequency: AutomationParam,
    /// Resonance.
    pub q: AutomationParam,
    kind: FilterKind,
    sample_rate: f32,
    left: SvfState,
    right: SvfState,
    cached: (f32, f32),
    g: f32,
    k: f32,
}

impl FilterNode {
    /// Create a filter at 1 kHz, Q 0.707.
    pub fn new(sample_rate: f32, kind: FilterKind) -> Self {
        let mut filter = Self {
            frequency: AutomationParam::new(1000.0, MIN_CUTOFF, MAX_CUTOFF),
            q: AutomationParam::new(0.707, MIN_Q, MAX_Q),
            kind,
            sample_rate,
            left: SvfState::default(),
            right: SvfState::default(),
            cached: (f32::NAN, f32::NAN),
            g: 0.0,
            k: 0.0,
        };
        filter.update_coefficients(1000.0, 0.707);
        filter
    }

    /// Current response type.
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Change response type.
    pub fn set_kind(&mut self, kind: FilterKind) {
        self.kind = kind;
    }

    /// Clear integrator state on both channels.
    pub fn reset(&mut self) {
        self.left = SvfState::default();
        self.right = SvfState::default();
    }

    /// Cutoff at `time` plus an offset, clamped to the usable range.
    pub fn cutoff_at(&self, time: f64, offset: f32) -> f32 {
        clamp_finite(
            self.frequency.value_at(time) + offset,
            MIN_CUTOFF,
            MAX_CUTOFF.min(self.sample_rate * 0.49),
        )
    }

    /// Q at `time` plus an offset, clamped to the usable range.
    pub fn q_at(&self, time: f64, offset: f32) -> f32 {
        clamp_finite(self.q.value_at(time) + offset, MIN_Q, MAX_Q)
    }

    /// Filter one stereo frame.
    #[inline]
    pub fn process_stereo(
        &mut self,
        time: f64,
        left: f32,
        right: f32,
        cutoff_offset: f32,
        q_offset: f32,
    ) -> (f32, f32) {
        let cutoff = self.cutoff_at(time, cutoff_offset);
        let q = self.q_at(time, q_offset);
        self.update_coefficients(cutoff, q);
        (
            self.left.tick(left, self.g, self.k, self.kind),
            self.right.tick(right, self.g, self.k, self.kind),
        )
    }

    fn update_coefficients(&mut self, cutoff: f32, q: f32) {
        if self.cached == (cutoff, q) {
            return;
        }
        self.cached = (cutoff, q);
        self.g = tanf(PI * cutoff / self.sample_rate);
        self.k = 1.0 / q;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libm::sinf;

    const SR: f32 = 48000.0;

    fn rms_through(filter: &mut FilterNode, freq: f32) -> f32 {
        let n = 9600;
        let mut sum = 0.0;
        for i in 0..n {
            let t = i as f64 / f64::from(SR);
            let x = sinf(2.0 * PI * freq * i as f32 / SR);
            let (l, _) = filter.process_stereo(t, x, x, 0.0, 0.0);
            if i >= n / 2 {
                sum += l * l;
            }
        }
        libm::sqrtf(sum / (n / 2) as f32)
    }

    #[test]
    fn test_lowpass_attenuates_high_frequencies() {
        let mut filter = FilterNode::new(SR, FilterKind::Lowpass);
        filter.frequency.set_immediate(500.0, 0.0);
        let low = rms_through(&mut filter, 100.0);
        filter.reset();
        let high = rms_through(&mut filter, 8000.0);
        assert!(high < low * 0.1, "low {low}, high {high}");
    }

    #[test]
    fn test_highpass_attenuates_low_frequencies() {
        let mut filter = FilterNode::new(SR, FilterKind::Highpass);
        filter.frequency.set_immediate(4000.0, 0.0);
        let low = rms_through(&mut filter, 100.0);
        filter.reset();
        let high = rms_through(&mut filter, 12000.0);
        assert!(low < high * 0.1, "low {low}, high {high}");
    }

    #[test]
    fn test_cutoff_offset_is_clamped() {
        let mut filter = FilterNode::new(SR, FilterKind::Lowpass);
        filter.frequency.set_immediate(1000.0, 0.0);
        assert_eq!(filter.cutoff_at(0.0, -5000.0), MIN_CUTOFF);
        assert_eq!(filter.cutoff_at(0.0, 50000.0), MAX_CUTOFF);
        assert_eq!(filter.q_at(0.0, 100.0), MAX_Q);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut filter = FilterNode::new(SR, FilterKind::Lowpass);
        for i in 0..100 {
            let (_, r) = filter.process_stereo(i as f64 / f64::from(SR), 1.0, 0.0, 0.0, 0.0);
            assert_eq!(r, 0.0);
        }
    }
}
