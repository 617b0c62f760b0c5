//! Band-limited oscillator node.
//!
//! Uses PolyBLEP (Polynomial Band-Limited Step) correction on the sawtooth
//! and square discontinuities. Frequency and detune are automation
//! parameters, so glides and pitch envelopes are scheduled rather than
//! stepped by the caller.

use core::f32::consts::PI;
use libm::{floorf, sinf};

use crate::automation::AutomationParam;
use crate::math::cents_to_ratio;
use crate::node::Lifecycle;

/// Lowest and highest frequency an oscillator will run at.
pub const MIN_FREQUENCY: f32 = 0.0;
/// Upper bound of the frequency parameter.
pub const MAX_FREQUENCY: f32 = 24000.0;
/// Detune parameter range in cents.
pub const DETUNE_RANGE: f32 = 4800.0;

/// Periodic waveform of an [`OscillatorNode`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Waveform {
    /// Pure fundamental.
    #[default]
    Sine,
    /// Odd harmonics, soft.
    Triangle,
    /// All harmonics, bright.
    Sawtooth,
    /// Odd harmonics, hollow (50% duty cycle).
    Square,
}

impl Waveform {
    /// Lowercase name used in presets.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Triangle => "triangle",
            Self::Sawtooth => "sawtooth",
            Self::Square => "square",
        }
    }
}

/// Scheduled oscillator.
///
/// The effective frequency at time `t` is
/// `(frequency(t) + frequency_offset) * 2^((detune(t) + detune_offset) / 1200)`,
/// where the offsets are supplied per sample by the caller (LFOs, pitch bend).
///
/// # Example
///
/// ```rust
/// use dawg_core::{OscillatorNode, Waveform};
///
/// let mut osc = OscillatorNode::new(48000.0, Waveform::Sawtooth);
/// osc.frequency.set_immediate(220.0, 0.0);
/// osc.start(0.0);
/// osc.stop(1.0);
///
/// let s = osc.render(0.0, 0.0, 0.0);
/// assert!(s.abs() <= 1.5);
/// assert_eq!(osc.render(1.5, 0.0, 0.0), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct OscillatorNode {
    /// Base frequency in Hz.
    pub frequency: AutomationParam,
    /// Detune in cents.
    pub detune: AutomationParam,
    waveform: Waveform,
    sample_rate: f32,
    phase: f32,
    initial_phase: f32,
    lifecycle: Lifecycle,
}

impl OscillatorNode {
    /// Create a stopped oscillator at 440 Hz.
    pub fn new(sample_rate: f32, waveform: Waveform) -> Self {
        Self {
            frequency: AutomationParam::new(440.0, MIN_FREQUENCY, MAX_FREQUENCY),
            detune: AutomationParam::new(0.0, -DETUNE_RANGE, DETUNE_RANGE),
            waveform,
            sample_rate,
            phase: 0.0,
            initial_phase: 0.0,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Start the waveform at `phase` (0.0–1.0) instead of zero.
    pub fn with_phase(mut self, phase: f32) -> Self {
        self.initial_phase = wrap_phase(phase);
        self.phase = self.initial_phase;
        self
    }

    /// Current waveform.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Change waveform. Takes effect on the next sample.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Schedule the oscillator to begin at `time`.
    pub fn start(&mut self, time: f64) {
        self.phase = self.initial_phase;
        self.lifecycle.start(time);
    }

    /// Schedule the oscillator to end at `time`. Ignored after disposal.
    pub fn stop(&mut self, time: f64) {
        self.lifecycle.stop(time);
    }

    /// Drop a pending stop.
    pub fn cancel_stop(&mut self) {
        self.lifecycle.cancel_stop();
    }

    /// Tear down permanently. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.lifecycle.dispose();
        self.frequency.clear();
        self.detune.clear();
    }

    /// Playback window.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Effective frequency in Hz at `time` with the given offsets applied.
    pub fn frequency_at(&self, time: f64, frequency_offset: f32, detune_offset: f32) -> f32 {
        let base = self.frequency.value_at(time) + frequency_offset;
        let cents = self.detune.value_at(time) + detune_offset;
        (base * cents_to_ratio(cents)).clamp(MIN_FREQUENCY, MAX_FREQUENCY)
    }

    /// Produce the sample at `time` and advance the phase by one sample.
    ///
    /// Returns silence outside the playback window.
    #[inline]
    pub fn render(&mut self, time: f64, frequency_offset: f32, detune_offset: f32) -> f32 {
        if !self.lifecycle.is_playing(time) {
            return 0.0;
        }
        let dt = (self.frequency_at(time, frequency_offset, detune_offset) / self.sample_rate)
            .min(0.5);
        let out = sample_at(self.waveform, self.phase, dt);
        self.phase = wrap_phase(self.phase + dt);
        out
    }
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let r = phase - floorf(phase);
    if r >= 1.0 { 0.0 } else { r }
}

#[inline]
fn sample_at(waveform: Waveform, phase: f32, dt: f32) -> f32 {
    match waveform {
        Waveform::Sine => sinf(phase * 2.0 * PI),
        Waveform::Sawtooth => 2.0 * phase - 1.0 - poly_blep(phase, dt),
        Waveform::Square => {
            let naive = if phase < 0.5 { 1.0 } else { -1.0 };
            naive + poly_blep(phase, dt) - poly_blep(wrap_phase(phase + 0.5), dt)
        }
        Waveform::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
    }
}

/// 4th-order PolyBLEP residual.
///
/// C²-continuous piecewise polynomial spanning two samples either side of
/// the discontinuity.
#[inline]
fn poly_blep(t: f32, dt: f32) -> f32 {
    const A4: f32 = -43.0 / 48.0;
    const A3: f32 = 7.0 / 6.0;
    const A2: f32 = 0.5;
    const A0: f32 = -1.0;
    const C: f32 = -11.0 / 48.0;

    if dt <= 0.0 {
        return 0.0;
    }
    let dt2 = 2.0 * dt;
    let piece = |n: f32| {
        if n < 1.0 {
            let n2 = n * n;
            A4 * n2 * n2 + A3 * n2 * n + A2 * n2 + A0
        } else {
            let u = 2.0 - n;
            let u2 = u * u;
            C * u2 * u2
        }
    };
    if t < dt2 {
        piece(t / dt)
    } else if t > 1.0 - dt2 {
        -piece((1.0 - t) / dt)
    } else {
        0.0
    }
}
