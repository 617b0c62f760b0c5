//! DADSRH envelope generator.
//!
//! The envelope does not produce samples itself. [`Envelope::trigger`] and
//! [`Envelope::release`] write a contour onto an [`AutomationParam`], and
//! remember enough about it that [`Envelope::value_at`] can reconstruct the
//! scheduled value at any instant. Modulation sources poll that value
//! instead of reading the parameter back.
//!
//! # Stages
//!
//! ```text
//!  peak ─────────┐     ┌─hold─┐
//!               /│     │      │╲ decay
//!              / │     │      │  ╲_________ sustain
//!             /  │     │      │            │╲ release
//!  base ─────/   │     │      │            │  ╲____
//!       delay attack                    note off
//! ```
//!
//! Attack, decay and release last at least [`MIN_STAGE_SECONDS`], so stage
//! boundaries are strictly increasing in time once triggered.

use serde::{Deserialize, Serialize};

use dawg_core::AutomationParam;
use dawg_core::automation::{MIN_EXPONENTIAL, exponential_interpolate};

/// Shortest attack, decay or release.
pub const MIN_STAGE_SECONDS: f64 = 0.001;

/// Shape of the attack, decay and release ramps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeCurve {
    /// Straight-line ramps.
    #[default]
    Linear,
    /// Exponential ramps. Levels are floored just above zero.
    Exponential,
}

/// Envelope settings. Times are in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeParams {
    /// Time held at the base level before the attack starts.
    pub delay: f32,
    /// Time from base to peak.
    pub attack: f32,
    /// Time held at peak after the attack.
    pub hold: f32,
    /// Time from peak to sustain.
    pub decay: f32,
    /// Sustain level as a fraction of the peak excursion (0.0–1.0).
    pub sustain: f32,
    /// Time from the release point back to base.
    pub release: f32,
    /// How strongly velocity scales the peak (0.0–1.0).
    pub velocity_sensitivity: f32,
    /// Ramp shape.
    pub curve: EnvelopeCurve,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            delay: 0.0,
            attack: 0.01,
            hold: 0.0,
            decay: 0.2,
            sustain: 0.7,
            release: 0.3,
            velocity_sensitivity: 0.5,
            curve: EnvelopeCurve::Linear,
        }
    }
}

impl EnvelopeParams {
    /// Copy with every field forced into its valid range.
    pub fn sanitized(&self) -> Self {
        let time = |t: f32| if t.is_finite() { t.max(0.0) } else { 0.0 };
        Self {
            delay: time(self.delay),
            attack: time(self.attack),
            hold: time(self.hold),
            decay: time(self.decay),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: time(self.release),
            velocity_sensitivity: self.velocity_sensitivity.clamp(0.0, 1.0),
            curve: self.curve,
        }
    }
}

/// Scale applied to the peak excursion for a given velocity.
///
/// `1 - s + s * velocity / 127`, so full velocity always yields 1.0.
pub fn velocity_factor(sensitivity: f32, velocity: u8) -> f32 {
    let s = sensitivity.clamp(0.0, 1.0);
    1.0 - s + s * (f32::from(velocity.min(127)) / 127.0)
}

/// Where an envelope is at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Never triggered.
    Idle,
    /// Waiting out the delay at base level.
    Delay,
    /// Rising toward peak.
    Attack,
    /// Held at peak.
    Hold,
    /// Falling toward sustain.
    Decay,
    /// Held at sustain until release.
    Sustain,
    /// Falling back toward base after note off.
    Release,
    /// Release complete.
    Finished,
}

#[derive(Clone, Copy, Debug)]
struct Contour {
    start: f32,
    peak: f32,
    sustain: f32,
    trigger_time: f64,
    attack_start: f64,
    attack_end: f64,
    hold_end: f64,
    decay_end: f64,
}

#[derive(Clone, Copy, Debug)]
struct ReleaseSegment {
    from: f32,
    to: f32,
    start: f64,
    end: f64,
}

/// DADSRH envelope bound to whichever parameter it is triggered on.
///
/// # Example
///
/// ```rust
/// use dawg_core::AutomationParam;
/// use dawg_synth::{Envelope, EnvelopeParams};
///
/// let mut gain = AutomationParam::new(0.0, 0.0, 1.0);
/// let mut env = Envelope::new(EnvelopeParams {
///     attack: 0.1,
///     decay: 0.1,
///     sustain: 0.5,
///     velocity_sensitivity: 0.0,
///     ..EnvelopeParams::default()
/// });
///
/// env.trigger(&mut gain, 0.0, 1.0, 127);
/// assert!((env.value_at(0.1) - 1.0).abs() < 1e-6);
/// assert!((gain.value_at(0.3) - 0.5).abs() < 1e-6);
///
/// let end = env.release(&mut gain, 1.0, None);
/// assert!((end - 1.3).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct Envelope {
    params: EnvelopeParams,
    base: f32,
    contour: Option<Contour>,
    release: Option<ReleaseSegment>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(EnvelopeParams::default())
    }
}

impl Envelope {
    /// Create an idle envelope.
    pub fn new(params: EnvelopeParams) -> Self {
        Self {
            params: params.sanitized(),
            base: 0.0,
            contour: None,
            release: None,
        }
    }

    /// Current settings.
    pub fn params(&self) -> &EnvelopeParams {
        &self.params
    }

    /// Replace settings. Applies from the next trigger or release.
    pub fn set_params(&mut self, params: EnvelopeParams) {
        self.params = params.sanitized();
    }

    /// Trigger from zero toward `peak`.
    pub fn trigger(&mut self, target: &mut AutomationParam, time: f64, peak: f32, velocity: u8) {
        self.trigger_from(target, time, 0.0, peak, velocity);
    }

    /// Trigger from `base` toward `peak`.
    ///
    /// Velocity scales the excursion `peak - base`. Any automation already
    /// scheduled on `target` after `time` is cancelled first.
    pub fn trigger_from(
        &mut self,
        target: &mut AutomationParam,
        time: f64,
        base: f32,
        peak: f32,
        velocity: u8,
    ) {
        let p = self.params;
        let adjusted = base + (peak - base) * velocity_factor(p.velocity_sensitivity, velocity);
        let sustain = base + (adjusted - base) * p.sustain;

        let attack_start = time + f64::from(p.delay);
        let attack_end = attack_start + f64::from(p.attack).max(MIN_STAGE_SECONDS);
        let hold_end = attack_end + f64::from(p.hold);
        let decay_end = hold_end + f64::from(p.decay).max(MIN_STAGE_SECONDS);

        let contour = Contour {
            start: self.floor(base),
            peak: self.floor(adjusted),
            sustain: self.floor(sustain),
            trigger_time: time,
            attack_start,
            attack_end,
            hold_end,
            decay_end,
        };

        target.cancel_and_hold(time);
        target.set_immediate(contour.start, time);
        if attack_start > time {
            target.set_immediate(contour.start, attack_start);
        }
        self.ramp(target, contour.peak, attack_end);
        if hold_end > attack_end {
            target.set_immediate(contour.peak, hold_end);
        }
        self.ramp(target, contour.sustain, decay_end);

        self.base = base;
        self.contour = Some(contour);
        self.release = None;
    }

    /// Release from `time`, ramping back to the base level.
    ///
    /// Scheduled changes on `target` after `time` are cancelled and the curve
    /// is re-anchored at `current` (or the envelope's own value at `time`
    /// when `None`). Returns the absolute time the release completes.
    pub fn release(&mut self, target: &mut AutomationParam, time: f64, current: Option<f32>) -> f64 {
        let from = self.floor(current.unwrap_or_else(|| self.value_at(time)));
        let to = self.floor(self.base);
        let end = time + f64::from(self.params.release).max(MIN_STAGE_SECONDS);

        target.cancel_and_hold(time);
        target.set_immediate(from, time);
        self.ramp(target, to, end);

        self.release = Some(ReleaseSegment {
            from,
            to,
            start: time,
            end,
        });
        end
    }

    /// Forget the current note. The next value is the base level.
    pub fn reset(&mut self) {
        self.contour = None;
        self.release = None;
    }

    /// Value the scheduled contour has at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        if let Some(r) = self.release {
            if time >= r.start {
                return self.interpolate(r.from, r.to, r.start, r.end, time);
            }
        }
        let Some(c) = self.contour else {
            return self.floor(self.base);
        };
        if time < c.attack_start {
            c.start
        } else if time < c.attack_end {
            self.interpolate(c.start, c.peak, c.attack_start, c.attack_end, time)
        } else if time < c.hold_end {
            c.peak
        } else if time < c.decay_end {
            self.interpolate(c.peak, c.sustain, c.hold_end, c.decay_end, time)
        } else {
            c.sustain
        }
    }

    /// Position of the current value within the peak excursion, 0.0–1.0.
    pub fn normalized_at(&self, time: f64) -> f32 {
        let Some(c) = self.contour else {
            return 0.0;
        };
        let span = c.peak - c.start;
        if span.abs() < f32::EPSILON {
            return 0.0;
        }
        ((self.value_at(time) - c.start) / span).clamp(0.0, 1.0)
    }

    /// Stage at `time`.
    pub fn stage_at(&self, time: f64) -> EnvelopeStage {
        if let Some(r) = self.release {
            if time >= r.end {
                return EnvelopeStage::Finished;
            }
            if time >= r.start {
                return EnvelopeStage::Release;
            }
        }
        let Some(c) = self.contour else {
            return EnvelopeStage::Idle;
        };
        if time < c.attack_start {
            EnvelopeStage::Delay
        } else if time < c.attack_end {
            EnvelopeStage::Attack
        } else if time < c.hold_end {
            EnvelopeStage::Hold
        } else if time < c.decay_end {
            EnvelopeStage::Decay
        } else {
            EnvelopeStage::Sustain
        }
    }

    /// Whether a release has been issued since the last trigger.
    pub fn is_releasing(&self) -> bool {
        self.release.is_some()
    }

    /// Whether the release has fully completed by `time`.
    pub fn is_finished(&self, time: f64) -> bool {
        self.release.is_some_and(|r| time >= r.end)
    }

    /// Absolute end time of the pending or completed release.
    pub fn release_end(&self) -> Option<f64> {
        self.release.map(|r| r.end)
    }

    /// Time of the last trigger.
    pub fn trigger_time(&self) -> Option<f64> {
        self.contour.map(|c| c.trigger_time)
    }

    /// Absolute time the attack reaches its peak.
    pub fn attack_end(&self) -> Option<f64> {
        self.contour.map(|c| c.attack_end)
    }

    /// Absolute time the decay reaches sustain.
    pub fn decay_end(&self) -> Option<f64> {
        self.contour.map(|c| c.decay_end)
    }

    /// Velocity-adjusted peak of the last trigger.
    pub fn peak_level(&self) -> Option<f32> {
        self.contour.map(|c| c.peak)
    }

    /// Sustain level of the last trigger.
    pub fn sustain_level(&self) -> Option<f32> {
        self.contour.map(|c| c.sustain)
    }

    fn floor(&self, value: f32) -> f32 {
        match self.params.curve {
            EnvelopeCurve::Linear => value,
            EnvelopeCurve::Exponential => value.max(MIN_EXPONENTIAL),
        }
    }

    fn ramp(&self, target: &mut AutomationParam, value: f32, time: f64) {
        match self.params.curve {
            EnvelopeCurve::Linear => target.ramp_linear(value, time),
            EnvelopeCurve::Exponential => target.ramp_exponential(value, time),
        }
    }

    fn interpolate(&self, v0: f32, v1: f32, t0: f64, t1: f64, time: f64) -> f32 {
        let span = t1 - t0;
        if span <= 0.0 || time >= t1 {
            return v1;
        }
        let f = ((time - t0) / span).clamp(0.0, 1.0);
        match self.params.curve {
            EnvelopeCurve::Linear => v0 + (v1 - v0) * f as f32,
            EnvelopeCurve::Exponential => exponential_interpolate(v0, v1, f),
        }
    }
}
