//! Scheduled parameter automation.
//!
//! An [`AutomationParam`] is a scalar whose value is a function of absolute
//! time. Callers schedule events (instant sets, linear ramps, exponential
//! ramps) and the renderer asks for the value at each sample time. Nothing is
//! stepped or smoothed internally: the curve is fully described by its event
//! list, so the value at any instant can be reconstructed exactly.
//!
//! # Ramp semantics
//!
//! A ramp event describes where the curve *arrives*. It starts from the
//! value and time of the event before it. A ramp with no preceding event
//! starts from the default value at time zero.
//!
//! Exponential ramps follow `v0 * (v1 / v0)^f`. They cannot cross or touch
//! zero, so targets are floored to [`MIN_EXPONENTIAL`] in magnitude, and a
//! ramp between values of opposite sign holds the start value until its end
//! time.

use alloc::vec::Vec;
use libm::pow;

/// Smallest magnitude an exponential ramp may target.
pub const MIN_EXPONENTIAL: f32 = 0.0001;

/// One scheduled change on a parameter timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue {
        /// Value after the jump.
        value: f32,
        /// Absolute time in seconds.
        time: f64,
    },
    /// Arrive at `value` at `time` along a straight line.
    LinearRamp {
        /// Value reached at `time`.
        value: f32,
        /// Absolute end time in seconds.
        time: f64,
    },
    /// Arrive at `value` at `time` along an exponential curve.
    ExponentialRamp {
        /// Value reached at `time`.
        value: f32,
        /// Absolute end time in seconds.
        time: f64,
    },
}

impl AutomationEvent {
    /// Time at which the event completes.
    pub fn time(&self) -> f64 {
        match *self {
            Self::SetValue { time, .. }
            | Self::LinearRamp { time, .. }
            | Self::ExponentialRamp { time, .. } => time,
        }
    }

    /// Value the curve holds once the event completes.
    pub fn value(&self) -> f32 {
        match *self {
            Self::SetValue { value, .. }
            | Self::LinearRamp { value, .. }
            | Self::ExponentialRamp { value, .. } => value,
        }
    }
}

/// Automatable scalar parameter.
///
/// ## Parameters
///
/// - `default`: value before any event
/// - `min` / `max`: nominal range; [`value_at`](Self::value_at) clamps to it
///
/// # Example
///
/// ```rust
/// use dawg_core::AutomationParam;
///
/// let mut cutoff = AutomationParam::new(1000.0, 20.0, 20000.0);
/// cutoff.set_immediate(200.0, 0.0);
/// cutoff.ramp_exponential(2000.0, 1.0);
///
/// // Halfway through an exponential ramp is the geometric mean.
/// let mid = cutoff.value_at(0.5);
/// assert!((mid - 632.456).abs() < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct AutomationParam {
    default: f32,
    min: f32,
    max: f32,
    events: Vec<AutomationEvent>,
}

impl AutomationParam {
    /// Create a parameter with a default value and a nominal range.
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            default: default.clamp(min, max),
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Value held before any event.
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Lower bound of the nominal range.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound of the nominal range.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Scheduled events in time order.
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Jump to `value` at `time`.
    pub fn set_immediate(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent::SetValue { value, time });
    }

    /// Ramp linearly from the previous event to `value`, arriving at `time`.
    pub fn ramp_linear(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent::LinearRamp { value, time });
    }

    /// Ramp exponentially from the previous event to `value`, arriving at `time`.
    ///
    /// `value` is floored to [`MIN_EXPONENTIAL`] in magnitude, keeping its sign.
    pub fn ramp_exponential(&mut self, value: f32, time: f64) {
        let value = if value.abs() < MIN_EXPONENTIAL {
            if value < 0.0 {
                -MIN_EXPONENTIAL
            } else {
                MIN_EXPONENTIAL
            }
        } else {
            value
        };
        self.insert(AutomationEvent::ExponentialRamp { value, time });
    }

    /// Remove every event completing at or after `time`.
    ///
    /// A ramp that was in flight at `time` is removed as well, so the curve
    /// holds the value of the last surviving event.
    pub fn cancel_future_changes(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Cancel future changes and pin the curve to the value it had at `time`.
    ///
    /// A ramp in flight at `time` is cut short so that it ends at `time` on
    /// the value it had reached; the curve before `time` is unchanged.
    /// Returns the held value.
    pub fn cancel_and_hold(&mut self, time: f64) -> f32 {
        let held = self.raw_value_at(time);
        let next = self.events.partition_point(|e| e.time() <= time);
        let truncated = match self.events.get(next) {
            Some(AutomationEvent::LinearRamp { .. }) => {
                Some(AutomationEvent::LinearRamp { value: held, time })
            }
            Some(AutomationEvent::ExponentialRamp { .. }) => {
                Some(AutomationEvent::ExponentialRamp { value: held, time })
            }
            _ => None,
        };
        self.events.truncate(next);
        match truncated {
            Some(event) => self.events.push(event),
            None => self.set_immediate(held, time),
        }
        held
    }

    /// Collapse events that completed at or before `time` into a single set.
    ///
    /// Values at and after the last collapsed event are unchanged; this only
    /// bounds the event list for long-lived parameters.
    pub fn compact(&mut self, time: f64) {
        let elapsed = self.events.partition_point(|e| e.time() <= time);
        if elapsed < 2 {
            return;
        }
        let last = self.events[elapsed - 1];
        self.events.drain(..elapsed - 1);
        #[cfg(feature = "tracing")]
        tracing::trace!("automation_compact: {} events folded at {time}", elapsed - 1);
        self.events[0] = AutomationEvent::SetValue {
            value: last.value(),
            time: last.time(),
        };
    }

    /// Remove all events, returning the parameter to its default.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Value of the curve at `time`, clamped to the nominal range.
    pub fn value_at(&self, time: f64) -> f32 {
        self.raw_value_at(time).clamp(self.min, self.max)
    }

    /// Absolute time of the last scheduled event, if any.
    pub fn last_event_time(&self) -> Option<f64> {
        self.events.last().map(AutomationEvent::time)
    }

    fn insert(&mut self, event: AutomationEvent) {
        let idx = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(idx, event);
    }

    fn raw_value_at(&self, time: f64) -> f32 {
        // Index of the first event still in the future.
        let next = self.events.partition_point(|e| e.time() <= time);

        let (start_value, start_time) = if next == 0 {
            (self.default, 0.0)
        } else {
            let prev = self.events[next - 1];
            (prev.value(), prev.time())
        };

        let Some(upcoming) = self.events.get(next) else {
            return start_value;
        };

        let span = upcoming.time() - start_time;
        if span <= 0.0 {
            return start_value;
        }
        let f = ((time - start_time) / span).clamp(0.0, 1.0);

        match *upcoming {
            AutomationEvent::SetValue { .. } => start_value,
            AutomationEvent::LinearRamp { value, .. } => {
                start_value + (value - start_value) * f as f32
            }
            AutomationEvent::ExponentialRamp { value, .. } => {
                exponential_interpolate(start_value, value, f)
            }
        }
    }
}

/// Exponential interpolation between two same-signed values.
///
/// Holds `v0` when the endpoints straddle or touch zero.
pub fn exponential_interpolate(v0: f32, v1: f32, f: f64) -> f32 {
    if v0 == 0.0 || v0 * v1 <= 0.0 {
        return v0;
    }
    (f64::from(v0) * pow(f64::from(v1) / f64::from(v0), f)) as f32
}
