//! Monotonic clocks.
//!
//! Every scheduled change in dawg is expressed as an absolute time in seconds.
//! A [`LogicalClock`] is advanced by whoever renders audio, so offline renders
//! and tests see exactly the same timeline as live playback.

use alloc::rc::Rc;
use core::cell::Cell;

/// Source of the current time in seconds.
pub trait Clock {
    /// Current time in seconds. Never decreases between calls.
    fn now(&self) -> f64;
}

/// Manually advanced clock shared between the renderer and the engine.
///
/// Clones share the same underlying time, so the renderer can hold one
/// handle while an engine holds another.
///
/// # Example
///
/// ```rust
/// use dawg_core::{Clock, LogicalClock};
///
/// let clock = LogicalClock::new();
/// let engine_view = clock.clone();
///
/// clock.advance(0.5);
/// assert_eq!(engine_view.now(), 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    time: Rc<Cell<f64>>,
}

impl LogicalClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at `time` seconds.
    pub fn starting_at(time: f64) -> Self {
        let clock = Self::default();
        clock.time.set(time.max(0.0));
        clock
    }

    /// Move time forward by `seconds`. Negative steps are ignored.
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.time.set(self.time.get() + seconds);
        }
    }

    /// Jump to an absolute time. Ignored if `time` lies in the past.
    pub fn set(&self, time: f64) {
        if time > self.time.get() {
            self.time.set(time);
        }
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}

/// Wall-clock time measured from construction.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Start a clock reading zero now.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_clock_is_shared_between_clones() {
        let clock = LogicalClock::new();
        let other = clock.clone();
        clock.advance(1.25);
        assert_eq!(other.now(), 1.25);
    }

    #[test]
    fn test_logical_clock_never_moves_backwards() {
        let clock = LogicalClock::starting_at(2.0);
        clock.set(1.0);
        clock.advance(-0.5);
        assert_eq!(clock.now(), 2.0);

        clock.set(3.0);
        assert_eq!(clock.now(), 3.0);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
