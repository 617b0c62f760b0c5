//! Buffer-backed white noise.
//!
//! A [`NoiseBuffer`] is generated once and shared by reference count; every
//! [`NoiseSource`] loops over the same samples. The owner decides how many
//! buffers exist and hands clones to whoever needs one.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::node::Lifecycle;

/// Shared table of white-noise samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct NoiseBuffer {
    samples: Rc<[f32]>,
}

impl NoiseBuffer {
    /// Generate `len` samples from a xorshift32 sequence seeded with `seed`.
    pub fn new(len: usize, seed: u32) -> Self {
        let mut state = if seed == 0 { 0x1234_5678 } else { seed };
        let samples: Vec<f32> = (0..len.max(1))
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as i32 as f32) / (i32::MAX as f32)
            })
            .collect();
        #[cfg(feature = "tracing")]
        tracing::debug!("noise_buffer: {} samples, seed {seed:#x}", samples.len());
        Self {
            samples: samples.into(),
        }
    }

    /// Number of samples in one loop.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; a buffer holds at least one sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at `index`, wrapping around the loop.
    #[inline]
    pub fn sample(&self, index: usize) -> f32 {
        self.samples[index % self.samples.len()]
    }

    /// Number of live handles to this buffer.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.samples)
    }
}

/// Looping reader over a [`NoiseBuffer`].
#[derive(Debug, Clone)]
pub struct NoiseSource {
    buffer: NoiseBuffer,
    position: usize,
    lifecycle: Lifecycle,
}

impl NoiseSource {
    /// Create a stopped source reading `buffer` from its first sample.
    pub fn new(buffer: NoiseBuffer) -> Self {
        Self {
            buffer,
            position: 0,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Start looping at `time`.
    pub fn start(&mut self, time: f64) {
        self.position = 0;
        self.lifecycle.start(time);
    }

    /// Stop at `time`. Ignored after disposal.
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
    }

    /// Playback window.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Next sample, or silence outside the playback window.
    #[inline]
    pub fn render(&mut self, time: f64) -> f32 {
        if !self.lifecycle.is_playing(time) {
            return 0.0;
        }
        let s = self.buffer.sample(self.position);
        self.position = (self.position + 1) % self.buffer.len();
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_deterministic_and_bounded() {
        let a = NoiseBuffer::new(1024, 7);
        let b = NoiseBuffer::new(1024, 7);
        for i in 0..1024 {
            assert_eq!(a.sample(i), b.sample(i));
            assert!(a.sample(i).abs() <= 1.0);
        }
    }

    #[test]
    fn test_sources_share_one_buffer() {
        let buffer = NoiseBuffer::new(64, 1);
        let s1 = NoiseSource::new(buffer.clone());
        let s2 = NoiseSource::new(buffer.clone());
        assert_eq!(buffer.handle_count(), 3);
        drop((s1, s2));
        assert_eq!(buffer.handle_count(), 1);
    }

    #[test]
    fn test_source_loops() {
        let buffer = NoiseBuffer::new(4, 3);
        let mut src = NoiseSource::new(buffer.clone());
        src.start(0.0);
        let first: Vec<f32> = (0..4).map(|_| src.render(0.0)).collect();
        let second: Vec<f32> = (0..4).map(|_| src.render(0.0)).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], buffer.sample(0));
    }
}
