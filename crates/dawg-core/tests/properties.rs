//! Property-based tests for dawg-core primitives.
//!
//! Tests automation curve bounds and continuity, compaction invariance, and
//! filter stability under swept cutoff using proptest for randomized input.

use dawg_core::{AutomationParam, FilterKind, FilterNode};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A linear ramp never leaves the interval spanned by its end points.
    #[test]
    fn linear_ramp_stays_between_endpoints(
        start in -1.0f32..=1.0f32,
        end in -1.0f32..=1.0f32,
        duration in 0.001f64..10.0f64,
        probe in 0.0f64..=1.0f64,
    ) {
        let mut p = AutomationParam::new(0.0, -1.0, 1.0);
        p.set_immediate(start, 0.0);
        p.ramp_linear(end, duration);

        let v = p.value_at(probe * duration);
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        prop_assert!(v >= lo - 1e-6 && v <= hi + 1e-6, "{} not in [{}, {}]", v, lo, hi);
    }

    /// An exponential ramp between positive values is monotonic.
    #[test]
    fn exponential_ramp_is_monotonic(
        start in 20.0f32..20000.0f32,
        end in 20.0f32..20000.0f32,
        duration in 0.01f64..5.0f64,
    ) {
        let mut p = AutomationParam::new(1000.0, 20.0, 20000.0);
        p.set_immediate(start, 0.0);
        p.ramp_exponential(end, duration);

        let rising = end >= start;
        let mut prev = p.value_at(0.0);
        for i in 1..=64 {
            let v = p.value_at(duration * f64::from(i) / 64.0);
            if rising {
                prop_assert!(v >= prev - prev * 1e-5);
            } else {
                prop_assert!(v <= prev + prev * 1e-5);
            }
            prev = v;
        }
        prop_assert!((prev - end).abs() <= end * 1e-4);
    }

    /// Compaction never changes the curve at or after the compaction point.
    #[test]
    fn compaction_preserves_future(
        values in prop::collection::vec(0.0f32..=1.0f32, 2..12),
        split in 0.0f64..12.0f64,
    ) {
        let mut p = AutomationParam::new(0.0, 0.0, 1.0);
        for (i, v) in values.iter().enumerate() {
            if i % 2 == 0 {
                p.ramp_linear(*v, i as f64 + 1.0);
            } else {
                p.set_immediate(*v, i as f64 + 1.0);
            }
        }
        let probes: Vec<f64> = (0..40).map(|i| split + f64::from(i) * 0.3).collect();
        let before: Vec<f32> = probes.iter().map(|&t| p.value_at(t)).collect();
        p.compact(split);
        let after: Vec<f32> = probes.iter().map(|&t| p.value_at(t)).collect();
        prop_assert_eq!(before, after);
    }

    /// Sweeping the cutoff every sample keeps the filter output finite.
    #[test]
    fn swept_filter_stays_finite(
        from in 20.0f32..20000.0f32,
        to in 20.0f32..20000.0f32,
        q in 0.1f32..30.0f32,
        kind in 0usize..4,
        input in prop::array::uniform32(-1.0f32..=1.0f32),
    ) {
        let kind = [
            FilterKind::Lowpass,
            FilterKind::Highpass,
            FilterKind::Bandpass,
            FilterKind::Notch,
        ][kind];
        let mut filter = FilterNode::new(48000.0, kind);
        filter.frequency.set_immediate(from, 0.0);
        filter.frequency.ramp_exponential(to, 0.01);
        filter.q.set_immediate(q, 0.0);

        for i in 0..480 {
            let x = input[i % input.len()];
            let (l, r) = filter.process_stereo(i as f64 / 48000.0, x, -x, 0.0, 0.0);
            prop_assert!(l.is_finite() && r.is_finite());
        }
    }
}
