//! Fixed-rate sample clock fed by variable-length host ticks.

/// Converts irregular tick durations into a monotonic count of fixed-period
/// samples.
///
/// `advance` folds elapsed time into a running remainder; `next_sample`
/// drains the remainder one period at a time so the caller can react after
/// each individual sample (a stalled tick may yield several). Identical
/// input sequences always yield identical counts.
#[derive(Debug, Clone)]
pub struct SampleClock {
    period: f64,
    remainder: f64,
    samples: u64,
}

impl SampleClock {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            period: 1.0 / frame_rate,
            remainder: 0.0,
            samples: 0,
        }
    }

    /// Seconds between consecutive samples.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Samples yielded so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Account for one host tick of `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.remainder += dt;
    }

    /// Yield the next pending sample index, if a full period has elapsed.
    pub fn next_sample(&mut self) -> Option<u64> {
        if self.remainder < self.period {
            return None;
        }
        self.remainder -= self.period;
        self.samples += 1;
        Some(self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(clock: &mut SampleClock) -> Vec<u64> {
        let mut out = Vec::new();
        while let Some(sample) = clock.next_sample() {
            out.push(sample);
        }
        out
    }

    #[test]
    fn no_samples_before_first_period() {
        let mut clock = SampleClock::new(24.0);
        clock.advance(0.02);
        assert_eq!(clock.next_sample(), None);
        assert_eq!(clock.samples(), 0);
    }

    #[test]
    fn accumulates_across_short_ticks() {
        let mut clock = SampleClock::new(10.0);
        for _ in 0..4 {
            clock.advance(0.03);
            assert_eq!(clock.next_sample(), None);
        }
        clock.advance(0.03);
        assert_eq!(clock.next_sample(), Some(1));
        assert_eq!(clock.next_sample(), None);
    }

    #[test]
    fn stalled_tick_yields_multiple_samples() {
        let mut clock = SampleClock::new(30.0);
        // One tick spanning a little over four periods.
        clock.advance(4.2 / 30.0);
        assert_eq!(drain(&mut clock), vec![1, 2, 3, 4]);
        assert_eq!(clock.samples(), 4);
    }

    #[test]
    fn remainder_carries_over_sample_boundaries() {
        let mut clock = SampleClock::new(32.0);
        clock.advance(1.5 / 32.0);
        assert_eq!(drain(&mut clock), vec![1]);
        clock.advance(0.5 / 32.0);
        assert_eq!(drain(&mut clock), vec![2]);
    }

    proptest! {
        // Batching invariance: however a total duration is split across
        // ticks, the clock yields floor(total / period) samples. Durations
        // are multiples of 1/1024 against a period of 1/32 so that the
        // accumulation is exact and the comparison strict.
        #[test]
        fn batching_invariance(ticks in prop::collection::vec(0u16..2048, 0..64)) {
            let mut split = SampleClock::new(32.0);
            for &t in &ticks {
                split.advance(f64::from(t) / 1024.0);
            }
            while split.next_sample().is_some() {}

            let total: f64 = ticks.iter().map(|&t| f64::from(t) / 1024.0).sum();
            let mut whole = SampleClock::new(32.0);
            whole.advance(total);
            while whole.next_sample().is_some() {}

            prop_assert_eq!(split.samples(), whole.samples());
            prop_assert_eq!(whole.samples(), (total * 32.0).floor() as u64);
        }
    }
}
