use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;

/// Injectable randomness and pacing source. Every component that needs a
/// random draw or a human-scale pause takes one of these instead of reaching
/// for a process-wide generator, so tests can seed a deterministic sequence.
#[derive(Debug)]
pub struct Jitter {
    rng: ChaCha8Rng,
}

impl Jitter {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.uniform() < probability
    }

    pub fn range_u64(&mut self, bounds: (u64, u64)) -> u64 {
        let lower = bounds.0.min(bounds.1);
        let upper = bounds.0.max(bounds.1);
        self.rng.gen_range(lower..=upper)
    }

    pub fn range_u32(&mut self, bounds: (u32, u32)) -> u32 {
        let lower = bounds.0.min(bounds.1);
        let upper = bounds.0.max(bounds.1);
        self.rng.gen_range(lower..=upper)
    }

    pub fn range_f64(&mut self, bounds: (f64, f64)) -> f64 {
        let lower = bounds.0.min(bounds.1);
        let upper = bounds.0.max(bounds.1);
        if lower == upper {
            return lower;
        }
        self.rng.gen_range(lower..upper)
    }

    /// Box-Muller transform over two uniform draws.
    pub fn gaussian(&mut self, mean: f64, stddev: f64) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen::<f64>();
        let magnitude = (-2.0 * u1.ln()).sqrt();
        mean + stddev * magnitude * (2.0 * std::f64::consts::PI * u2).cos()
    }

    pub fn gaussian_clamped(&mut self, mean: f64, stddev: f64, lower: f64, upper: f64) -> f64 {
        self.gaussian(mean, stddev).clamp(lower, upper)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Signed offset in [-max, max].
    pub fn offset(&mut self, max: f64) -> f64 {
        if max <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-max..=max)
    }

    pub async fn pause_ms(&mut self, bounds: (u64, u64)) {
        let millis = self.range_u64(bounds);
        if millis > 0 {
            sleep(Duration::from_millis(millis)).await;
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cubic easing used for pointer interpolation.
pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_samples_respect_clamp_and_mean() {
        let mut jitter = Jitter::seeded(7);
        let mut sum = 0.0;
        for _ in 0..10_000 {
            let sample = jitter.gaussian_clamped(6_000.0, 2_000.0, 3_000.0, 12_000.0);
            assert!((3_000.0..=12_000.0).contains(&sample));
            sum += sample;
        }
        let mean = sum / 10_000.0;
        assert!(
            (mean - 6_000.0).abs() < 600.0,
            "sample mean {mean} drifted more than 10% from 6000"
        );
    }

    #[test]
    fn ranges_are_inclusive_and_tolerate_swapped_bounds() {
        let mut jitter = Jitter::seeded(11);
        for _ in 0..1_000 {
            let value = jitter.range_u64((500, 100));
            assert!((100..=500).contains(&value));
        }
        assert_eq!(jitter.range_u64((42, 42)), 42);
    }

    #[test]
    fn seeded_sequences_are_deterministic() {
        let mut a = Jitter::seeded(99);
        let mut b = Jitter::seeded(99);
        for _ in 0..64 {
            assert_eq!(a.range_u64((0, 1_000_000)), b.range_u64((0, 1_000_000)));
        }
    }

    #[test]
    fn offset_stays_within_bounds() {
        let mut jitter = Jitter::seeded(3);
        for _ in 0..1_000 {
            let value = jitter.offset(4.5);
            assert!(value.abs() <= 4.5);
        }
        assert_eq!(jitter.offset(0.0), 0.0);
    }
}
