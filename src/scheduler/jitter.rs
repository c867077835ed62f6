//! Humanization delay
//!
//! A random pause before each dispatch so calls to a platform don't arrive on
//! a perfectly regular beat.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Jitter {
    /// Bounds are swapped if given in the wrong order
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max { Self { min, max } } else { Self { min: max, max: min } }
    }

    /// Uniform sample in `[min, max]` using the thread-local RNG
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_micros() as u64;
        let max = self.max.as_micros() as u64;
        Duration::from_micros(rng.random_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bounds_never_delay() {
        let jitter = Jitter::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(jitter.sample(), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay() {
        let jitter = Jitter::new(Duration::from_millis(250), Duration::from_millis(250));
        assert_eq!(jitter.sample(), Duration::from_millis(250));
    }

    #[test]
    fn test_samples_stay_in_bounds() {
        let jitter = Jitter::new(Duration::from_millis(2127), Duration::from_millis(5341));
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let d = jitter.sample_with(&mut rng);
            assert!(d >= Duration::from_millis(2127), "{:?} below min", d);
            assert!(d <= Duration::from_millis(5341), "{:?} above max", d);
        }
    }

    #[test]
    fn test_swapped_bounds() {
        let swapped = Jitter::new(Duration::from_millis(300), Duration::from_millis(100));
        assert_eq!(swapped, Jitter::new(Duration::from_millis(100), Duration::from_millis(300)));
    }
}
