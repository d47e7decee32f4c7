//! Exponential backoff for banned proxies
//!
//! Ban durations double with each consecutive failure, capped at a configured
//! maximum, with relative jitter so that many proxies banned together do not
//! all come back at the same instant.

use std::time::Duration;

use rand::Rng;

use crate::error::{CarouselError, Result};

/// Computes the ban duration for a proxy given its consecutive failure count
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    /// Create a new backoff policy.
    ///
    /// `jitter` is the maximum relative deviation applied to the computed
    /// delay, in `[0, 1]`. Fails with `InvalidConfig` if `base` is zero,
    /// `base` exceeds `cap`, or `jitter` is out of range.
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Result<Self> {
        if base.is_zero() {
            return Err(CarouselError::InvalidConfig(
                "backoff base must be non-zero".into(),
            ));
        }
        if base > cap {
            return Err(CarouselError::InvalidConfig(
                "backoff base must not exceed cap".into(),
            ));
        }
        if !(0.0..=1.0).contains(&jitter) {
            return Err(CarouselError::InvalidConfig(
                "backoff jitter must be within [0, 1]".into(),
            ));
        }
        Ok(Self { base, cap, jitter })
    }

    /// The deterministic backoff curve: `min(cap, base * 2^(failures - 1))`.
    ///
    /// Monotonically non-decreasing in `consecutive_failures` and bounded by
    /// the cap. Uses saturating arithmetic so large failure counts do not
    /// overflow.
    fn curve(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay_ms = (self.base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.cap)
    }

    /// Compute the next ban duration, with jitter applied.
    ///
    /// Bans only occur after at least one failure; a zero count fails with
    /// `InvalidArgument`. The result never exceeds the cap.
    pub fn next_backoff(&self, consecutive_failures: u32) -> Result<Duration> {
        if consecutive_failures == 0 {
            return Err(CarouselError::InvalidArgument(
                "backoff requires at least one consecutive failure".into(),
            ));
        }

        let delay = self.curve(consecutive_failures);
        if self.jitter == 0.0 {
            return Ok(delay);
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Ok(delay.mul_f64(factor).min(self.cap))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }
}
