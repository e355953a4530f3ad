//! Fuzzed exponential backoff bound to one logical retry sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;

use super::params::RetryParameters;
use crate::error::Error;

/// Stateful delay calculator.
///
/// In manual mode `attempt()` is called before every try: the first call is
/// free, each later call waits the fuzzed delay and then grows it by
/// `backoff_factor`. After `max_attempts` calls the next one fails with
/// attempts-exhausted.
///
/// In auto-reset mode the first attempt is implicit (the counter starts at 1)
/// and exhaustion silently rewinds the state, so a long-lived consumer can
/// retry forever with periodically reset delays.
#[derive(Debug)]
pub struct Backoff {
    max_attempts: u32,
    base_delay: Duration,
    backoff_factor: f64,
    fuzz_factor: f64,
    num_attempts: u32,
    next_unfuzzed_delay: Duration,
    auto_reset: bool,
    rng: StdRng,
}

impl Backoff {
    pub fn new(params: &RetryParameters, auto_reset: bool) -> Self {
        Self::with_rng(params, auto_reset, StdRng::from_os_rng())
    }

    /// Same as [`Backoff::new`] with a caller-supplied (e.g. seeded) RNG.
    pub fn with_rng(params: &RetryParameters, auto_reset: bool, rng: StdRng) -> Self {
        let mut max_attempts = params.max_attempts.max(1);
        if auto_reset && max_attempts < 2 {
            tracing::warn!(max_attempts, "auto-reset backoff needs at least 2 attempts");
            max_attempts = 2;
        }
        Self {
            max_attempts,
            base_delay: params.base_delay,
            backoff_factor: params.backoff_factor.max(0.0),
            fuzz_factor: params.fuzz_factor.max(0.0),
            num_attempts: if auto_reset { 1 } else { 0 },
            next_unfuzzed_delay: params.base_delay,
            auto_reset,
            rng,
        }
    }

    /// Number of attempts consumed so far.
    pub fn num_attempts(&self) -> u32 {
        self.num_attempts
    }

    /// Advance the state machine by one attempt.
    ///
    /// Returns `None` when the attempt may start immediately, or the fuzzed
    /// delay to wait first.
    pub fn next_delay(&mut self) -> Result<Option<Duration>, Error> {
        if self.num_attempts >= self.max_attempts {
            if !self.auto_reset {
                return Err(Error::attempts_exhausted());
            }
            self.reset();
        }

        let current = self.num_attempts;
        self.num_attempts += 1;
        if current == 0 {
            return Ok(None);
        }

        let delay = fuzz(self.next_unfuzzed_delay, self.fuzz_factor, &mut self.rng);
        self.next_unfuzzed_delay = scale(self.next_unfuzzed_delay, self.backoff_factor);
        Ok(Some(delay))
    }

    /// Consume one attempt; the returned future resolves once the backoff
    /// delay (if any) has elapsed. State advances at call time.
    pub fn attempt(&mut self) -> impl Future<Output = Result<(), Error>> + Send + 'static {
        let step = self.next_delay();
        async move {
            if let Some(delay) = step? {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
    }

    fn reset(&mut self) {
        debug_assert!(self.auto_reset);
        self.num_attempts = 1;
        self.next_unfuzzed_delay = self.base_delay;
    }
}

/// Scale `value` by `1 + U(-fuzz_factor, fuzz_factor)`, never below zero.
pub fn fuzz<R: Rng>(value: Duration, fuzz_factor: f64, rng: &mut R) -> Duration {
    let neg_to_pos_one = rng.random::<f64>() * 2.0 - 1.0;
    scale(value, 1.0 + neg_to_pos_one * fuzz_factor)
}

fn scale(value: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64((value.as_secs_f64() * factor).max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_attempts: u32, base_ms: u64, factor: f64, fuzz: f64) -> RetryParameters {
        RetryParameters {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            backoff_factor: factor,
            fuzz_factor: fuzz,
            ..RetryParameters::default()
        }
    }

    fn seeded(p: &RetryParameters, auto_reset: bool) -> Backoff {
        Backoff::with_rng(p, auto_reset, StdRng::seed_from_u64(7))
    }

    #[test]
    fn first_attempt_is_free_then_delays_grow() {
        let p = params(4, 100, 2.0, 0.0);
        let mut b = seeded(&p, false);
        assert_eq!(b.next_delay().unwrap(), None);
        assert_eq!(b.next_delay().unwrap(), Some(Duration::from_millis(100)));
        assert_eq!(b.next_delay().unwrap(), Some(Duration::from_millis(200)));
        assert_eq!(b.next_delay().unwrap(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn manual_mode_exhausts_after_max_attempts() {
        let p = params(3, 10, 2.0, 0.5);
        let mut b = seeded(&p, false);
        for _ in 0..3 {
            assert!(b.next_delay().is_ok());
        }
        let err = b.next_delay().unwrap_err();
        assert!(err.is_attempts_exhausted());
        // Stays exhausted.
        assert!(b.next_delay().unwrap_err().is_attempts_exhausted());
    }

    #[test]
    fn fuzzed_delays_stay_within_bounds() {
        let base = 500.0;
        let factor = 1.5;
        let f = 0.5;
        let p = params(8, base as u64, factor, f);
        let mut b = seeded(&p, false);
        assert_eq!(b.next_delay().unwrap(), None);
        for n in 1..8 {
            let nominal = base * factor.powi(n - 1);
            let d = b.next_delay().unwrap().unwrap().as_secs_f64() * 1000.0;
            assert!(d >= nominal * (1.0 - f) - 1e-6, "delay {d} below bound for n={n}");
            assert!(d <= nominal * (1.0 + f) + 1e-6, "delay {d} above bound for n={n}");
        }
    }

    #[test]
    fn full_fuzz_ranges_from_zero_to_double() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let d = fuzz(Duration::from_millis(100), 1.0, &mut rng);
            assert!(d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn auto_reset_rewinds_instead_of_exhausting() {
        let p = params(3, 100, 2.0, 0.0);
        let mut b = seeded(&p, true);
        assert_eq!(b.num_attempts(), 1);
        assert_eq!(b.next_delay().unwrap(), Some(Duration::from_millis(100)));
        assert_eq!(b.next_delay().unwrap(), Some(Duration::from_millis(200)));
        // Exhausted: rewinds to attempt 1 with the base delay.
        assert_eq!(b.next_delay().unwrap(), Some(Duration::from_millis(100)));
        assert_eq!(b.num_attempts(), 2);
    }

    #[test]
    fn auto_reset_clamps_max_attempts() {
        let p = params(1, 10, 1.0, 0.0);
        let mut b = seeded(&p, true);
        for _ in 0..5 {
            assert!(b.next_delay().is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_waits_for_delay() {
        let p = params(2, 1_000, 2.0, 0.0);
        let mut b = seeded(&p, false);
        let start = tokio::time::Instant::now();
        b.attempt().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        b.attempt().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert!(b.attempt().await.unwrap_err().is_attempts_exhausted());
    }
}
