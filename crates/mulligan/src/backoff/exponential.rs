// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use snooze::{Interrupted, Sleeper, ThreadSleeper};

use crate::backoff::{BackoffPolicy, BackoffSession};
use crate::backoff::jitter::JitterSource;
use crate::context::RetryContext;

/// The default first pause. The declarative builder surface configures
/// 1000 ms instead; both defaults are intentional and documented there.
const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// The default growth factor between pauses.
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// The default ceiling on a single pause.
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Pauses for exponentially growing periods between attempts.
///
/// Each pause sleeps the current interval (capped at the maximum), then
/// multiplies the interval by the growth factor. A multiplier of `1` (or
/// anything lower, which is raised to `1`) collapses to a fixed backoff.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::backoff::ExponentialBackoff;
///
/// let backoff = ExponentialBackoff::new(Duration::from_millis(100))
///     .multiplier(2.0)
///     .max_interval(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_INTERVAL)
    }
}

impl ExponentialBackoff {
    /// An exponential pause starting at `initial_interval` (floored at one
    /// millisecond), doubling up to the default 30 s ceiling.
    #[must_use]
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval: initial_interval.max(MIN_INTERVAL),
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Sets the growth factor; values at or below `1` are raised to `1`.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the ceiling on a single pause.
    #[must_use]
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Replaces the sleeper that performs the pause.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub(crate) fn default_max_interval() -> Duration {
        DEFAULT_MAX_INTERVAL
    }
}

impl<E: Send + Sync + 'static> BackoffPolicy<E> for ExponentialBackoff {
    fn start(&self, _ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        Box::new(Session {
            interval: self.initial_interval,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            sleeper: Arc::clone(&self.sleeper),
            jitter: None,
        })
    }
}

/// The jitter variant: each pause is the exponential interval stretched by a
/// uniformly drawn factor in `[1, multiplier)`.
///
/// The underlying interval still grows deterministically, so the schedule
/// keeps its exponential envelope while concurrent callers spread out.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    inner: ExponentialBackoff,
    jitter: JitterSource,
}

impl Default for ExponentialRandomBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_INTERVAL)
    }
}

impl ExponentialRandomBackoff {
    /// A jittered exponential pause starting at `initial_interval`.
    #[must_use]
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            inner: ExponentialBackoff::new(initial_interval),
            jitter: JitterSource::default(),
        }
    }

    /// Sets the growth factor; values at or below `1` are raised to `1`.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.inner = self.inner.multiplier(multiplier);
        self
    }

    /// Sets the ceiling on a single pause.
    #[must_use]
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.inner = self.inner.max_interval(max_interval);
        self
    }

    /// Replaces the sleeper that performs the pause.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.inner = self.inner.with_sleeper(sleeper);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }
}

impl<E: Send + Sync + 'static> BackoffPolicy<E> for ExponentialRandomBackoff {
    fn start(&self, _ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        Box::new(Session {
            interval: self.inner.initial_interval,
            multiplier: self.inner.multiplier,
            max_interval: self.inner.max_interval,
            sleeper: Arc::clone(&self.inner.sleeper),
            jitter: Some(self.jitter.clone()),
        })
    }
}

struct Session {
    interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
    jitter: Option<JitterSource>,
}

impl Session {
    fn next_period(&mut self) -> Duration {
        let base = self.interval.min(self.max_interval);

        let period = match &self.jitter {
            None => base,
            Some(jitter) => base.mul_f64(jitter.stretch(self.multiplier)).min(self.max_interval),
        };

        self.interval = if self.interval >= self.max_interval {
            self.max_interval
        } else {
            self.interval.mul_f64(self.multiplier).min(self.max_interval)
        };

        period
    }
}

impl<E> BackoffSession<E> for Session {
    fn backoff(&mut self, _ctx: &RetryContext<E>) -> Result<(), Interrupted> {
        let period = self.next_period();
        self.sleeper.sleep(period)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use snooze::RecordingSleeper;

    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(1.0, 1.0)]
    #[case(2.5, 2.5)]
    fn multiplier_is_floored_at_one(#[case] configured: f64, #[case] effective: f64) {
        let backoff = ExponentialBackoff::new(ms(100)).multiplier(configured);
        assert!((backoff.multiplier - effective).abs() < f64::EPSILON);
    }

    #[test]
    fn doubles_up_to_the_ceiling() {
        let sleeper = RecordingSleeper::new();
        let backoff = ExponentialBackoff::new(ms(100)).max_interval(ms(800)).with_sleeper(sleeper.clone());
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        for _ in 0..6 {
            session.backoff(&ctx).expect("recording sleep cannot fail");
        }

        assert_eq!(sleeper.periods(), vec![ms(100), ms(200), ms(400), ms(800), ms(800), ms(800)]);
    }

    #[test]
    fn multiplier_at_or_below_one_collapses_to_fixed() {
        let sleeper = RecordingSleeper::new();
        let backoff = ExponentialBackoff::new(ms(150)).multiplier(0.5).with_sleeper(sleeper.clone());
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect("recording sleep cannot fail");
        session.backoff(&ctx).expect("recording sleep cannot fail");

        assert_eq!(sleeper.periods(), vec![ms(150), ms(150)]);
    }

    #[test]
    fn zero_initial_interval_is_floored() {
        let sleeper = RecordingSleeper::new();
        let backoff = ExponentialBackoff::new(Duration::ZERO).with_sleeper(sleeper.clone());
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect("recording sleep cannot fail");

        assert_eq!(sleeper.periods(), vec![ms(1)]);
    }

    #[test]
    fn default_matches_documented_values() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.initial_interval, ms(100));
        assert!((backoff.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(backoff.max_interval, Duration::from_secs(30));
    }

    #[test]
    fn jitter_stretches_within_the_multiplier() {
        let sleeper = RecordingSleeper::new();
        let backoff = ExponentialRandomBackoff::new(ms(100))
            .multiplier(2.0)
            .with_sleeper(sleeper.clone())
            .with_jitter(JitterSource::constant(0.5));
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect("recording sleep cannot fail");
        session.backoff(&ctx).expect("recording sleep cannot fail");

        // Base intervals 100 and 200, each stretched by 1.5.
        assert_eq!(sleeper.periods(), vec![ms(150), ms(300)]);
    }

    #[test]
    fn jitter_respects_the_ceiling() {
        let sleeper = RecordingSleeper::new();
        let backoff = ExponentialRandomBackoff::new(ms(100))
            .multiplier(3.0)
            .max_interval(ms(120))
            .with_sleeper(sleeper.clone())
            .with_jitter(JitterSource::constant(1.0));
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect("recording sleep cannot fail");

        assert_eq!(sleeper.periods(), vec![ms(120)]);
    }

    #[test]
    fn jitter_draws_vary_with_the_source() {
        let sleeper = RecordingSleeper::new();
        let backoff = ExponentialRandomBackoff::new(ms(100))
            .multiplier(2.0)
            .max_interval(ms(10_000))
            .with_sleeper(sleeper.clone())
            .with_jitter(JitterSource::scripted([0.0, 1.0]));
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect("recording sleep cannot fail");
        session.backoff(&ctx).expect("recording sleep cannot fail");

        // Draw 0.0 leaves the base interval; draw 1.0 doubles it.
        assert_eq!(sleeper.periods(), vec![ms(100), ms(400)]);
    }
}
