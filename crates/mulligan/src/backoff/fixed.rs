// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use snooze::{Interrupted, Sleeper, ThreadSleeper};

use crate::backoff::{BackoffPolicy, BackoffSession};
use crate::context::RetryContext;

/// The conventional one-second pause between attempts.
const DEFAULT_PERIOD: Duration = Duration::from_millis(1000);

/// The shortest meaningful pause; shorter configurations are raised to this.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Pauses for a fixed period between attempts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::backoff::FixedBackoff;
///
/// let backoff = FixedBackoff::new(Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    period: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl FixedBackoff {
    /// A fixed pause of `period` (floored at one millisecond).
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replaces the sleeper that performs the pause.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// The configured pause.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl<E: Send + Sync + 'static> BackoffPolicy<E> for FixedBackoff {
    fn start(&self, _ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        Box::new(Session {
            period: self.period,
            sleeper: Arc::clone(&self.sleeper),
        })
    }
}

struct Session {
    period: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> BackoffSession<E> for Session {
    fn backoff(&mut self, _ctx: &RetryContext<E>) -> Result<(), Interrupted> {
        self.sleeper.sleep(self.period)
    }
}

#[cfg(test)]
mod tests {
    use snooze::RecordingSleeper;

    use super::*;

    #[test]
    fn sleeps_the_same_period_every_time() {
        let sleeper = RecordingSleeper::new();
        let backoff = FixedBackoff::new(Duration::from_millis(50)).with_sleeper(sleeper.clone());
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect("recording sleep cannot fail");
        session.backoff(&ctx).expect("recording sleep cannot fail");

        assert_eq!(sleeper.periods(), vec![Duration::from_millis(50); 2]);
    }

    #[test]
    fn sub_millisecond_period_is_floored() {
        let backoff = FixedBackoff::new(Duration::from_micros(10));
        assert_eq!(backoff.period(), Duration::from_millis(1));
    }

    #[test]
    fn interruption_is_surfaced() {
        let sleeper = RecordingSleeper::interrupting_after(0);
        let backoff = FixedBackoff::new(Duration::from_millis(50)).with_sleeper(sleeper);
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = BackoffPolicy::<std::io::Error>::start(&backoff, &ctx);

        session.backoff(&ctx).expect_err("sleeper interrupts immediately");
    }
}
