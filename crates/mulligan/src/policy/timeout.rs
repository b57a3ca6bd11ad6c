// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use snooze::{Clock, Stopwatch};

use crate::context::RetryContext;
use crate::policy::{PolicySession, RetryPolicy};

/// The conventional default budget of one second.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Permits attempts while the execution is within a wall-clock budget.
///
/// The budget is measured from the session open. This policy puts no bound on
/// the number of attempts; pair it with a backoff policy so the loop does not
/// spin, or combine it with other policies in a
/// [`CompositePolicy`][crate::policy::CompositePolicy].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::policy::TimeoutPolicy;
///
/// let policy = TimeoutPolicy::new(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    timeout: Duration,
    clock: Clock,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl TimeoutPolicy {
    /// A policy whose attempts must start within `timeout` of the open.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clock: Clock::new(),
        }
    }

    /// Replaces the clock used to measure the budget.
    #[must_use]
    pub fn with_clock(mut self, clock: &Clock) -> Self {
        self.clock = clock.clone();
        self
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for TimeoutPolicy {
    fn open(&self, _ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        Box::new(Session {
            timeout: self.timeout,
            stopwatch: Stopwatch::new(&self.clock),
        })
    }
}

#[derive(Debug)]
struct Session {
    timeout: Duration,
    stopwatch: Stopwatch,
}

impl<E> PolicySession<E> for Session {
    fn can_retry(&mut self, _ctx: &RetryContext<E>) -> bool {
        self.stopwatch.elapsed() <= self.timeout
    }
}

#[cfg(test)]
mod tests {
    use snooze::ClockControl;

    use super::*;

    #[test]
    fn permits_attempts_within_the_budget() {
        let control = ClockControl::new();
        let policy = TimeoutPolicy::new(Duration::from_secs(10)).with_clock(&control.to_clock());
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = RetryPolicy::<std::io::Error>::open(&policy, &ctx);

        assert!(session.can_retry(&ctx));
        control.advance(Duration::from_secs(9));
        assert!(session.can_retry(&ctx));
        control.advance(Duration::from_secs(2));
        assert!(!session.can_retry(&ctx));
    }

    #[test]
    fn budget_is_measured_from_the_open() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        control.advance(Duration::from_secs(100));

        let policy = TimeoutPolicy::new(Duration::from_secs(1)).with_clock(&clock);
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = RetryPolicy::<std::io::Error>::open(&policy, &ctx);

        assert!(session.can_retry(&ctx));
    }
}
