// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use snooze::Clock;

use crate::context::{RetryContext, attrs};
use crate::policy::{PolicySession, RetryPolicy, Unrouted};

/// How quickly the circuit trips open after the delegate starts refusing.
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the circuit holds before permitting a half-open probe.
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(20);

/// Wraps a delegate policy with fail-fast open/half-open windows.
///
/// While the circuit is closed the delegate decides as usual. When the
/// delegate refuses within the *open timeout* of the window start, the
/// circuit trips open and subsequent calls are short-circuited without
/// invoking the operation. After the *reset timeout* elapses the delegate is
/// given a fresh session and the next call is allowed through (half-open);
/// its outcome closes the circuit or re-opens it.
///
/// The normal configuration keeps `open_timeout < reset_timeout` (trip fast,
/// hold open longer). Other orderings are not validated; they behave as the
/// window arithmetic dictates.
///
/// Observers see the circuit through context attributes:
/// [`circuit.open`][attrs::CIRCUIT_OPEN] and
/// [`circuit.short_count`][attrs::CIRCUIT_SHORT_COUNT]. The context is marked
/// [`state.global`][attrs::GLOBAL_STATE] so a stateful execution keeps one
/// circuit per state key alive in the cache; a single circuit shared by many
/// callers is exactly that cached context.
///
/// # Examples
///
/// ```
/// use mulligan::policy::{CircuitBreakerPolicy, NeverPolicy};
///
/// let policy: CircuitBreakerPolicy<std::io::Error> = CircuitBreakerPolicy::new(NeverPolicy);
/// ```
pub struct CircuitBreakerPolicy<E> {
    delegate: Arc<dyn RetryPolicy<E>>,
    open_timeout: Duration,
    reset_timeout: Duration,
    clock: Clock,
}

impl<E> Debug for CircuitBreakerPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerPolicy")
            .field("delegate", &self.delegate)
            .field("open_timeout", &self.open_timeout)
            .field("reset_timeout", &self.reset_timeout)
            .finish_non_exhaustive()
    }
}

impl<E> CircuitBreakerPolicy<E> {
    /// Wraps `delegate` with the default 5 s open / 20 s reset windows.
    pub fn new(delegate: impl RetryPolicy<E> + 'static) -> Self {
        Self {
            delegate: Arc::new(delegate),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            clock: Clock::new(),
        }
    }

    /// Sets how quickly a refusal trips the circuit open.
    #[must_use]
    pub fn open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// Sets how long the circuit holds before a half-open probe.
    #[must_use]
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    /// Replaces the clock used for window arithmetic.
    #[must_use]
    pub fn with_clock(mut self, clock: &Clock) -> Self {
        self.clock = clock.clone();
        self
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for CircuitBreakerPolicy<E> {
    fn open(&self, ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        ctx.set_attribute(attrs::GLOBAL_STATE, true);
        ctx.set_attribute(attrs::CIRCUIT_OPEN, false);
        ctx.set_attribute(attrs::CIRCUIT_SHORT_COUNT, 0i64);

        Box::new(Session {
            delegate: Arc::clone(&self.delegate),
            delegate_session: self.delegate.open(ctx),
            start: self.clock.instant(),
            open_timeout: self.open_timeout,
            reset_timeout: self.reset_timeout,
            clock: self.clock.clone(),
            circuit_open: false,
            short_count: 0,
        })
    }

    fn max_attempts(&self) -> Option<u32> {
        self.delegate.max_attempts()
    }
}

struct Session<E> {
    delegate: Arc<dyn RetryPolicy<E>>,
    delegate_session: Box<dyn PolicySession<E>>,
    start: Instant,
    open_timeout: Duration,
    reset_timeout: Duration,
    clock: Clock,
    circuit_open: bool,
    short_count: i64,
}

impl<E: Send + Sync + 'static> PolicySession<E> for Session<E> {
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool {
        let now = self.clock.instant();
        let elapsed = now.saturating_duration_since(self.start);

        let mut retryable = self.delegate_session.can_retry(ctx);
        if retryable {
            if elapsed > self.open_timeout {
                // A stale open window: the delegate recovered without anyone
                // noticing, silently close and start a fresh window.
                tracing::trace!("resetting circuit context");
                self.start = now;
                self.delegate_session = self.delegate.open(ctx);
            }
        } else if elapsed > self.reset_timeout {
            // Half-open: give the delegate a fresh session and let its
            // verdict decide.
            tracing::trace!("closing circuit after reset timeout");
            self.start = now;
            self.delegate_session = self.delegate.open(ctx);
            retryable = self.delegate_session.can_retry(ctx);
        } else if elapsed < self.open_timeout {
            if self.circuit_open {
                self.short_count = self.short_count.saturating_add(1);
                ctx.set_attribute(attrs::CIRCUIT_SHORT_COUNT, self.short_count);
            } else {
                tracing::trace!("opening circuit");
                self.circuit_open = true;
                self.start = now;
                ctx.set_attribute(attrs::CIRCUIT_OPEN, true);
            }
            return false;
        }

        self.circuit_open = !retryable;
        ctx.set_attribute(attrs::CIRCUIT_OPEN, self.circuit_open);
        retryable
    }

    fn on_fault(&mut self, ctx: &RetryContext<E>) -> Result<(), Unrouted> {
        self.delegate_session.on_fault(ctx)
    }

    fn close(&mut self, ctx: &RetryContext<E>) {
        self.delegate_session.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use snooze::ClockControl;

    use crate::context::AttrValue;
    use crate::policy::NeverPolicy;

    use super::*;

    fn breaker(control: &ClockControl) -> CircuitBreakerPolicy<std::io::Error> {
        CircuitBreakerPolicy::new(NeverPolicy)
            .open_timeout(Duration::from_secs(5))
            .reset_timeout(Duration::from_secs(20))
            .with_clock(&control.to_clock())
    }

    fn fault(ctx: &RetryContext<std::io::Error>, session: &mut Box<dyn PolicySession<std::io::Error>>) {
        ctx.record_fault(std::io::Error::other("x"));
        session.on_fault(ctx).expect("delegate accepts faults");
    }

    #[test]
    fn open_stamps_the_context() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let _session = breaker(&control).open(&ctx);

        assert!(ctx.flag(attrs::GLOBAL_STATE));
        assert!(!ctx.flag(attrs::CIRCUIT_OPEN));
        assert_eq!(ctx.attribute(attrs::CIRCUIT_SHORT_COUNT), Some(AttrValue::Int(0)));
    }

    #[test]
    fn first_failure_trips_the_circuit_without_counting() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = breaker(&control).open(&ctx);

        assert!(session.can_retry(&ctx));
        fault(&ctx, &mut session);

        assert!(!session.can_retry(&ctx));
        assert!(ctx.flag(attrs::CIRCUIT_OPEN));
        assert_eq!(ctx.attribute(attrs::CIRCUIT_SHORT_COUNT), Some(AttrValue::Int(0)));
    }

    #[test]
    fn open_circuit_short_circuits_and_counts() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = breaker(&control).open(&ctx);

        session.can_retry(&ctx);
        fault(&ctx, &mut session);
        session.can_retry(&ctx); // trips open

        assert!(!session.can_retry(&ctx));
        assert_eq!(ctx.attribute(attrs::CIRCUIT_SHORT_COUNT), Some(AttrValue::Int(1)));
        assert!(!session.can_retry(&ctx));
        assert_eq!(ctx.attribute(attrs::CIRCUIT_SHORT_COUNT), Some(AttrValue::Int(2)));
    }

    #[test]
    fn reset_timeout_half_opens_the_circuit() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = breaker(&control).open(&ctx);

        session.can_retry(&ctx);
        fault(&ctx, &mut session);
        session.can_retry(&ctx); // trips open

        control.advance(Duration::from_secs(21));

        // Half-open: the fresh delegate session permits the probe attempt.
        assert!(session.can_retry(&ctx));
        assert!(!ctx.flag(attrs::CIRCUIT_OPEN));
    }

    #[test]
    fn half_open_failure_reopens_the_circuit() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = breaker(&control).open(&ctx);

        session.can_retry(&ctx);
        fault(&ctx, &mut session);
        session.can_retry(&ctx); // trips open

        control.advance(Duration::from_secs(21));
        assert!(session.can_retry(&ctx)); // half-open probe allowed

        fault(&ctx, &mut session);
        assert!(!session.can_retry(&ctx));
        assert!(ctx.flag(attrs::CIRCUIT_OPEN));
    }

    #[test]
    fn stale_open_window_closes_silently() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = breaker(&control).open(&ctx);

        // Delegate still permits attempts, but the window is stale.
        control.advance(Duration::from_secs(6));
        assert!(session.can_retry(&ctx));
        assert!(!ctx.flag(attrs::CIRCUIT_OPEN));
    }

    #[test]
    fn window_between_open_and_reset_refuses_without_counting() {
        let control = ClockControl::new();
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let mut session = breaker(&control).open(&ctx);

        session.can_retry(&ctx);
        fault(&ctx, &mut session);
        session.can_retry(&ctx); // trips open

        control.advance(Duration::from_secs(10)); // past open, before reset

        assert!(!session.can_retry(&ctx));
        assert_eq!(ctx.attribute(attrs::CIRCUIT_SHORT_COUNT), Some(AttrValue::Int(0)));
        assert!(ctx.flag(attrs::CIRCUIT_OPEN));
    }
}
