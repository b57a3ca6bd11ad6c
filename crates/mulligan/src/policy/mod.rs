// Copyright (c) Microsoft Corporation.

//! Retry policies: the components that decide whether another attempt is
//! permitted.
//!
//! A [`RetryPolicy`] is configured once and shared; each execution gets its
//! own [`PolicySession`] holding the per-execution state (the original
//! design's policy-specific contexts). The engine drives the session:
//!
//! 1. [`open`][RetryPolicy::open] when the execution starts,
//! 2. [`on_fault`][PolicySession::on_fault] after each fault is recorded on
//!    the context,
//! 3. [`can_retry`][PolicySession::can_retry] before every attempt,
//! 4. [`close`][PolicySession::close] when the execution ends.
//!
//! Policies compose: [`CompositePolicy`] combines verdicts,
//! [`GatedPolicy`] adds a predicate, [`RoutedPolicy`] picks a delegate per
//! fault kind, and [`CircuitBreakerPolicy`] adds fail-fast windows around any
//! of them.

mod circuit_breaker;
mod classified;
mod composite;
mod constant;
mod gated;
mod max_attempts;
mod routed;
mod simple;
mod timeout;

pub use circuit_breaker::CircuitBreakerPolicy;
pub use classified::ClassifiedPolicy;
pub use composite::CompositePolicy;
pub use constant::{AlwaysPolicy, NeverPolicy};
pub use gated::GatedPolicy;
pub use max_attempts::MaxAttemptsPolicy;
pub use routed::{RoutedPolicy, RoutedPolicyBuilder};
pub use simple::SimplePolicy;
pub use timeout::TimeoutPolicy;

use std::fmt::Debug;

use crate::context::RetryContext;

/// Decides whether an execution may make another attempt.
///
/// Implementations are immutable once configured; all mutable state lives in
/// the [`PolicySession`] returned by [`open`][Self::open].
pub trait RetryPolicy<E>: Send + Sync + Debug {
    /// Starts a session for one execution. The context is available so
    /// policies can stamp attributes at open time.
    fn open(&self, ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>>;

    /// The attempt bound this policy enforces, when it has one. The bound
    /// includes the initial attempt.
    fn max_attempts(&self) -> Option<u32> {
        None
    }
}

impl<E, P> RetryPolicy<E> for std::sync::Arc<P>
where
    P: RetryPolicy<E> + ?Sized,
{
    fn open(&self, ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        self.as_ref().open(ctx)
    }

    fn max_attempts(&self) -> Option<u32> {
        self.as_ref().max_attempts()
    }
}

/// Per-execution state of a [`RetryPolicy`].
pub trait PolicySession<E>: Send {
    /// Whether another attempt is permitted.
    ///
    /// Called before the first attempt as well: a session that has observed
    /// no fault yet is expected to permit the initial attempt.
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool;

    /// Observes the fault most recently recorded on the context.
    ///
    /// # Errors
    ///
    /// Returns [`Unrouted`] when the policy has no rule for the fault; the
    /// engine surfaces this as a configuration error instead of retrying.
    fn on_fault(&mut self, ctx: &RetryContext<E>) -> Result<(), Unrouted> {
        let _ = ctx;
        Ok(())
    }

    /// Releases any per-execution state. Called exactly once per session.
    fn close(&mut self, ctx: &RetryContext<E>) {
        let _ = ctx;
    }
}

/// A routing policy had no rule for the registered fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no policy routed for the registered fault")]
pub struct Unrouted;
