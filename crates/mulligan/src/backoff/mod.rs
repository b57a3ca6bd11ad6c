// Copyright (c) Microsoft Corporation.

//! Backoff policies: the components that decide how long to pause between
//! attempts.
//!
//! A [`BackoffPolicy`] is configured once and shared; each execution gets its
//! own [`BackoffSession`] holding the pacing state (e.g. the current
//! exponential interval). The engine starts a session lazily on the first
//! retryable failure and calls [`backoff`][BackoffSession::backoff] between
//! attempts — never before the first attempt, never after the last.
//!
//! Policies own their [`Sleeper`][snooze::Sleeper]; tests swap in the
//! recording sleeper from `snooze`'s `test-util` feature to assert on the
//! schedule without sleeping.

mod exponential;
mod fixed;
mod jitter;
mod routed;
mod uniform;

pub use exponential::{ExponentialBackoff, ExponentialRandomBackoff};
pub use fixed::FixedBackoff;
pub use routed::{RoutedBackoff, RoutedBackoffBuilder};
pub use uniform::UniformRandomBackoff;

use std::fmt::Debug;

use snooze::Interrupted;

use crate::context::RetryContext;

/// Computes and performs the pause between attempts.
pub trait BackoffPolicy<E>: Send + Sync + Debug {
    /// Starts the pacing state for one execution.
    fn start(&self, ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>>;
}

impl<E, P> BackoffPolicy<E> for std::sync::Arc<P>
where
    P: BackoffPolicy<E> + ?Sized,
{
    fn start(&self, ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        self.as_ref().start(ctx)
    }
}

/// Per-execution pacing state of a [`BackoffPolicy`].
pub trait BackoffSession<E>: Send {
    /// Pauses before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the pause was cut short; the engine
    /// surfaces this and makes no further attempts.
    fn backoff(&mut self, ctx: &RetryContext<E>) -> Result<(), Interrupted>;
}

/// The no-op backoff: attempts follow each other immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl<E: Send + Sync + 'static> BackoffPolicy<E> for NoBackoff {
    fn start(&self, _ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        Box::new(NoBackoffSession)
    }
}

#[derive(Debug)]
struct NoBackoffSession;

impl<E> BackoffSession<E> for NoBackoffSession {
    fn backoff(&mut self, _ctx: &RetryContext<E>) -> Result<(), Interrupted> {
        Ok(())
    }
}
