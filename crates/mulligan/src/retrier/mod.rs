// Copyright (c) Microsoft Corporation.

//! The engine that drives an operation through policy, backoff, and
//! recovery.
//!
//! A [`Retrier`] is configured once through its [builder][RetrierBuilder] and
//! then shared; each `execute` call runs on the caller's thread, blocking it
//! during backoff. The engine never introduces concurrency of its own.
//!
//! # Stateless and stateful execution
//!
//! [`execute`][Retrier::execute] retries in-call: the operation is invoked
//! until it succeeds or the policy declines, with backoff between attempts.
//!
//! [`execute_stateful`][Retrier::execute_stateful] spans calls: the retry
//! context is cached under the [`RetryState`]'s key and each failure is
//! re-raised ([`RetryError::Failed`]) so a surrounding transaction can roll
//! back; the next call with the same key resumes the same context. Once the
//! cached policy declines, recovery runs (when configured) and the cache
//! entry is retired.

mod builder;

pub use builder::{BackoffOptions, BuildError, RetrierBuilder};

use std::error::Error;
use std::sync::Arc;

use crate::backoff::{BackoffPolicy, BackoffSession};
use crate::cache::{ContextCache, Execution};
use crate::context::{RetryContext, attrs};
use crate::current::{self, ContextView};
use crate::error::RetryError;
use crate::listener::RetryListener;
use crate::policy::RetryPolicy;
use crate::recover::{Recover, RecoverArgs};
use crate::state::{RetryState, StateKey};

/// The retry engine. See the [module documentation][self] for an overview.
///
/// # Examples
///
/// ```
/// use mulligan::Retrier;
///
/// let retrier: Retrier<std::io::Error> = Retrier::builder().max_attempts(3).build()?;
///
/// let mut calls = 0;
/// let value = retrier.execute(|_ctx| {
///     calls += 1;
///     if calls < 2 { Err(std::io::Error::other("flaky")) } else { Ok("done") }
/// })?;
///
/// assert_eq!(value, "done");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Retrier<E> {
    policy: Arc<dyn RetryPolicy<E>>,
    backoff: Arc<dyn BackoffPolicy<E>>,
    listeners: Vec<Arc<dyn RetryListener<E>>>,
    cache: Arc<dyn ContextCache<E>>,
    label: Option<Arc<str>>,
}

impl<E> std::fmt::Debug for Retrier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .field("backoff", &self.backoff)
            .field("listeners", &self.listeners.len())
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

enum Outcome<T> {
    Success(T),
    Exhausted,
    Interrupted(snooze::Interrupted),
}

impl<E> Retrier<E>
where
    E: Error + Send + Sync + 'static,
{
    /// Starts configuring an engine.
    #[must_use]
    pub fn builder() -> RetrierBuilder<E> {
        RetrierBuilder::new()
    }

    pub(crate) fn new(
        policy: Arc<dyn RetryPolicy<E>>,
        backoff: Arc<dyn BackoffPolicy<E>>,
        listeners: Vec<Arc<dyn RetryListener<E>>>,
        cache: Arc<dyn ContextCache<E>>,
        label: Option<Arc<str>>,
    ) -> Self {
        Self {
            policy,
            backoff,
            listeners,
            cache,
            label,
        }
    }

    /// Runs `op` until it succeeds or the policy declines further attempts.
    ///
    /// # Errors
    ///
    /// See [`RetryError`] for the failure surface.
    pub fn execute<T, F>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(&RetryContext<E>) -> Result<T, E>,
    {
        self.run_stateless(op, None)
    }

    /// Runs `op` as [`execute`][Self::execute] does, consulting `recovery`
    /// when the attempts are exhausted.
    ///
    /// # Errors
    ///
    /// See [`RetryError`]. When recovery produces a value, no error is
    /// surfaced at all.
    pub fn execute_with_recovery<T, F, R>(&self, op: F, recovery: R) -> Result<T, RetryError<E>>
    where
        F: FnMut(&RetryContext<E>) -> Result<T, E>,
        R: Recover<T, E>,
    {
        self.run_stateless(op, Some(&recovery))
    }

    /// Runs `op` once under the retry state identified by `state`.
    ///
    /// # Errors
    ///
    /// A retryable failure surfaces as [`RetryError::Failed`] with the state
    /// retained; re-entering with the same key resumes the attempt series.
    pub fn execute_stateful<T, F>(&self, state: &RetryState<E>, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(&RetryContext<E>) -> Result<T, E>,
    {
        self.run_stateful(state, op, None)
    }

    /// Runs `op` as [`execute_stateful`][Self::execute_stateful] does,
    /// consulting `recovery` when the cached attempt series is exhausted.
    ///
    /// # Errors
    ///
    /// See [`RetryError`].
    pub fn execute_stateful_with_recovery<T, F, R>(&self, state: &RetryState<E>, op: F, recovery: R) -> Result<T, RetryError<E>>
    where
        F: FnMut(&RetryContext<E>) -> Result<T, E>,
        R: Recover<T, E>,
    {
        self.run_stateful(state, op, Some(&recovery))
    }

    fn open_context(&self) -> Arc<RetryContext<E>> {
        let ctx = Arc::new(RetryContext::new(current::current()));
        if let Some(label) = &self.label {
            ctx.set_attribute(attrs::NAME, Arc::clone(label));
        }
        ctx
    }

    /// Notifies `open` in registration order; `false` means a veto.
    fn open_listeners(&self, ctx: &RetryContext<E>) -> bool {
        self.listeners.iter().all(|listener| listener.open(ctx))
    }

    /// Notifies `on_fault` in reverse registration order.
    fn fault_listeners(&self, ctx: &RetryContext<E>) {
        ctx.with_last_fault(|fault| {
            if let Some(fault) = fault {
                for listener in self.listeners.iter().rev() {
                    listener.on_fault(ctx, fault);
                }
            }
        });
    }

    /// Notifies `on_success` in reverse registration order; the first fault
    /// returned forces another attempt.
    fn success_listeners(&self, ctx: &RetryContext<E>) -> Result<(), E> {
        for listener in self.listeners.iter().rev() {
            listener.on_success(ctx)?;
        }
        Ok(())
    }

    /// Notifies `close` in reverse registration order.
    fn close_listeners(&self, ctx: &RetryContext<E>, fault: Option<&E>) {
        for listener in self.listeners.iter().rev() {
            listener.close(ctx, fault);
        }
    }

    fn run_stateless<T, F>(&self, mut op: F, recovery: Option<&dyn Recover<T, E>>) -> Result<T, RetryError<E>>
    where
        F: FnMut(&RetryContext<E>) -> Result<T, E>,
    {
        let ctx = self.open_context();
        let mut session = self.policy.open(&ctx);
        let _scope = current::enter(Arc::clone(&ctx) as Arc<dyn ContextView>);

        if !self.open_listeners(&ctx) {
            tracing::debug!("retry execution vetoed by a listener");
            self.close_listeners(&ctx, None);
            session.close(&ctx);
            return Err(RetryError::Terminated);
        }

        let mut pacing: Option<Box<dyn BackoffSession<E>>> = None;

        let outcome = loop {
            if !session.can_retry(&ctx) || ctx.is_exhausted_only() {
                break Outcome::Exhausted;
            }

            let fault = match op(&ctx) {
                Ok(value) => match self.success_listeners(&ctx) {
                    Ok(()) => break Outcome::Success(value),
                    Err(forced) => forced,
                },
                Err(fault) => fault,
            };

            ctx.record_fault(fault);
            if session.on_fault(&ctx).is_err() {
                let fault = ctx.take_last_fault();
                self.close_listeners(&ctx, fault.as_ref());
                session.close(&ctx);
                return Err(RetryError::Unclassified);
            }
            self.fault_listeners(&ctx);

            if ctx.flag(attrs::NO_RECOVERY) {
                break Outcome::Exhausted;
            }
            if !session.can_retry(&ctx) || ctx.is_exhausted_only() {
                break Outcome::Exhausted;
            }

            let pacing = pacing.get_or_insert_with(|| self.backoff.start(&ctx));
            if let Err(interrupted) = pacing.backoff(&ctx) {
                break Outcome::Interrupted(interrupted);
            }
        };

        match outcome {
            Outcome::Success(value) => {
                ctx.set_attribute(attrs::CLOSED, true);
                self.close_listeners(&ctx, None);
                session.close(&ctx);
                Ok(value)
            }
            Outcome::Interrupted(interrupted) => {
                let fault = ctx.take_last_fault();
                self.close_listeners(&ctx, fault.as_ref());
                session.close(&ctx);
                Err(RetryError::BackoffInterrupted(interrupted))
            }
            Outcome::Exhausted => {
                tracing::debug!(retry_count = ctx.retry_count(), "retries exhausted");
                let fault = ctx.take_last_fault();

                if let Some(recovery) = recovery {
                    if !ctx.flag(attrs::NO_RECOVERY) {
                        ctx.set_attribute(attrs::RECOVERED, true);
                        match recovery.recover(RecoverArgs {
                            fault: fault.as_ref(),
                            ctx: &ctx,
                        }) {
                            Some(Ok(value)) => {
                                self.close_listeners(&ctx, fault.as_ref());
                                session.close(&ctx);
                                return Ok(value);
                            }
                            Some(Err(recovery_fault)) => {
                                self.close_listeners(&ctx, Some(&recovery_fault));
                                session.close(&ctx);
                                return Err(RetryError::Exhausted(recovery_fault));
                            }
                            None => ctx.remove_attribute(attrs::RECOVERED),
                        }
                    }
                }

                ctx.set_attribute(attrs::EXHAUSTED, true);
                self.close_listeners(&ctx, fault.as_ref());
                session.close(&ctx);
                match fault {
                    Some(fault) => Err(RetryError::Exhausted(fault)),
                    None => Err(RetryError::ExhaustedRetry),
                }
            }
        }
    }

    fn run_stateful<T, F>(
        &self,
        state: &RetryState<E>,
        mut op: F,
        recovery: Option<&dyn Recover<T, E>>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(&RetryContext<E>) -> Result<T, E>,
    {
        let execution = self.resolve_execution(state)?;
        let ctx = Arc::clone(execution.context());
        let _scope = current::enter(Arc::clone(&ctx) as Arc<dyn ContextView>);

        if !self.open_listeners(&ctx) {
            tracing::debug!("retry execution vetoed by a listener");
            self.close_listeners(&ctx, None);
            self.finish_stateful(state, &execution, &ctx);
            return Err(RetryError::Terminated);
        }

        let mut pacing: Option<Box<dyn BackoffSession<E>>> = None;

        let outcome = loop {
            if !execution.with_session(|session| session.can_retry(&ctx)) || ctx.is_exhausted_only() {
                break Outcome::Exhausted;
            }

            let fault = match op(&ctx) {
                Ok(value) => match self.success_listeners(&ctx) {
                    Ok(()) => break Outcome::Success(value),
                    Err(forced) => forced,
                },
                Err(fault) => fault,
            };

            ctx.record_fault(fault);
            if execution.with_session(|session| session.on_fault(&ctx)).is_err() {
                let fault = ctx.take_last_fault();
                self.close_listeners(&ctx, fault.as_ref());
                return Err(RetryError::Unclassified);
            }
            self.fault_listeners(&ctx);

            if ctx.flag(attrs::NO_RECOVERY) {
                break Outcome::Exhausted;
            }

            // Backoff precedes the re-raise so the caller re-enters paced.
            if execution.with_session(|session| session.can_retry(&ctx)) && !ctx.is_exhausted_only() {
                let pacing = pacing.get_or_insert_with(|| self.backoff.start(&ctx));
                if let Err(interrupted) = pacing.backoff(&ctx) {
                    break Outcome::Interrupted(interrupted);
                }
            }

            // The failure is re-raised even when it was the exhausting one:
            // the surrounding transaction must roll back first, and the next
            // call detects exhaustion at entry. A fault the rollback
            // classifier excludes keeps retrying within this call instead.
            let should_rethrow = ctx.with_last_fault(|fault| fault.is_some_and(|fault| state.rollback_for(fault)));
            if should_rethrow {
                if let Some(fault) = ctx.take_last_fault() {
                    self.close_listeners(&ctx, Some(&fault));
                    return Err(RetryError::Failed(fault));
                }
            }
        };

        match outcome {
            Outcome::Success(value) => {
                ctx.set_attribute(attrs::CLOSED, true);
                self.close_listeners(&ctx, None);
                self.finish_stateful(state, &execution, &ctx);
                Ok(value)
            }
            Outcome::Interrupted(interrupted) => {
                let fault = ctx.take_last_fault();
                self.close_listeners(&ctx, fault.as_ref());
                Err(RetryError::BackoffInterrupted(interrupted))
            }
            Outcome::Exhausted => {
                tracing::debug!(retry_count = ctx.retry_count(), "stateful retries exhausted");
                let fault = ctx.take_last_fault();
                let no_recovery = ctx.flag(attrs::NO_RECOVERY);
                self.finish_stateful(state, &execution, &ctx);

                if let Some(recovery) = recovery {
                    if !no_recovery {
                        ctx.set_attribute(attrs::RECOVERED, true);
                        match recovery.recover(RecoverArgs {
                            fault: fault.as_ref(),
                            ctx: &ctx,
                        }) {
                            Some(Ok(value)) => {
                                self.close_listeners(&ctx, fault.as_ref());
                                return Ok(value);
                            }
                            Some(Err(recovery_fault)) => {
                                self.close_listeners(&ctx, Some(&recovery_fault));
                                return Err(RetryError::Exhausted(recovery_fault));
                            }
                            None => ctx.remove_attribute(attrs::RECOVERED),
                        }
                    }
                }

                ctx.set_attribute(attrs::EXHAUSTED, true);
                self.close_listeners(&ctx, fault.as_ref());
                match fault {
                    Some(fault) => Err(RetryError::Exhausted(fault)),
                    None => Err(RetryError::ExhaustedRetry),
                }
            }
        }
    }

    /// Resolves the cached execution for `state`, creating and caching a
    /// fresh one when there is none to reuse.
    fn resolve_execution(&self, state: &RetryState<E>) -> Result<Arc<Execution<E>>, RetryError<E>> {
        let Some(key) = state.key() else {
            return Ok(self.fresh_execution(None));
        };

        if !state.is_force_refresh() {
            if let Some(cached) = self.cache.get(key) {
                return Ok(cached);
            }
        }

        let execution = self.fresh_execution(Some(key));
        self.cache.put(key.clone(), Arc::clone(&execution))?;
        Ok(execution)
    }

    fn fresh_execution(&self, key: Option<&StateKey>) -> Arc<Execution<E>> {
        let ctx = self.open_context();
        if let Some(key) = key {
            ctx.set_attribute(attrs::STATE_KEY, key.as_str());
        }
        let session = self.policy.open(&ctx);
        Arc::new(Execution::new(ctx, session))
    }

    /// Ends a stateful attempt series: closes the policy session and retires
    /// the cache entry, unless the context is pinned as globally shared.
    fn finish_stateful(&self, state: &RetryState<E>, execution: &Execution<E>, ctx: &RetryContext<E>) {
        if let Some(key) = state.key() {
            if !ctx.flag(attrs::GLOBAL_STATE) {
                self.cache.remove(key);
            }
        }
        execution.with_session(|session| session.close(ctx));
    }
}

impl<E> Default for Retrier<E>
where
    E: Error + Send + Sync + 'static,
{
    /// An engine with the default simple policy (three attempts, every fault
    /// retryable) and no backoff.
    fn default() -> Self {
        Self::new(
            Arc::new(crate::policy::SimplePolicy::default()),
            Arc::new(crate::backoff::NoBackoff),
            Vec::new(),
            Arc::new(crate::cache::InMemoryContextCache::default()),
            None,
        )
    }
}
