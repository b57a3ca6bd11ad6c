// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use crate::context::RetryContext;
use crate::policy::{PolicySession, RetryPolicy, Unrouted};

/// The compiled fault predicate a [`GatedPolicy`] consults.
///
/// Shared between the policy and its sessions, so one configured gate serves
/// every execution.
struct RetryPredicate<E>(Arc<dyn Fn(&E) -> bool + Send + Sync>);

impl<E> RetryPredicate<E> {
    fn new<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Whether the fault is worth another attempt.
    fn accepts(&self, fault: &E) -> bool {
        (self.0)(fault)
    }
}

impl<E> Clone for RetryPredicate<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> Debug for RetryPredicate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RetryPredicate")
    }
}

/// ANDs an inner policy's verdict with a predicate over the last fault.
///
/// The predicate is the hook for decisions that depend on fault *data* rather
/// than fault kind — an HTTP status range, a vendor error code, a message
/// inspected at runtime. A configuration layer that evaluates user-written
/// expressions compiles each expression down to one of these predicates.
///
/// # Examples
///
/// ```
/// use mulligan::policy::{GatedPolicy, SimplePolicy};
///
/// let policy = GatedPolicy::new(SimplePolicy::new(4), |fault: &std::io::Error| {
///     fault.kind() == std::io::ErrorKind::TimedOut
/// });
/// ```
pub struct GatedPolicy<E> {
    inner: Arc<dyn RetryPolicy<E>>,
    predicate: RetryPredicate<E>,
}

impl<E> Debug for GatedPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedPolicy").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl<E> GatedPolicy<E> {
    /// Gates `inner` with `predicate`.
    pub fn new<F>(inner: impl RetryPolicy<E> + 'static, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(inner),
            predicate: RetryPredicate::new(predicate),
        }
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for GatedPolicy<E> {
    fn open(&self, ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        Box::new(Session {
            inner: self.inner.open(ctx),
            predicate: self.predicate.clone(),
        })
    }

    fn max_attempts(&self) -> Option<u32> {
        self.inner.max_attempts()
    }
}

struct Session<E> {
    inner: Box<dyn PolicySession<E>>,
    predicate: RetryPredicate<E>,
}

impl<E: Send + Sync + 'static> PolicySession<E> for Session<E> {
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool {
        if !self.inner.can_retry(ctx) {
            return false;
        }

        let predicate = self.predicate.clone();
        ctx.with_last_fault(|fault| match fault {
            None => true,
            Some(fault) => predicate.accepts(fault),
        })
    }

    fn on_fault(&mut self, ctx: &RetryContext<E>) -> Result<(), Unrouted> {
        self.inner.on_fault(ctx)
    }

    fn close(&mut self, ctx: &RetryContext<E>) {
        self.inner.close(ctx);
    }
}
