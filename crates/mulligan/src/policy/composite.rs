// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use crate::context::RetryContext;
use crate::policy::{PolicySession, RetryPolicy, Unrouted};

/// Combines the verdicts of several child policies.
///
/// Two modes:
///
/// - *pessimistic*: another attempt is permitted only when **all** children
///   permit it,
/// - *optimistic*: another attempt is permitted when **any** child permits it.
///
/// Faults are broadcast to every child; closing the composite closes every
/// child session.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::policy::{CompositePolicy, MaxAttemptsPolicy, TimeoutPolicy};
///
/// let policy: CompositePolicy<std::io::Error> = CompositePolicy::pessimistic(vec![
///     std::sync::Arc::new(MaxAttemptsPolicy::new(10)),
///     std::sync::Arc::new(TimeoutPolicy::new(Duration::from_secs(30))),
/// ]);
/// ```
pub struct CompositePolicy<E> {
    children: Vec<Arc<dyn RetryPolicy<E>>>,
    optimistic: bool,
}

impl<E> Debug for CompositePolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositePolicy")
            .field("children", &self.children.len())
            .field("optimistic", &self.optimistic)
            .finish()
    }
}

impl<E> CompositePolicy<E> {
    /// All children must permit another attempt.
    #[must_use]
    pub fn pessimistic(children: Vec<Arc<dyn RetryPolicy<E>>>) -> Self {
        Self {
            children,
            optimistic: false,
        }
    }

    /// Any child may permit another attempt.
    #[must_use]
    pub fn optimistic(children: Vec<Arc<dyn RetryPolicy<E>>>) -> Self {
        Self {
            children,
            optimistic: true,
        }
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for CompositePolicy<E> {
    fn open(&self, ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        Box::new(Session {
            children: self.children.iter().map(|child| child.open(ctx)).collect(),
            optimistic: self.optimistic,
        })
    }

    fn max_attempts(&self) -> Option<u32> {
        // The tightest child bound is the effective bound in pessimistic
        // mode; optimistic composites have no single meaningful bound.
        if self.optimistic {
            return None;
        }
        self.children.iter().filter_map(|child| child.max_attempts()).min()
    }
}

struct Session<E> {
    children: Vec<Box<dyn PolicySession<E>>>,
    optimistic: bool,
}

impl<E: Send + Sync + 'static> PolicySession<E> for Session<E> {
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool {
        if self.optimistic {
            self.children.iter_mut().any(|child| child.can_retry(ctx))
        } else {
            self.children.iter_mut().all(|child| child.can_retry(ctx))
        }
    }

    fn on_fault(&mut self, ctx: &RetryContext<E>) -> Result<(), Unrouted> {
        let mut result = Ok(());
        for child in &mut self.children {
            if let Err(unrouted) = child.on_fault(ctx) {
                result = Err(unrouted);
            }
        }
        result
    }

    fn close(&mut self, ctx: &RetryContext<E>) {
        for child in &mut self.children {
            child.close(ctx);
        }
    }
}
