// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use triage::{Classifier, KindClassifier, KindClassifierBuilder};

use crate::context::RetryContext;
use crate::policy::{PolicySession, RetryPolicy, Unrouted};

/// Routes each fault kind to its own delegate policy.
///
/// Different fault kinds may warrant different attempt budgets: a deadlock
/// loser can be retried aggressively while a rate-limit response deserves a
/// tight bound. Each delegate gets its own session inside the execution, so
/// budgets are tracked independently; the verdict always comes from the
/// delegate selected by the most recent fault.
///
/// Before any fault is registered no delegate is selected and the initial
/// attempt is permitted.
///
/// A fault matching no rule is a configuration error surfaced by the engine,
/// unless a fallback delegate is installed with
/// [`otherwise`][RoutedPolicyBuilder::otherwise].
///
/// # Examples
///
/// ```
/// use mulligan::policy::{MaxAttemptsPolicy, NeverPolicy, RoutedPolicy};
///
/// #[derive(Debug)]
/// enum StoreError {
///     Deadlock,
///     Corrupt,
/// }
///
/// let policy = RoutedPolicy::builder()
///     .when(|e: &StoreError| matches!(e, StoreError::Deadlock), MaxAttemptsPolicy::new(10))
///     .otherwise(NeverPolicy)
///     .build();
/// ```
pub struct RoutedPolicy<E> {
    router: Arc<KindClassifier<E, Option<usize>>>,
    delegates: Vec<Arc<dyn RetryPolicy<E>>>,
    fallback: Option<Arc<dyn RetryPolicy<E>>>,
}

impl<E> Debug for RoutedPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedPolicy")
            .field("delegates", &self.delegates.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<E> RoutedPolicy<E>
where
    E: Send + Sync + 'static,
{
    /// Starts building a routed policy.
    #[must_use]
    pub fn builder() -> RoutedPolicyBuilder<E> {
        RoutedPolicyBuilder {
            router: KindClassifier::builder(None),
            delegates: Vec::new(),
            fallback: None,
        }
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for RoutedPolicy<E> {
    fn open(&self, _ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        Box::new(Session {
            router: Arc::clone(&self.router),
            delegates: self.delegates.clone(),
            fallback: self.fallback.clone(),
            sessions: (0..self.delegates.len()).map(|_| None).collect(),
            fallback_session: None,
            current: Selection::None,
        })
    }
}

/// Builder for [`RoutedPolicy`].
pub struct RoutedPolicyBuilder<E> {
    router: KindClassifierBuilder<E, Option<usize>>,
    delegates: Vec<Arc<dyn RetryPolicy<E>>>,
    fallback: Option<Arc<dyn RetryPolicy<E>>>,
}

impl<E> Debug for RoutedPolicyBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedPolicyBuilder").field("delegates", &self.delegates.len()).finish_non_exhaustive()
    }
}

impl<E> RoutedPolicyBuilder<E>
where
    E: Send + Sync + 'static,
{
    /// Routes faults matching `matcher` to `policy`.
    ///
    /// Rules are tried in registration order; matchers must be variant-pure
    /// (see [`KindClassifier`]).
    #[must_use]
    pub fn when<F>(mut self, matcher: F, policy: impl RetryPolicy<E> + 'static) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let index = self.delegates.len();
        self.delegates.push(Arc::new(policy));
        self.router = self.router.when(matcher, Some(index));
        self
    }

    /// Routes unmatched faults to `policy` instead of failing.
    #[must_use]
    pub fn otherwise(mut self, policy: impl RetryPolicy<E> + 'static) -> Self {
        self.fallback = Some(Arc::new(policy));
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> RoutedPolicy<E> {
        RoutedPolicy {
            router: Arc::new(self.router.build()),
            delegates: self.delegates,
            fallback: self.fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    None,
    Rule(usize),
    Fallback,
}

struct Session<E> {
    router: Arc<KindClassifier<E, Option<usize>>>,
    delegates: Vec<Arc<dyn RetryPolicy<E>>>,
    fallback: Option<Arc<dyn RetryPolicy<E>>>,
    sessions: Vec<Option<Box<dyn PolicySession<E>>>>,
    fallback_session: Option<Box<dyn PolicySession<E>>>,
    current: Selection,
}

impl<E: Send + Sync + 'static> PolicySession<E> for Session<E> {
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool {
        match self.current {
            Selection::None => true,
            Selection::Rule(index) => match &mut self.sessions[index] {
                Some(session) => session.can_retry(ctx),
                None => true,
            },
            Selection::Fallback => match &mut self.fallback_session {
                Some(session) => session.can_retry(ctx),
                None => true,
            },
        }
    }

    fn on_fault(&mut self, ctx: &RetryContext<E>) -> Result<(), Unrouted> {
        let routed = ctx.with_last_fault(|fault| self.router.classify(fault));

        match routed {
            Some(index) => {
                self.current = Selection::Rule(index);
                if self.sessions[index].is_none() {
                    self.sessions[index] = Some(self.delegates[index].open(ctx));
                }
                if let Some(session) = &mut self.sessions[index] {
                    return session.on_fault(ctx);
                }
                Ok(())
            }
            None => match &self.fallback {
                Some(policy) => {
                    self.current = Selection::Fallback;
                    if self.fallback_session.is_none() {
                        self.fallback_session = Some(policy.open(ctx));
                    }
                    if let Some(session) = &mut self.fallback_session {
                        return session.on_fault(ctx);
                    }
                    Ok(())
                }
                None => Err(Unrouted),
            },
        }
    }

    fn close(&mut self, ctx: &RetryContext<E>) {
        for session in self.sessions.iter_mut().flatten() {
            session.close(ctx);
        }
        if let Some(session) = &mut self.fallback_session {
            session.close(ctx);
        }
    }
}
