// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use snooze::Interrupted;
use triage::{Classifier, KindClassifier, KindClassifierBuilder};

use crate::backoff::{BackoffPolicy, BackoffSession, NoBackoff};
use crate::context::RetryContext;

/// Routes each fault kind to its own delegate backoff policy.
///
/// The last registered fault selects the delegate: a rate-limit response can
/// pace in seconds while a deadlock loser re-runs almost immediately. Faults
/// matching no rule use the fallback delegate, which defaults to
/// [`NoBackoff`].
///
/// Delegate pacing state is keyed by delegate policy identity: when faults of
/// two kinds route to the same delegate instance they advance one shared
/// schedule, and interleaving kinds does not reset any delegate's progress.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::backoff::{FixedBackoff, RoutedBackoff};
///
/// #[derive(Debug)]
/// enum Fault {
///     RateLimited,
///     Deadlock,
/// }
///
/// let backoff = RoutedBackoff::builder()
///     .when(|f: &Fault| matches!(f, Fault::RateLimited), FixedBackoff::new(Duration::from_secs(5)))
///     .when(|f: &Fault| matches!(f, Fault::Deadlock), FixedBackoff::new(Duration::from_millis(10)))
///     .build();
/// ```
pub struct RoutedBackoff<E> {
    router: Arc<KindClassifier<E, Option<usize>>>,
    delegates: Vec<Arc<dyn BackoffPolicy<E>>>,
    fallback: Arc<dyn BackoffPolicy<E>>,
}

impl<E> Debug for RoutedBackoff<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedBackoff").field("delegates", &self.delegates.len()).finish_non_exhaustive()
    }
}

impl<E> RoutedBackoff<E>
where
    E: Send + Sync + 'static,
{
    /// Starts building a routed backoff.
    #[must_use]
    pub fn builder() -> RoutedBackoffBuilder<E> {
        RoutedBackoffBuilder {
            router: KindClassifier::builder(None),
            delegates: Vec::new(),
            fallback: Arc::new(NoBackoff),
        }
    }
}

impl<E: Send + Sync + 'static> BackoffPolicy<E> for RoutedBackoff<E> {
    fn start(&self, _ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        Box::new(Session {
            router: Arc::clone(&self.router),
            delegates: self.delegates.clone(),
            fallback: Arc::clone(&self.fallback),
            sessions: Vec::new(),
        })
    }
}

/// Builder for [`RoutedBackoff`].
pub struct RoutedBackoffBuilder<E> {
    router: KindClassifierBuilder<E, Option<usize>>,
    delegates: Vec<Arc<dyn BackoffPolicy<E>>>,
    fallback: Arc<dyn BackoffPolicy<E>>,
}

impl<E> Debug for RoutedBackoffBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedBackoffBuilder").field("delegates", &self.delegates.len()).finish_non_exhaustive()
    }
}

impl<E> RoutedBackoffBuilder<E>
where
    E: Send + Sync + 'static,
{
    /// Routes faults matching `matcher` to `policy`.
    ///
    /// Rules are tried in registration order; matchers must be variant-pure
    /// (see [`KindClassifier`]).
    #[must_use]
    pub fn when<F>(mut self, matcher: F, policy: impl BackoffPolicy<E> + 'static) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let index = self.delegates.len();
        self.delegates.push(Arc::new(policy));
        self.router = self.router.when(matcher, Some(index));
        self
    }

    /// Routes faults matching `matcher` to an already shared delegate.
    ///
    /// Use this to let several fault kinds advance one shared schedule.
    #[must_use]
    pub fn when_shared<F>(mut self, matcher: F, policy: &Arc<dyn BackoffPolicy<E>>) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let index = self.delegates.len();
        self.delegates.push(Arc::clone(policy));
        self.router = self.router.when(matcher, Some(index));
        self
    }

    /// Replaces the fallback used for unmatched faults.
    #[must_use]
    pub fn otherwise(mut self, policy: impl BackoffPolicy<E> + 'static) -> Self {
        self.fallback = Arc::new(policy);
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> RoutedBackoff<E> {
        RoutedBackoff {
            router: Arc::new(self.router.build()),
            delegates: self.delegates,
            fallback: self.fallback,
        }
    }
}

struct Session<E> {
    router: Arc<KindClassifier<E, Option<usize>>>,
    delegates: Vec<Arc<dyn BackoffPolicy<E>>>,
    fallback: Arc<dyn BackoffPolicy<E>>,
    /// Delegate pacing state, keyed by delegate policy identity.
    sessions: Vec<(usize, Box<dyn BackoffSession<E>>)>,
}

impl<E: Send + Sync + 'static> Session<E> {
    fn delegate_for(&mut self, ctx: &RetryContext<E>) -> &mut Box<dyn BackoffSession<E>> {
        let routed = ctx.with_last_fault(|fault| self.router.classify(fault));

        let policy = match routed {
            Some(index) => &self.delegates[index],
            None => &self.fallback,
        };

        let key = Arc::as_ptr(policy).cast::<()>() as usize;
        if let Some(position) = self.sessions.iter().position(|(existing, _)| *existing == key) {
            return &mut self.sessions[position].1;
        }

        let session = policy.start(ctx);
        self.sessions.push((key, session));
        let last = self.sessions.len() - 1;
        &mut self.sessions[last].1
    }
}

impl<E: Send + Sync + 'static> BackoffSession<E> for Session<E> {
    fn backoff(&mut self, ctx: &RetryContext<E>) -> Result<(), Interrupted> {
        self.delegate_for(ctx).backoff(ctx)
    }
}
