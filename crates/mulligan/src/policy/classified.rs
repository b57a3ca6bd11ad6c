// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use triage::Classifier;

use crate::context::RetryContext;
use crate::policy::{PolicySession, RetryPolicy};

/// Permits retries only for faults a classifier maps to `true`.
///
/// Before any fault is registered the initial attempt is always permitted.
/// The policy enforces no attempt bound; combine with
/// [`MaxAttemptsPolicy`][crate::policy::MaxAttemptsPolicy] (or use
/// [`SimplePolicy`][crate::policy::SimplePolicy], which does exactly that).
///
/// # Examples
///
/// ```
/// use mulligan::policy::ClassifiedPolicy;
/// use triage::BinaryClassifier;
///
/// let policy: ClassifiedPolicy<std::io::Error> =
///     ClassifiedPolicy::new(BinaryClassifier::accepting().on::<std::io::Error>().build());
/// ```
pub struct ClassifiedPolicy<E> {
    classifier: Arc<dyn Classifier<E, bool>>,
}

impl<E> Debug for ClassifiedPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifiedPolicy").finish_non_exhaustive()
    }
}

impl<E> Clone for ClassifiedPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<E> ClassifiedPolicy<E> {
    /// A policy gated by the given classifier.
    pub fn new(classifier: impl Classifier<E, bool> + 'static) -> Self {
        Self {
            classifier: Arc::new(classifier),
        }
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for ClassifiedPolicy<E> {
    fn open(&self, _ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        Box::new(Session {
            classifier: Arc::clone(&self.classifier),
        })
    }
}

struct Session<E> {
    classifier: Arc<dyn Classifier<E, bool>>,
}

impl<E: Send + Sync + 'static> PolicySession<E> for Session<E> {
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool {
        ctx.with_last_fault(|fault| match fault {
            None => true,
            Some(fault) => self.classifier.classify(Some(fault)),
        })
    }
}

#[cfg(test)]
mod tests {
    use triage::BinaryClassifier;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("fatal")]
    struct Fatal;

    #[test]
    fn initial_attempt_is_permitted() {
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let policy = ClassifiedPolicy::new(BinaryClassifier::accepting().build());
        let mut session = policy.open(&ctx);

        assert!(session.can_retry(&ctx));
    }

    #[test]
    fn verdict_follows_the_classifier() {
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let policy = ClassifiedPolicy::new(BinaryClassifier::accepting().on::<std::io::Error>().build());
        let mut session = policy.open(&ctx);

        ctx.record_fault(std::io::Error::other("reset"));
        assert!(session.can_retry(&ctx));
    }

    #[test]
    fn unlisted_fault_is_refused() {
        let ctx: RetryContext<Fatal> = RetryContext::new(None);
        let policy = ClassifiedPolicy::new(BinaryClassifier::accepting().on::<std::io::Error>().build());
        let mut session = policy.open(&ctx);

        ctx.record_fault(Fatal);
        assert!(!session.can_retry(&ctx));
    }
}
