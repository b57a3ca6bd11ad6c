// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use triage::Classifier;

use crate::context::{RetryContext, attrs};
use crate::policy::max_attempts::DEFAULT_MAX_ATTEMPTS;
use crate::policy::{PolicySession, RetryPolicy};

/// The workhorse policy: an attempt bound AND a retryability classifier.
///
/// A fault is retried while the retry count is below the bound and the
/// classifier maps the fault to `true`. Without an explicit classifier every
/// fault is considered retryable.
///
/// An optional *not-recoverable* classifier marks faults that should end the
/// execution immediately **and** skip any configured recovery path; matching
/// faults set the [`context.no_recovery`][attrs::NO_RECOVERY] attribute,
/// which the engine honors.
///
/// # Examples
///
/// ```
/// use mulligan::policy::SimplePolicy;
/// use triage::BinaryClassifier;
///
/// let policy: SimplePolicy<std::io::Error> = SimplePolicy::new(3)
///     .retryable(BinaryClassifier::accepting().on::<std::io::Error>().build());
/// ```
pub struct SimplePolicy<E> {
    max_attempts: u32,
    retryable: Option<Arc<dyn Classifier<E, bool>>>,
    not_recoverable: Option<Arc<dyn Classifier<E, bool>>>,
}

impl<E> Debug for SimplePolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplePolicy")
            .field("max_attempts", &self.max_attempts)
            .field("has_classifier", &self.retryable.is_some())
            .field("has_not_recoverable", &self.not_recoverable.is_some())
            .finish()
    }
}

impl<E> Clone for SimplePolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            retryable: self.retryable.clone(),
            not_recoverable: self.not_recoverable.clone(),
        }
    }
}

impl<E> Default for SimplePolicy<E> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl<E> SimplePolicy<E> {
    /// A policy allowing `max_attempts` attempts of any fault.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retryable: None,
            not_recoverable: None,
        }
    }

    /// Restricts retries to faults the classifier maps to `true`.
    #[must_use]
    pub fn retryable(mut self, classifier: impl Classifier<E, bool> + 'static) -> Self {
        self.retryable = Some(Arc::new(classifier));
        self
    }

    /// Marks faults that end the execution and skip recovery.
    #[must_use]
    pub fn not_recoverable(mut self, classifier: impl Classifier<E, bool> + 'static) -> Self {
        self.not_recoverable = Some(Arc::new(classifier));
        self
    }
}

impl<E: Send + Sync + 'static> RetryPolicy<E> for SimplePolicy<E> {
    fn open(&self, _ctx: &RetryContext<E>) -> Box<dyn PolicySession<E>> {
        Box::new(Session {
            max_attempts: self.max_attempts,
            faults: 0,
            retryable: self.retryable.clone(),
            not_recoverable: self.not_recoverable.clone(),
        })
    }

    fn max_attempts(&self) -> Option<u32> {
        Some(self.max_attempts)
    }
}

struct Session<E> {
    max_attempts: u32,
    faults: u32,
    retryable: Option<Arc<dyn Classifier<E, bool>>>,
    not_recoverable: Option<Arc<dyn Classifier<E, bool>>>,
}

impl<E: Send + Sync + 'static> PolicySession<E> for Session<E> {
    fn can_retry(&mut self, ctx: &RetryContext<E>) -> bool {
        if self.faults >= self.max_attempts {
            return false;
        }

        match &self.retryable {
            None => true,
            Some(classifier) => ctx.with_last_fault(|fault| match fault {
                None => true,
                Some(fault) => classifier.classify(Some(fault)),
            }),
        }
    }

    fn on_fault(&mut self, ctx: &RetryContext<E>) -> Result<(), crate::policy::Unrouted> {
        self.faults = self.faults.saturating_add(1);

        if let Some(classifier) = &self.not_recoverable {
            let matched = ctx.with_last_fault(|fault| classifier.classify(fault));
            if matched {
                ctx.set_attribute(attrs::NO_RECOVERY, true);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use triage::BinaryClassifier;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("corrupt")]
    struct Corrupt;

    #[test]
    fn bound_and_classifier_are_both_enforced() {
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let policy = SimplePolicy::new(2).retryable(BinaryClassifier::accepting().on::<std::io::Error>().build());
        let mut session = policy.open(&ctx);

        assert!(session.can_retry(&ctx));
        ctx.record_fault(std::io::Error::other("1"));
        session.on_fault(&ctx).expect("simple policy routes every fault");
        assert!(session.can_retry(&ctx));
        ctx.record_fault(std::io::Error::other("2"));
        session.on_fault(&ctx).expect("simple policy routes every fault");
        assert!(!session.can_retry(&ctx));
    }

    #[test]
    fn unclassified_fault_stops_retries_before_the_bound() {
        let ctx: RetryContext<Corrupt> = RetryContext::new(None);
        let policy = SimplePolicy::new(5).retryable(BinaryClassifier::accepting().on::<std::io::Error>().build());
        let mut session = policy.open(&ctx);

        ctx.record_fault(Corrupt);
        session.on_fault(&ctx).expect("simple policy routes every fault");
        assert!(!session.can_retry(&ctx));
    }

    #[test]
    fn not_recoverable_fault_sets_the_attribute() {
        let ctx: RetryContext<Corrupt> = RetryContext::new(None);
        let policy = SimplePolicy::new(5).not_recoverable(BinaryClassifier::accepting().on::<Corrupt>().build());
        let mut session = policy.open(&ctx);

        ctx.record_fault(Corrupt);
        session.on_fault(&ctx).expect("simple policy routes every fault");

        assert!(ctx.flag(attrs::NO_RECOVERY));
    }

    #[test]
    fn recoverable_fault_leaves_the_attribute_unset() {
        let ctx: RetryContext<std::io::Error> = RetryContext::new(None);
        let policy = SimplePolicy::new(5).not_recoverable(BinaryClassifier::accepting().on::<Corrupt>().build());
        let mut session = policy.open(&ctx);

        ctx.record_fault(std::io::Error::other("reset"));
        session.on_fault(&ctx).expect("simple policy routes every fault");

        assert!(!ctx.flag(attrs::NO_RECOVERY));
    }
}
