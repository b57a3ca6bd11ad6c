// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use triage::Classifier;

/// Identifies a failed item across stateful executions.
///
/// Callers derive the key from the operation's input — an order id, a message
/// id, a rendered tuple of arguments. Two executions with equal keys resolve
/// the same cached retry context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey(Arc<str>);

impl StateKey {
    /// Creates a key from anything that renders to a string.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// The rendered key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// Selects stateful semantics for an execution.
///
/// With a state present, the engine persists the retry context across
/// `execute` calls (keyed by [`StateKey`]) and re-raises each failure so the
/// surrounding transaction can roll back and re-enter.
///
/// A state without a key keeps the re-raise semantics but bypasses the cache:
/// every call starts from a fresh context.
pub struct RetryState<E> {
    key: Option<StateKey>,
    force_refresh: bool,
    rollback: Option<Arc<dyn Classifier<E, bool>>>,
}

impl<E> Debug for RetryState<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryState")
            .field("key", &self.key)
            .field("force_refresh", &self.force_refresh)
            .field("has_rollback_classifier", &self.rollback.is_some())
            .finish()
    }
}

impl<E> RetryState<E> {
    /// A state identified by `key`.
    pub fn new(key: impl Into<StateKey>) -> Self {
        Self {
            key: Some(key.into()),
            force_refresh: false,
            rollback: None,
        }
    }

    /// A state with no key: stateful semantics without caching.
    #[must_use]
    pub fn keyless() -> Self {
        Self {
            key: None,
            force_refresh: false,
            rollback: None,
        }
    }

    /// Hints that the item is known to be new, so any cached context for the
    /// key is replaced instead of reused.
    #[must_use]
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Restricts which faults are re-raised for rollback.
    ///
    /// Faults the classifier maps to `false` are retried within the same
    /// `execute` call instead of being surfaced. Without a classifier every
    /// fault rolls back.
    #[must_use]
    pub fn rollback_on(mut self, classifier: impl Classifier<E, bool> + 'static) -> Self {
        self.rollback = Some(Arc::new(classifier));
        self
    }

    /// The key, when this state participates in caching.
    #[must_use]
    pub fn key(&self) -> Option<&StateKey> {
        self.key.as_ref()
    }

    /// Whether a cached context should be replaced instead of reused.
    #[must_use]
    pub fn is_force_refresh(&self) -> bool {
        self.force_refresh
    }

    pub(crate) fn rollback_for(&self, fault: &E) -> bool {
        self.rollback.as_ref().is_none_or(|classifier| classifier.classify(Some(fault)))
    }
}
