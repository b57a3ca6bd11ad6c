// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::mem::Discriminant;
use std::sync::Arc;

use dashmap::DashMap;

use crate::Classifier;

/// An ordered rule list with a default verdict, memoized per fault variant.
///
/// Rules are evaluated in registration order and the first match wins. When a
/// non-default verdict is resolved it is memoized against the fault's
/// concrete variant (its [`std::mem::discriminant`]), so repeated
/// classification of the same variant costs a single concurrent map lookup
/// instead of a rule scan.
///
/// Memoization requires that rules be *variant-pure*: a rule must decide
/// based on which variant the fault is, never on data carried inside the
/// variant. Decisions that depend on payload data belong in a predicate gate
/// at the call site, not here. For the same reason the fault type should be
/// an enum — the discriminant of a non-enum type is unspecified, which
/// collapses every value into one memo slot.
///
/// # Examples
///
/// ```rust
/// use triage::{Classifier, KindClassifier};
///
/// #[derive(Debug)]
/// enum TransferError {
///     Timeout,
///     Refused,
///     Corrupt,
/// }
///
/// let severity = KindClassifier::builder(0u8)
///     .when(|e| matches!(e, TransferError::Timeout), 1)
///     .when(|e| matches!(e, TransferError::Refused), 2)
///     .build();
///
/// assert_eq!(severity.classify(Some(&TransferError::Refused)), 2);
/// assert_eq!(severity.classify(Some(&TransferError::Corrupt)), 0);
/// ```
pub struct KindClassifier<E, C> {
    rules: Vec<Rule<E, C>>,
    default: C,
    memo: DashMap<Discriminant<E>, C>,
}

struct Rule<E, C> {
    matches: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    value: C,
}

impl<E, C: Debug> Debug for KindClassifier<E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindClassifier")
            .field("rules", &self.rules.len())
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl<E, C> KindClassifier<E, C>
where
    C: Clone + PartialEq + Send + Sync,
{
    /// Starts building a classifier that falls back to `default`.
    #[must_use]
    pub fn builder(default: C) -> KindClassifierBuilder<E, C> {
        KindClassifierBuilder {
            rules: Vec::new(),
            default,
        }
    }
}

impl<E, C> Classifier<E, C> for KindClassifier<E, C>
where
    E: Send + Sync,
    C: Clone + PartialEq + Send + Sync,
{
    fn classify(&self, fault: Option<&E>) -> C {
        let Some(fault) = fault else {
            return self.default.clone();
        };

        let tag = std::mem::discriminant(fault);
        if let Some(hit) = self.memo.get(&tag) {
            return hit.clone();
        }

        let resolved = self
            .rules
            .iter()
            .find(|rule| (rule.matches)(fault))
            .map_or_else(|| self.default.clone(), |rule| rule.value.clone());

        // Default resolutions are not memoized so a later reconfiguration
        // path stays observable; only positive matches are cached.
        if resolved != self.default {
            self.memo.insert(tag, resolved.clone());
        }

        resolved
    }
}

/// Builder for [`KindClassifier`].
pub struct KindClassifierBuilder<E, C> {
    rules: Vec<Rule<E, C>>,
    default: C,
}

impl<E, C: Debug> Debug for KindClassifierBuilder<E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindClassifierBuilder")
            .field("rules", &self.rules.len())
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl<E, C> KindClassifierBuilder<E, C>
where
    C: Clone + PartialEq + Send + Sync,
{
    /// Adds a rule; rules are evaluated in the order they were added.
    ///
    /// The matcher must be variant-pure, see the type documentation.
    #[must_use]
    pub fn when<F>(mut self, matches: F, value: C) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            matches: Arc::new(matches),
            value,
        });
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> KindClassifier<E, C> {
        KindClassifier {
            rules: self.rules,
            default: self.default,
            memo: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;

    #[derive(Debug)]
    enum Fault {
        Transient,
        Permanent,
        Unknown,
    }

    #[test]
    fn assert_types() {
        assert_impl_all!(KindClassifier<Fault, bool>: Send, Sync, Debug);
    }

    #[test]
    fn first_matching_rule_wins() {
        let classifier = KindClassifier::builder(0u8)
            .when(|_: &Fault| true, 1)
            .when(|e| matches!(e, Fault::Transient), 2)
            .build();

        assert_eq!(classifier.classify(Some(&Fault::Transient)), 1);
    }

    #[test]
    fn unmatched_fault_gets_default() {
        let classifier = KindClassifier::builder(9u8).when(|e: &Fault| matches!(e, Fault::Transient), 1).build();

        assert_eq!(classifier.classify(Some(&Fault::Unknown)), 9);
        assert_eq!(classifier.classify(None), 9);
    }

    #[test]
    fn memo_skips_rule_scan_on_repeat() {
        let scans = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&scans);

        let classifier = KindClassifier::builder(false)
            .when(
                move |e: &Fault| {
                    observed.fetch_add(1, Ordering::SeqCst);
                    matches!(e, Fault::Transient)
                },
                true,
            )
            .build();

        assert!(classifier.classify(Some(&Fault::Transient)));
        assert!(classifier.classify(Some(&Fault::Transient)));
        assert!(classifier.classify(Some(&Fault::Transient)));

        // One rule scan for the first call, memo hits afterwards.
        assert_eq!(scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_resolutions_are_not_memoized() {
        let scans = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&scans);

        let classifier = KindClassifier::builder(false)
            .when(
                move |e: &Fault| {
                    observed.fetch_add(1, Ordering::SeqCst);
                    matches!(e, Fault::Transient)
                },
                true,
            )
            .build();

        assert!(!classifier.classify(Some(&Fault::Permanent)));
        assert!(!classifier.classify(Some(&Fault::Permanent)));

        assert_eq!(scans.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn variants_are_memoized_independently() {
        let classifier = KindClassifier::builder(0u8)
            .when(|e: &Fault| matches!(e, Fault::Transient), 1)
            .when(|e: &Fault| matches!(e, Fault::Permanent), 2)
            .build();

        assert_eq!(classifier.classify(Some(&Fault::Transient)), 1);
        assert_eq!(classifier.classify(Some(&Fault::Permanent)), 2);
        assert_eq!(classifier.classify(Some(&Fault::Transient)), 1);
        assert_eq!(classifier.classify(Some(&Fault::Permanent)), 2);
    }

    #[test]
    fn shared_classifier_is_safe_under_concurrent_classification() {
        let classifier = Arc::new(
            KindClassifier::builder(false).when(|e: &Fault| matches!(e, Fault::Transient), true).build(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let classifier = Arc::clone(&classifier);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(classifier.classify(Some(&Fault::Transient)));
                        assert!(!classifier.classify(Some(&Fault::Permanent)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("classification thread panicked");
        }
    }
}
