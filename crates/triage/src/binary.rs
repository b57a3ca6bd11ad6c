// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::fmt::Debug;

use crate::Classifier;

/// A yes/no classifier built from a list of concrete error types.
///
/// The classifier is constructed in one of two shapes:
///
/// - [`accepting`][Self::accepting]: listed types classify as `true`,
///   everything else as `false`. Use this to enumerate the faults worth
///   retrying.
/// - [`rejecting`][Self::rejecting]: listed types classify as `false`,
///   everything else as `true`. Use this to enumerate the faults that must
///   stop a retry loop.
///
/// The two shapes are separate builder entry points, so a rule list can never
/// mix both directions.
///
/// With [`traverse_causes`][BinaryClassifierBuilder::traverse_causes]
/// enabled, a fault whose direct classification equals the default is probed
/// again along its [`source`][Error::source] chain; the first cause with a
/// non-default verdict decides.
///
/// # Examples
///
/// ```rust
/// use triage::{BinaryClassifier, Classifier};
///
/// let retryable = BinaryClassifier::accepting().on::<std::io::Error>().build();
///
/// let io = std::io::Error::other("connection reset");
/// assert!(retryable.classify(Some(&io)));
///
/// let fmt = std::fmt::Error;
/// assert!(!retryable.classify(Some(&fmt)));
/// ```
#[derive(Debug, Clone)]
pub struct BinaryClassifier {
    rules: Vec<TypeMatch>,
    default: bool,
    traverse_causes: bool,
}

#[derive(Clone)]
struct TypeMatch {
    name: &'static str,
    test: fn(&(dyn Error + 'static)) -> bool,
}

impl Debug for TypeMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl BinaryClassifier {
    /// Starts a classifier whose listed types classify as `true`.
    #[must_use]
    pub fn accepting() -> BinaryClassifierBuilder {
        BinaryClassifierBuilder {
            rules: Vec::new(),
            default: false,
            traverse_causes: false,
        }
    }

    /// Starts a classifier whose listed types classify as `false`.
    #[must_use]
    pub fn rejecting() -> BinaryClassifierBuilder {
        BinaryClassifierBuilder {
            rules: Vec::new(),
            default: true,
            traverse_causes: false,
        }
    }

    /// Returns the verdict for faults that match no listed type.
    #[must_use]
    pub fn default_verdict(&self) -> bool {
        self.default
    }

    fn classify_direct(&self, fault: &(dyn Error + 'static)) -> bool {
        if self.rules.iter().any(|rule| (rule.test)(fault)) {
            !self.default
        } else {
            self.default
        }
    }

    /// Classifies a fault already behind a `dyn Error` reference.
    #[must_use]
    pub fn classify_dyn(&self, fault: &(dyn Error + 'static)) -> bool {
        let direct = self.classify_direct(fault);
        if direct != self.default || !self.traverse_causes {
            return direct;
        }

        let mut cause = fault.source();
        while let Some(current) = cause {
            let verdict = self.classify_direct(current);
            if verdict != self.default {
                return verdict;
            }
            cause = current.source();
        }

        self.default
    }
}

impl<E> Classifier<E, bool> for BinaryClassifier
where
    E: Error + 'static,
{
    fn classify(&self, fault: Option<&E>) -> bool {
        match fault {
            None => self.default,
            Some(fault) => self.classify_dyn(fault),
        }
    }
}

/// Builder for [`BinaryClassifier`].
#[derive(Debug)]
pub struct BinaryClassifierBuilder {
    rules: Vec<TypeMatch>,
    default: bool,
    traverse_causes: bool,
}

impl BinaryClassifierBuilder {
    /// Adds a concrete error type to the rule list.
    #[must_use]
    pub fn on<T: Error + 'static>(mut self) -> Self {
        self.rules.push(TypeMatch {
            name: std::any::type_name::<T>(),
            test: |fault| fault.is::<T>(),
        });
        self
    }

    /// Probes the `source()` chain when the direct verdict is the default.
    #[must_use]
    pub fn traverse_causes(mut self) -> Self {
        self.traverse_causes = true;
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> BinaryClassifier {
        BinaryClassifier {
            rules: self.rules,
            default: self.default,
            traverse_causes: self.traverse_causes,
        }
    }
}
