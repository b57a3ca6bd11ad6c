// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fault classification for resilience patterns.
//!
//! Resilience code constantly asks questions of the form "given this fault,
//! what should happen next?" — retry or give up, which pacing to apply, which
//! policy owns the failure. This crate provides types that answer those
//! questions consistently so the decision logic lives in one place instead of
//! being scattered across call sites.
//!
//! # Core Types
//!
//! - [`Classifier`]: maps a fault to a caller-chosen verdict type.
//! - [`KindClassifier`]: an ordered rule list with a default, memoized by the
//!   fault's concrete variant.
//! - [`BinaryClassifier`]: a yes/no classifier built from a list of concrete
//!   error types, with optional traversal of the `source()` chain.
//! - [`PatternClassifier`]: first-match regular expressions over the rendered
//!   fault message.
//! - [`Chained`]: feeds the verdict of one classifier into another.
//!
//! # Examples
//!
//! ```rust
//! use triage::{Classifier, KindClassifier};
//!
//! #[derive(Debug)]
//! enum DatabaseError {
//!     ConnectionTimeout,
//!     InvalidCredentials,
//! }
//!
//! let classifier = KindClassifier::builder(false)
//!     .when(|e| matches!(e, DatabaseError::ConnectionTimeout), true)
//!     .build();
//!
//! assert!(classifier.classify(Some(&DatabaseError::ConnectionTimeout)));
//! assert!(!classifier.classify(Some(&DatabaseError::InvalidCredentials)));
//! assert!(!classifier.classify(None));
//! ```

mod binary;
mod chain;
mod kind;
mod pattern;

pub use binary::{BinaryClassifier, BinaryClassifierBuilder};
pub use chain::Chained;
pub use kind::{KindClassifier, KindClassifierBuilder};
pub use pattern::{PatternClassifier, PatternClassifierBuilder};

/// Maps a fault to a verdict.
///
/// A classifier is configured once and then shared; implementations must be
/// safe to call concurrently. The fault is passed as an `Option` so callers
/// that have not yet observed a failure can still ask for the default
/// verdict: `classify(None)` always returns the classifier's default.
pub trait Classifier<E: ?Sized, C>: Send + Sync {
    /// Returns the verdict for the given fault, or the default verdict when
    /// no fault is present.
    fn classify(&self, fault: Option<&E>) -> C;
}

impl<E: ?Sized, C, T> Classifier<E, C> for std::sync::Arc<T>
where
    T: Classifier<E, C> + ?Sized,
{
    fn classify(&self, fault: Option<&E>) -> C {
        self.as_ref().classify(fault)
    }
}