// Copyright (c) Microsoft Corporation.

//! A retry runtime for fallible operations.
//!
//! This crate wraps transient failures — network hiccups, deadlock losers,
//! temporarily unavailable peers — in a uniform, composable policy envelope.
//! An engine ([`Retrier`]) repeatedly invokes a caller-supplied operation
//! until it succeeds or a [retry policy][policy] declares the attempt series
//! exhausted, pausing between attempts per a [backoff policy][backoff] and
//! finally handing control to an optional [recovery path][recover].
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use mulligan::Retrier;
//!
//! let retrier: Retrier<std::io::Error> = Retrier::builder()
//!     .max_attempts(3)
//!     .retry_on::<std::io::Error>()
//!     .fixed_backoff(Duration::from_millis(50))
//!     .build()?;
//!
//! let mut attempts = 0;
//! let value = retrier.execute(|_ctx| {
//!     attempts += 1;
//!     if attempts < 3 {
//!         Err(std::io::Error::other("connection reset"))
//!     } else {
//!         Ok("delivered")
//!     }
//! })?;
//!
//! assert_eq!(value, "delivered");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Components
//!
//! - [`policy`]: decides, per failure, whether another attempt is permitted —
//!   attempt bounds, fault-type gates, composites, per-kind routing, circuit
//!   breaking.
//! - [`backoff`]: computes the pause between attempts — fixed, uniform
//!   random, exponential (with or without jitter), per-kind routing.
//! - [`recover`]: the fallback invoked on exhaustion, including type-based
//!   dispatch over a set of handlers.
//! - [`stats`]: rolling per-label statistics fed by a listener.
//! - [`cache`] and [`RetryState`]: stateful retries that span `execute`
//!   calls so a surrounding transaction can roll back between attempts.
//! - [`current`]: diagnostic access to the retry contexts live on the
//!   current thread.
//!
//! Fault classification is provided by the [`triage`] crate; time and sleep
//! plumbing by [`snooze`].
//!
//! # Threading model
//!
//! The engine runs entirely on the caller's thread and blocks it during
//! backoff; it never spawns threads. Policies, backoff policies, listeners,
//! and classifiers are configured once and shared immutably. Stateful
//! executions sharing one cache key serialize their policy transitions but
//! not their operations; callers needing one-at-a-time semantics must add
//! their own coordination.

pub mod backoff;
pub mod cache;
mod context;
pub mod current;
mod error;
mod listener;
pub mod policy;
pub mod recover;
pub mod retrier;
mod state;
pub mod stats;

pub use context::{AttrValue, RetryContext, attrs};
pub use error::RetryError;
pub use listener::RetryListener;
pub use retrier::{BackoffOptions, BuildError, Retrier, RetrierBuilder};
pub use state::{RetryState, StateKey};

#[doc(inline)]
pub use triage::{BinaryClassifier, Classifier, KindClassifier};
