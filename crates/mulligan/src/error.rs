// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;

use crate::cache::CacheCapacityExceeded;

/// The failure surface of a retry execution.
///
/// The engine either returns the operation's value or one of these. The
/// original fault, when one is available, is carried inside the variant and
/// exposed through [`source`][Error::source] and
/// [`into_fault`][Self::into_fault].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: Error + 'static,
{
    /// All permitted attempts failed; the final fault is inside.
    #[error("retry attempts exhausted")]
    Exhausted(#[source] E),

    /// A stateful execution failed and its retry state was retained; the
    /// caller is expected to roll back and re-enter.
    #[error("operation failed; retry state retained for a later call")]
    Failed(#[source] E),

    /// A listener vetoed the execution before the first attempt.
    #[error("retry terminated by a listener")]
    Terminated,

    /// The pause between attempts was interrupted.
    #[error("backoff interrupted")]
    BackoffInterrupted(#[source] snooze::Interrupted),

    /// A stateful execution was entered but its cached policy permits no
    /// attempts and no recovery path applies.
    #[error("retry state exhausted with no recovery path")]
    ExhaustedRetry,

    /// The context cache refused a new entry. This is a configuration
    /// problem, not a retryable condition.
    #[error(transparent)]
    CacheCapacityExceeded(#[from] CacheCapacityExceeded),

    /// A routing policy had no rule for the registered fault. This is a
    /// programming error in the policy configuration.
    #[error("no retry policy routed for the registered fault")]
    Unclassified,
}

impl<E> RetryError<E>
where
    E: Error + 'static,
{
    /// Borrows the operation fault carried by this error, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&E> {
        match self {
            Self::Exhausted(fault) | Self::Failed(fault) => Some(fault),
            _ => None,
        }
    }

    /// Consumes this error, returning the operation fault if one is carried.
    #[must_use]
    pub fn into_fault(self) -> Option<E> {
        match self {
            Self::Exhausted(fault) | Self::Failed(fault) => Some(fault),
            _ => None,
        }
    }
}
