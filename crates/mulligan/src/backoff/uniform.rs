// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use snooze::{Interrupted, Sleeper, ThreadSleeper};

use crate::backoff::jitter::JitterSource;
use crate::backoff::{BackoffPolicy, BackoffSession};
use crate::context::RetryContext;

const DEFAULT_MIN: Duration = Duration::from_millis(500);
const DEFAULT_MAX: Duration = Duration::from_millis(1500);

/// Pauses for a period drawn uniformly from `[min, max]`.
///
/// When `max <= min` the pause is simply `min`, collapsing to a fixed
/// backoff.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::backoff::UniformRandomBackoff;
///
/// let backoff = UniformRandomBackoff::new(Duration::from_millis(100), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct UniformRandomBackoff {
    min: Duration,
    max: Duration,
    sleeper: Arc<dyn Sleeper>,
    jitter: JitterSource,
}

impl Default for UniformRandomBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN, DEFAULT_MAX)
    }
}

impl UniformRandomBackoff {
    /// A pause drawn uniformly from `[min, max]`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            sleeper: Arc::new(ThreadSleeper),
            jitter: JitterSource::default(),
        }
    }

    /// Replaces the sleeper that performs the pause.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }
}

impl<E: Send + Sync + 'static> BackoffPolicy<E> for UniformRandomBackoff {
    fn start(&self, _ctx: &RetryContext<E>) -> Box<dyn BackoffSession<E>> {
        Box::new(Session {
            min: self.min,
            max: self.max,
            sleeper: Arc::clone(&self.sleeper),
            jitter: self.jitter.clone(),
        })
    }
}

struct Session {
    min: Duration,
    max: Duration,
    sleeper: Arc<dyn Sleeper>,
    jitter: JitterSource,
}

impl<E> BackoffSession<E> for Session {
    fn backoff(&mut self, _ctx: &RetryContext<E>) -> Result<(), Interrupted> {
        self.sleeper.sleep(self.jitter.between(self.min, self.max))
    }
}
