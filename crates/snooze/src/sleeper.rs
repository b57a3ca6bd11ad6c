// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::time::Duration;

use crate::Interrupted;

/// Performs a blocking pause on the calling thread.
///
/// Backoff code is written against this trait so that the pause itself can be
/// replaced: the default [`ThreadSleeper`] really sleeps, while the
/// [`RecordingSleeper`] captures the requested periods for assertions.
pub trait Sleeper: Send + Sync + Debug {
    /// Pauses the calling thread for the given period.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the pause was cut short and the caller
    /// should abandon the surrounding operation.
    fn sleep(&self, period: Duration) -> Result<(), Interrupted>;
}

impl<S> Sleeper for std::sync::Arc<S>
where
    S: Sleeper + ?Sized,
{
    fn sleep(&self, period: Duration) -> Result<(), Interrupted> {
        self.as_ref().sleep(period)
    }
}

/// The production sleeper: blocks the calling thread with [`std::thread::sleep`].
///
/// A standard-library sleep cannot be woken early, so this implementation
/// never reports an interruption.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, period: Duration) -> Result<(), Interrupted> {
        std::thread::sleep(period);
        Ok(())
    }
}

/// A sleeper that records requested pauses instead of performing them.
///
/// Intended for tests that assert on backoff schedules. Clones share the
/// recorded history. An optional interruption point simulates a pause being
/// cut short.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use snooze::{RecordingSleeper, Sleeper};
/// let sleeper = RecordingSleeper::new();
/// sleeper.sleep(Duration::from_millis(50))?;
/// sleeper.sleep(Duration::from_millis(100))?;
///
/// assert_eq!(
///     sleeper.periods(),
///     vec![Duration::from_millis(50), Duration::from_millis(100)]
/// );
/// # Ok::<(), snooze::Interrupted>(())
/// ```
#[cfg(any(feature = "test-util", test))]
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    state: std::sync::Arc<std::sync::Mutex<RecorderState>>,
}

#[cfg(any(feature = "test-util", test))]
#[derive(Debug, Default)]
struct RecorderState {
    periods: Vec<Duration>,
    interrupt_after: Option<usize>,
}

#[cfg(any(feature = "test-util", test))]
impl RecordingSleeper {
    /// Creates a sleeper that records every requested pause.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sleeper that reports an interruption once `count` pauses
    /// have completed.
    #[must_use]
    pub fn interrupting_after(count: usize) -> Self {
        Self {
            state: std::sync::Arc::new(std::sync::Mutex::new(RecorderState {
                periods: Vec::new(),
                interrupt_after: Some(count),
            })),
        }
    }

    /// Returns the pauses requested so far, in order.
    #[must_use]
    pub fn periods(&self) -> Vec<Duration> {
        self.state.lock().expect(crate::clock_control::ERR_POISONED_LOCK).periods.clone()
    }
}

#[cfg(any(feature = "test-util", test))]
impl Sleeper for RecordingSleeper {
    fn sleep(&self, period: Duration) -> Result<(), Interrupted> {
        let mut state = self.state.lock().expect(crate::clock_control::ERR_POISONED_LOCK);

        if let Some(limit) = state.interrupt_after {
            if state.periods.len() >= limit {
                return Err(Interrupted { requested: period });
            }
        }

        state.periods.push(period);
        Ok(())
    }
}
