// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use crate::Clock;
use crate::clock::Source;

pub(crate) const ERR_POISONED_LOCK: &str = "acquiring lock must always succeed";

/// Controls the passage of time in tests.
///
/// This is useful for testing time-sensitive code without having to wait for
/// real time to pass. `ClockControl` is available when the `test-util`
/// feature is enabled.
///
/// To create a [`Clock`] from `ClockControl`, use the
/// [`to_clock`][Self::to_clock] method. All clocks derived from the same
/// control share the same time, and [`advance`][Self::advance] moves them
/// together.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use snooze::ClockControl;
/// let control = ClockControl::new();
/// let clock = control.to_clock();
///
/// let now = clock.system_time();
/// control.advance(Duration::from_secs(1));
///
/// assert_eq!(
///     clock.system_time().duration_since(now)?,
///     Duration::from_secs(1)
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct ClockControl {
    /// Controlling the passage of time across threads requires a mutex to
    /// keep the state consistent between all derived clocks.
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
struct State {
    base_instant: Instant,
    base_system: SystemTime,
    offset: Duration,
}

impl Default for ClockControl {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClockControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect(ERR_POISONED_LOCK);

        f.debug_struct("ClockControl").field("offset", &state.offset).finish_non_exhaustive()
    }
}

impl ClockControl {
    /// Creates a new `ClockControl` with time frozen at the moment of creation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                base_instant: Instant::now(),
                base_system: SystemTime::UNIX_EPOCH,
                offset: Duration::ZERO,
            })),
        }
    }

    /// Creates a [`Clock`] that reads time from this control.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock {
            source: Source::Controlled(self.clone()),
        }
    }

    /// Advances the controlled time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.offset = state.offset.saturating_add(duration);
    }

    pub(crate) fn instant(&self) -> Instant {
        let state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.base_instant + state.offset
    }

    pub(crate) fn system_time(&self) -> SystemTime {
        let state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.base_system + state.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let start = clock.instant();

        control.advance(Duration::from_secs(1));
        control.advance(Duration::from_secs(2));

        assert_eq!(clock.instant() - start, Duration::from_secs(3));
    }

    #[test]
    fn system_time_starts_at_epoch() {
        let control = ClockControl::new();
        let clock = control.to_clock();

        assert_eq!(clock.system_time(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn debug_does_not_panic() {
        let control = ClockControl::new();
        let rendered = format!("{control:?}");
        assert!(rendered.contains("ClockControl"));
    }
}
