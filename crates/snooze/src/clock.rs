// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Instant, SystemTime};

#[cfg(any(feature = "test-util", test))]
use crate::clock_control::ClockControl;

/// Provides an abstraction for time-related operations.
///
/// The clock is used for:
///
/// - Retrieving the current monotonic time via [`instant`][Self::instant].
///   Prefer this for elapsed-time decisions; it cannot move backwards.
/// - Retrieving the current absolute time via [`system_time`][Self::system_time].
/// - Creating a [`Stopwatch`][crate::Stopwatch] for elapsed-time measurements.
///
/// Cloning a clock is inexpensive and clones share the same time source. In
/// production, construct with [`Clock::new`]; in tests, derive a clock from a
/// [`ClockControl`][crate::ClockControl] (requires the `test-util` feature) so
/// the flow of time can be controlled manually.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    pub(crate) source: Source,
}

#[derive(Debug, Clone, Default)]
pub(crate) enum Source {
    /// Reads the operating system clocks directly.
    #[default]
    System,

    /// Reads time owned by a `ClockControl`.
    #[cfg(any(feature = "test-util", test))]
    Controlled(ClockControl),
}

impl Clock {
    /// Creates a clock that reads the system time.
    #[must_use]
    pub fn new() -> Self {
        Self { source: Source::System }
    }

    /// Creates a clock whose time is frozen until advanced.
    ///
    /// This is a convenience for tests that need a deterministic clock but do
    /// not care about controlling it; use [`ClockControl::to_clock`] when the
    /// test needs to advance time.
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen() -> Self {
        ClockControl::new().to_clock()
    }

    /// Returns the current monotonic time.
    #[must_use]
    pub fn instant(&self) -> Instant {
        match &self.source {
            Source::System => Instant::now(),
            #[cfg(any(feature = "test-util", test))]
            Source::Controlled(control) => control.instant(),
        }
    }

    /// Returns the current absolute time in UTC.
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        match &self.source {
            Source::System => SystemTime::now(),
            #[cfg(any(feature = "test-util", test))]
            Source::Controlled(control) => control.system_time(),
        }
    }
}

impl AsRef<Self> for Clock {
    fn as_ref(&self) -> &Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn assert_types() {
        assert_impl_all!(Clock: Send, Sync, Clone, std::fmt::Debug);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.instant();
        let b = clock.instant();
        assert!(b >= a);
    }

    #[test]
    fn frozen_clock_does_not_move() {
        let clock = Clock::new_frozen();
        let a = clock.instant();
        let b = clock.instant();
        assert_eq!(a, b);
    }

    #[test]
    fn controlled_clock_follows_advances() {
        let control = ClockControl::new();
        let clock = control.to_clock();

        let start = clock.instant();
        control.advance(Duration::from_millis(250));

        assert_eq!(clock.instant() - start, Duration::from_millis(250));
    }

    #[test]
    fn clones_share_the_time_source() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let clone = clock.clone();

        control.advance(Duration::from_secs(1));

        assert_eq!(clock.instant(), clone.instant());
    }
}
