// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use crate::Clock;

/// Measures elapsed time against a [`Clock`].
///
/// A stopwatch remembers the instant it was created and reports how much time
/// has passed since. Because it reads the clock it was created from, elapsed
/// time in tests follows [`ClockControl::advance`][crate::ClockControl::advance].
///
/// # Examples
///
/// ```
/// use snooze::{Clock, Stopwatch};
///
/// let clock = Clock::new();
/// let stopwatch = Stopwatch::new(&clock);
/// // Perform some operation...
/// let _elapsed = stopwatch.elapsed();
/// ```
#[derive(Debug, Clone)]
pub struct Stopwatch {
    clock: Clock,
    started: Instant,
}

impl Stopwatch {
    /// Starts a stopwatch at the clock's current time.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            started: clock.instant(),
        }
    }

    /// Returns the time elapsed since the stopwatch was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.instant().saturating_duration_since(self.started)
    }

    /// Restarts the stopwatch at the clock's current time.
    pub fn restart(&mut self) {
        self.started = self.clock.instant();
    }
}

#[cfg(test)]
mod tests {
    use crate::ClockControl;

    use super::*;

    #[test]
    fn elapsed_tracks_clock_advances() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let stopwatch = Stopwatch::new(&clock);

        control.advance(Duration::from_millis(150));

        assert_eq!(stopwatch.elapsed(), Duration::from_millis(150));
    }

    #[test]
    fn restart_resets_the_origin() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let mut stopwatch = Stopwatch::new(&clock);

        control.advance(Duration::from_secs(1));
        stopwatch.restart();
        control.advance(Duration::from_millis(10));

        assert_eq!(stopwatch.elapsed(), Duration::from_millis(10));
    }
}
