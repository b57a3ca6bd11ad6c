// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use snooze::Clock;

/// An exponentially decayed event counter.
///
/// Each increment first decays the stored value by `exp(-Δt / window)` and
/// then adds one, so the value approximates the number of events in the most
/// recent window. Reads apply the same decay, so an idle counter drifts back
/// toward zero.
#[derive(Debug)]
pub struct RollingCounter {
    window: Duration,
    clock: Clock,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    value: f64,
    updated: Option<Instant>,
}

impl RollingCounter {
    /// A counter decaying over `window`.
    #[must_use]
    pub fn new(window: Duration, clock: &Clock) -> Self {
        Self {
            window,
            clock: clock.clone(),
            state: Mutex::new(State { value: 0.0, updated: None }),
        }
    }

    /// Records one event.
    pub fn increment(&self) {
        let now = self.clock.instant();
        let mut state = self.state.lock();
        state.value = self.decayed(&state, now) + 1.0;
        state.updated = Some(now);
    }

    /// The decayed value as of now.
    #[must_use]
    pub fn value(&self) -> f64 {
        let now = self.clock.instant();
        let state = self.state.lock();
        self.decayed(&state, now)
    }

    fn decayed(&self, state: &State, now: Instant) -> f64 {
        let Some(updated) = state.updated else {
            return state.value;
        };

        let elapsed = now.saturating_duration_since(updated);
        if self.window.is_zero() {
            return state.value;
        }

        state.value * (-elapsed.as_secs_f64() / self.window.as_secs_f64()).exp()
    }
}
