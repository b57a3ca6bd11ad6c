// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Source of the draws behind randomized backoff.
///
/// Randomized pacing only needs statistical spread to desynchronize callers,
/// so the draws are **not cryptographically secure**. Production sources draw
/// from a thread-local generator; tests install a deterministic override so
/// schedules can be asserted exactly.
#[derive(Clone, Default)]
pub(crate) struct JitterSource {
    override_draw: Option<Arc<dyn Fn() -> f64 + Send + Sync>>,
}

impl Debug for JitterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.override_draw.is_some() {
            f.write_str("JitterSource(deterministic)")
        } else {
            f.write_str("JitterSource")
        }
    }
}

impl JitterSource {
    /// A pause drawn uniformly from `[min, max]`; degenerate ranges collapse
    /// to `min`.
    pub fn between(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }

        min + (max - min).mul_f64(self.unit())
    }

    /// A stretch factor drawn uniformly from `[1, multiplier)`, used to
    /// spread an exponential interval without shrinking it.
    pub fn stretch(&self, multiplier: f64) -> f64 {
        (multiplier - 1.0).mul_add(self.unit(), 1.0)
    }

    /// Every draw lands on `value`.
    #[cfg(test)]
    pub fn constant(value: f64) -> Self {
        Self {
            override_draw: Some(Arc::new(move || value)),
        }
    }

    /// Draws are consumed from `draws` in order.
    #[cfg(test)]
    pub fn scripted(draws: impl IntoIterator<Item = f64>) -> Self {
        let draws = parking_lot::Mutex::new(draws.into_iter().collect::<Vec<_>>().into_iter());
        Self {
            override_draw: Some(Arc::new(move || draws.lock().next().expect("scripted jitter draws exhausted"))),
        }
    }

    fn unit(&self) -> f64 {
        match &self.override_draw {
            None => fastrand::f64(),
            Some(draw) => draw(),
        }
    }
}
