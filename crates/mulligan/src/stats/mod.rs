// Copyright (c) Microsoft Corporation.

//! Rolling retry statistics, keyed by execution label.
//!
//! A [`StatsRepository`] holds one [`RetryStatistics`] record per label.
//! Records carry monotonic totals plus exponentially decayed rolling values
//! (see [`RollingCounter`]) so dashboards can show both lifetime counts and
//! recent rates. Wire the repository into an engine by registering a
//! [`StatisticsListener`] and giving the engine a label.

mod listener;
mod rolling;

pub use listener::StatisticsListener;
pub use rolling::RollingCounter;

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use snooze::Clock;

/// The default rolling window for decayed counters.
const DEFAULT_WINDOW: Duration = Duration::from_secs(15);

/// Lifetime totals for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct StatsSnapshot {
    /// Attempts started.
    pub started: u64,
    /// Executions that ended with a successful operation result.
    pub complete: u64,
    /// Faults observed.
    pub error: u64,
    /// Executions that exhausted their attempts without recovery.
    pub abort: u64,
    /// Executions that ended through a recovery path.
    pub recovery: u64,
}

/// Rolling (exponentially decayed) values for one label.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[non_exhaustive]
pub struct RollingSnapshot {
    /// Recent attempts started.
    pub started: f64,
    /// Recent successful executions.
    pub complete: f64,
    /// Recent faults.
    pub error: f64,
    /// Recent aborted executions.
    pub abort: f64,
    /// Recent recovered executions.
    pub recovery: f64,
}

#[derive(Debug)]
struct Counter {
    total: AtomicU64,
    rolling: RollingCounter,
}

impl Counter {
    fn new(window: Duration, clock: &Clock) -> Self {
        Self {
            total: AtomicU64::new(0),
            rolling: RollingCounter::new(window, clock),
        }
    }

    fn increment(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.rolling.increment();
    }
}

/// Counters for one label.
#[derive(Debug)]
pub struct RetryStatistics {
    started: Counter,
    complete: Counter,
    error: Counter,
    abort: Counter,
    recovery: Counter,
}

impl RetryStatistics {
    fn new(window: Duration, clock: &Clock) -> Self {
        Self {
            started: Counter::new(window, clock),
            complete: Counter::new(window, clock),
            error: Counter::new(window, clock),
            abort: Counter::new(window, clock),
            recovery: Counter::new(window, clock),
        }
    }

    /// The lifetime totals.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started: self.started.total.load(Ordering::Relaxed),
            complete: self.complete.total.load(Ordering::Relaxed),
            error: self.error.total.load(Ordering::Relaxed),
            abort: self.abort.total.load(Ordering::Relaxed),
            recovery: self.recovery.total.load(Ordering::Relaxed),
        }
    }

    /// The rolling values as of now.
    #[must_use]
    pub fn rolling(&self) -> RollingSnapshot {
        RollingSnapshot {
            started: self.started.rolling.value(),
            complete: self.complete.rolling.value(),
            error: self.error.rolling.value(),
            abort: self.abort.rolling.value(),
            recovery: self.recovery.rolling.value(),
        }
    }

    pub(crate) fn add_started(&self) {
        self.started.increment();
    }

    pub(crate) fn add_complete(&self) {
        self.complete.increment();
    }

    pub(crate) fn add_error(&self) {
        self.error.increment();
    }

    pub(crate) fn add_abort(&self) {
        self.abort.increment();
    }

    pub(crate) fn add_recovery(&self) {
        self.recovery.increment();
    }
}

/// Label-keyed statistics records.
///
/// Records are created on first use and live for the repository's lifetime.
#[derive(Debug)]
pub struct StatsRepository {
    entries: DashMap<Arc<str>, Arc<RetryStatistics>>,
    window: Duration,
    clock: Clock,
}

impl Default for StatsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRepository {
    /// A repository using the system clock and the default 15 s window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            window: DEFAULT_WINDOW,
            clock: Clock::new(),
        }
    }

    /// Sets the rolling window for records created afterwards.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Replaces the clock used by rolling counters.
    #[must_use]
    pub fn with_clock(mut self, clock: &Clock) -> Self {
        self.clock = clock.clone();
        self
    }

    /// Returns the record for `label`, creating it on first use.
    #[must_use]
    pub fn stats(&self, label: &str) -> Arc<RetryStatistics> {
        if let Some(existing) = self.entries.get(label) {
            return Arc::clone(existing.value());
        }

        let created = Arc::new(RetryStatistics::new(self.window, &self.clock));
        self.entries.insert(Arc::from(label), Arc::clone(&created));
        created
    }

    /// Returns the record for `label` without creating one.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<Arc<RetryStatistics>> {
        self.entries.get(label).map(|entry| Arc::clone(entry.value()))
    }

    /// The labels with records.
    #[must_use]
    pub fn labels(&self) -> Vec<Arc<str>> {
        self.entries.iter().map(|entry| Arc::clone(entry.key())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_created_on_first_use() {
        let repo = StatsRepository::new();
        assert!(repo.get("transfer").is_none());

        let stats = repo.stats("transfer");
        stats.add_started();

        assert_eq!(repo.get("transfer").expect("record created").snapshot().started, 1);
        assert_eq!(repo.labels(), vec![Arc::<str>::from("transfer")]);
    }

    #[test]
    fn snapshot_reports_every_counter() {
        let repo = StatsRepository::new();
        let stats = repo.stats("job");

        stats.add_started();
        stats.add_started();
        stats.add_error();
        stats.add_complete();
        stats.add_abort();
        stats.add_recovery();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                started: 2,
                complete: 1,
                error: 1,
                abort: 1,
                recovery: 1,
            }
        );
    }

    #[test]
    fn same_label_resolves_the_same_record() {
        let repo = StatsRepository::new();
        let first = repo.stats("same");
        let second = repo.stats("same");

        first.add_error();
        assert_eq!(second.snapshot().error, 1);
    }
}
