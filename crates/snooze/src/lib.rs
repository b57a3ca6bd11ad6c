// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time plumbing for blocking resilience code.
//!
//! Working with time is notoriously difficult to test: real sleeps slow suites
//! down and real clocks make timing-sensitive assertions flaky. This crate
//! provides two small abstractions that keep time out of the way:
//!
//! - [`Clock`]: a source of monotonic and absolute time. In production it
//!   reads the system clock with near-zero overhead. With the `test-util`
//!   feature enabled, a clock can be created from a [`ClockControl`] which
//!   lets tests advance time manually.
//! - [`Sleeper`]: the primitive that performs a blocking pause. The default
//!   [`ThreadSleeper`] parks the calling thread; the [`RecordingSleeper`]
//!   (`test-util`) records requested pauses without sleeping so tests can
//!   assert on backoff schedules.
//!
//! # Testing
//!
//! ```
//! # #[cfg(feature = "test-util")]
//! # {
//! use std::time::Duration;
//!
//! use snooze::ClockControl;
//!
//! let control = ClockControl::new();
//! let clock = control.to_clock();
//!
//! let start = clock.instant();
//! control.advance(Duration::from_secs(5));
//! assert_eq!(clock.instant() - start, Duration::from_secs(5));
//! # }
//! ```
//!
//! Never enable `test-util` outside of `dev-dependencies`: the controlled
//! clock carries extra state and a lock on every read.

mod clock;
#[cfg(any(feature = "test-util", test))]
mod clock_control;
mod error;
mod sleeper;
mod stopwatch;

pub use clock::Clock;
#[cfg(any(feature = "test-util", test))]
pub use clock_control::ClockControl;
pub use error::Interrupted;
#[cfg(any(feature = "test-util", test))]
pub use sleeper::RecordingSleeper;
pub use sleeper::{Sleeper, ThreadSleeper};
pub use stopwatch::Stopwatch;
