// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// A pause was interrupted before the full period elapsed.
///
/// Returned by [`Sleeper::sleep`][crate::Sleeper::sleep] implementations that
/// can be woken early. The caller is expected to treat the surrounding
/// operation as aborted rather than re-entering the pause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pause of {requested:?} was interrupted")]
pub struct Interrupted {
    /// The originally requested pause.
    pub requested: Duration,
}
