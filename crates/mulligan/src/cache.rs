// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::context::RetryContext;
use crate::policy::PolicySession;
use crate::state::StateKey;

/// The default capacity of the in-memory cache. Deliberately small: retry
/// state that grows past this usually means keys are not being retired.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// A live stateful execution: the shared context plus the policy session
/// that decides its fate.
pub struct Execution<E> {
    ctx: Arc<RetryContext<E>>,
    session: Mutex<Box<dyn PolicySession<E>>>,
}

impl<E> Debug for Execution<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

impl<E> Execution<E> {
    pub(crate) fn new(ctx: Arc<RetryContext<E>>, session: Box<dyn PolicySession<E>>) -> Self {
        Self {
            ctx,
            session: Mutex::new(session),
        }
    }

    /// The retry context of this execution.
    #[must_use]
    pub fn context(&self) -> &Arc<RetryContext<E>> {
        &self.ctx
    }

    /// Runs `f` with exclusive access to the policy session.
    ///
    /// Policy transitions of concurrent callers sharing one cached execution
    /// serialize here; the operation itself runs outside this lock.
    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut Box<dyn PolicySession<E>>) -> R) -> R {
        f(&mut self.session.lock())
    }
}

/// The context cache refused a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("retry context cache capacity {capacity} exceeded")]
pub struct CacheCapacityExceeded {
    /// The configured capacity that was hit.
    pub capacity: usize,
}

/// Maps state keys to live executions so retries can span `execute` calls.
///
/// The default implementation is [`InMemoryContextCache`]. Replace it (e.g.
/// with a cluster-aware version) through
/// [`RetrierBuilder::cache`][crate::retrier::RetrierBuilder::cache]; the
/// concurrency semantics of a replacement are its own concern.
pub trait ContextCache<E>: Send + Sync + Debug {
    /// Returns the execution cached under `key`, if any.
    fn get(&self, key: &StateKey) -> Option<Arc<Execution<E>>>;

    /// Stores an execution under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheCapacityExceeded`] when the cache is full. Callers
    /// treat this as a configuration error, never as a retryable condition.
    fn put(&self, key: StateKey, execution: Arc<Execution<E>>) -> Result<(), CacheCapacityExceeded>;

    /// Removes the entry under `key`. Removing an absent key is a no-op.
    fn remove(&self, key: &StateKey);

    /// Whether an entry exists under `key`.
    fn contains(&self, key: &StateKey) -> bool {
        self.get(key).is_some()
    }
}

/// The default thread-safe, capacity-bounded cache.
pub struct InMemoryContextCache<E> {
    entries: DashMap<StateKey, Arc<Execution<E>>>,
    capacity: usize,
}

impl<E> Debug for InMemoryContextCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContextCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<E> Default for InMemoryContextCache<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<E> InMemoryContextCache<E> {
    /// A cache holding at most `capacity` executions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }
}

impl<E: Send + Sync + 'static> ContextCache<E> for InMemoryContextCache<E> {
    fn get(&self, key: &StateKey) -> Option<Arc<Execution<E>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn put(&self, key: StateKey, execution: Arc<Execution<E>>) -> Result<(), CacheCapacityExceeded> {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            tracing::warn!(capacity = self.capacity, "retry context cache is full");
            return Err(CacheCapacityExceeded { capacity: self.capacity });
        }

        self.entries.insert(key, execution);
        Ok(())
    }

    fn remove(&self, key: &StateKey) {
        self.entries.remove(key);
    }

    fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }
}
