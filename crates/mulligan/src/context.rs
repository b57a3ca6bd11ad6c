// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::current::ContextView;

/// Well-known attribute names used by the engine, policies, and listeners.
///
/// Attributes are the out-of-band channel between collaborators that do not
/// know each other's concrete types. The engine owns the lifecycle attributes
/// (`context.closed`, `context.recovered`, `context.exhausted`); policies own
/// the rest.
pub mod attrs {
    /// The label under which this execution reports statistics.
    pub const NAME: &str = "context.name";

    /// The state key of a stateful execution, rendered as a string.
    pub const STATE_KEY: &str = "context.state_key";

    /// Set when the execution finished with a successful operation result.
    pub const CLOSED: &str = "context.closed";

    /// Set when the execution finished through a recovery path.
    pub const RECOVERED: &str = "context.recovered";

    /// Set when the execution exhausted its attempts without recovery.
    pub const EXHAUSTED: &str = "context.exhausted";

    /// Set by a policy to instruct the engine to skip recovery entirely.
    pub const NO_RECOVERY: &str = "context.no_recovery";

    /// Whether a circuit breaker guarding this context is currently open.
    pub const CIRCUIT_OPEN: &str = "circuit.open";

    /// How many calls were rejected while the circuit was open.
    pub const CIRCUIT_SHORT_COUNT: &str = "circuit.short_count";

    /// Marks a context that must stay cached across executions (e.g. the
    /// shared context of a circuit breaker). Exhaustion does not evict it.
    pub const GLOBAL_STATE: &str = "state.global";
}

/// An attribute value stored in a [`RetryContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer counter or ordinal.
    Int(i64),
    /// A string value.
    Str(Arc<str>),
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<Arc<str>> for AttrValue {
    fn from(value: Arc<str>) -> Self {
        Self::Str(value)
    }
}

/// The per-execution record of a retry.
///
/// A context is created when the engine starts an execution (or resolved from
/// the context cache in stateful mode) and carries everything observers need:
/// the retry count, the most recent fault, a one-way exhaustion latch, and a
/// string-keyed attribute bag for out-of-band state.
///
/// The context is interior-mutable and shared behind an [`Arc`]: the engine
/// mutates it, while policies, listeners, and the operation itself observe it
/// concurrently.
pub struct RetryContext<E> {
    parent: Option<Arc<dyn ContextView>>,
    count: AtomicU32,
    last_fault: Mutex<Option<E>>,
    exhausted_only: AtomicBool,
    attributes: RwLock<HashMap<Cow<'static, str>, AttrValue>>,
}

impl<E> Debug for RetryContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryContext")
            .field("retry_count", &self.retry_count())
            .field("exhausted_only", &self.is_exhausted_only())
            .field("has_fault", &self.has_fault())
            .finish_non_exhaustive()
    }
}

impl<E> RetryContext<E> {
    pub(crate) fn new(parent: Option<Arc<dyn ContextView>>) -> Self {
        Self {
            parent,
            count: AtomicU32::new(0),
            last_fault: Mutex::new(None),
            exhausted_only: AtomicBool::new(false),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of faults registered so far.
    ///
    /// The count starts at zero and increments exactly once per registered
    /// fault, so during attempt `n` (1-based) the count reads `n - 1`.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Signals that no further attempts should be made.
    ///
    /// This is a one-way latch: once set it cannot be cleared within the same
    /// context. Operations use it to bail out of a retry loop they know
    /// cannot succeed.
    pub fn set_exhausted_only(&self) {
        self.exhausted_only.store(true, Ordering::Release);
    }

    /// Whether [`set_exhausted_only`][Self::set_exhausted_only] was called.
    #[must_use]
    pub fn is_exhausted_only(&self) -> bool {
        self.exhausted_only.load(Ordering::Acquire)
    }

    /// Whether a fault is currently recorded.
    #[must_use]
    pub fn has_fault(&self) -> bool {
        self.last_fault.lock().is_some()
    }

    /// Records a fault: increments the retry count and replaces the stored
    /// fault.
    pub(crate) fn record_fault(&self, fault: E) {
        *self.last_fault.lock() = Some(fault);
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Borrows the most recently recorded fault.
    ///
    /// The fault lock is held while `f` runs: the closure must not call
    /// fault accessors on the same context again.
    pub fn with_last_fault<R>(&self, f: impl FnOnce(Option<&E>) -> R) -> R {
        f(self.last_fault.lock().as_ref())
    }

    pub(crate) fn take_last_fault(&self) -> Option<E> {
        self.last_fault.lock().take()
    }

    /// Returns a copy of the attribute stored under `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.attributes.read().get(name).cloned()
    }

    /// Stores an attribute, replacing any previous value under `name`.
    pub fn set_attribute(&self, name: impl Into<Cow<'static, str>>, value: impl Into<AttrValue>) {
        self.attributes.write().insert(name.into(), value.into());
    }

    /// Removes an attribute. Removing an absent attribute is a no-op.
    pub fn remove_attribute(&self, name: &str) {
        self.attributes.write().remove(name);
    }

    /// Whether the attribute under `name` is the boolean `true`.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.attribute(name), Some(AttrValue::Bool(true)))
    }

    /// The statistics label of this execution, if one was assigned.
    #[must_use]
    pub fn name(&self) -> Option<Arc<str>> {
        match self.attribute(attrs::NAME) {
            Some(AttrValue::Str(name)) => Some(name),
            _ => None,
        }
    }

    /// The enclosing retry context when executions nest on one thread.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<dyn ContextView>> {
        self.parent.as_ref()
    }
}

impl<E: Send + Sync + 'static> ContextView for RetryContext<E> {
    fn retry_count(&self) -> u32 {
        self.retry_count()
    }

    fn name(&self) -> Option<Arc<str>> {
        self.name()
    }

    fn is_exhausted_only(&self) -> bool {
        self.is_exhausted_only()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    fn context() -> RetryContext<std::io::Error> {
        RetryContext::new(None)
    }

    #[test]
    fn assert_types() {
        assert_impl_all!(RetryContext<std::io::Error>: Send, Sync, Debug);
        assert_impl_all!(AttrValue: Send, Sync, Clone, PartialEq, Debug);
    }

    #[test]
    fn count_increments_once_per_fault() {
        let ctx = context();
        assert_eq!(ctx.retry_count(), 0);

        ctx.record_fault(std::io::Error::other("one"));
        assert_eq!(ctx.retry_count(), 1);

        ctx.record_fault(std::io::Error::other("two"));
        assert_eq!(ctx.retry_count(), 2);
    }

    #[test]
    fn last_fault_is_most_recent() {
        let ctx = context();
        ctx.record_fault(std::io::Error::other("one"));
        ctx.record_fault(std::io::Error::other("two"));

        ctx.with_last_fault(|fault| {
            assert_eq!(fault.expect("fault recorded").to_string(), "two");
        });
    }

    #[test]
    fn take_clears_the_fault_but_not_the_count() {
        let ctx = context();
        ctx.record_fault(std::io::Error::other("one"));

        let taken = ctx.take_last_fault();
        assert!(taken.is_some());
        assert!(!ctx.has_fault());
        assert_eq!(ctx.retry_count(), 1);
    }

    #[test]
    fn exhausted_only_latches() {
        let ctx = context();
        assert!(!ctx.is_exhausted_only());
        ctx.set_exhausted_only();
        assert!(ctx.is_exhausted_only());
    }

    #[test]
    fn attributes_round_trip() {
        let ctx = context();
        ctx.set_attribute(attrs::NAME, "transfer");
        ctx.set_attribute(attrs::CIRCUIT_SHORT_COUNT, 3i64);
        ctx.set_attribute(attrs::CIRCUIT_OPEN, true);

        assert_eq!(ctx.name().as_deref(), Some("transfer"));
        assert_eq!(ctx.attribute(attrs::CIRCUIT_SHORT_COUNT), Some(AttrValue::Int(3)));
        assert!(ctx.flag(attrs::CIRCUIT_OPEN));

        ctx.remove_attribute(attrs::CIRCUIT_OPEN);
        assert!(!ctx.flag(attrs::CIRCUIT_OPEN));
        ctx.remove_attribute(attrs::CIRCUIT_OPEN);
    }

    #[test]
    fn missing_flag_reads_false() {
        let ctx = context();
        assert!(!ctx.flag(attrs::NO_RECOVERY));
    }
}
