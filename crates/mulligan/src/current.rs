// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Diagnostic access to the retry contexts active on the current thread.
//!
//! The engine threads the context through the operation signature, so regular
//! code never needs this module. It exists for diagnostics: logging hooks and
//! instrumentation that want to know whether they run inside a retry, how
//! deep the nesting is, and what the enclosing execution is called.

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::Arc;

/// A type-erased, read-only view of a live retry context.
pub trait ContextView: Send + Sync {
    /// The number of faults registered so far.
    fn retry_count(&self) -> u32;

    /// The statistics label of the execution, if any.
    fn name(&self) -> Option<Arc<str>>;

    /// Whether the execution was flagged to make no further attempts.
    fn is_exhausted_only(&self) -> bool;
}

impl Debug for dyn ContextView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextView")
            .field("retry_count", &self.retry_count())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

thread_local! {
    static STACK: RefCell<Vec<Arc<dyn ContextView>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the innermost retry context active on this thread, if any.
#[must_use]
pub fn current() -> Option<Arc<dyn ContextView>> {
    STACK.with_borrow(|stack| stack.last().map(Arc::clone))
}

/// Returns how many retry executions are nested on this thread.
#[must_use]
pub fn depth() -> usize {
    STACK.with_borrow(Vec::len)
}

/// Registers a context for the duration of the returned guard.
pub(crate) fn enter(ctx: Arc<dyn ContextView>) -> ScopeGuard {
    STACK.with_borrow_mut(|stack| stack.push(ctx));
    ScopeGuard { _private: () }
}

/// Pops the registered context when dropped.
#[derive(Debug)]
pub(crate) struct ScopeGuard {
    _private: (),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        STACK.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}
