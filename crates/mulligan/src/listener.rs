// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::context::RetryContext;

/// Observes the lifecycle of retry executions.
///
/// Listeners are registered on the
/// [`RetrierBuilder`][crate::retrier::RetrierBuilder] and shared across
/// executions. Within one execution the callbacks are totally ordered:
/// [`open`][Self::open] fires in registration order,
/// [`on_fault`][Self::on_fault], [`on_success`][Self::on_success], and
/// [`close`][Self::close] fire in reverse registration order.
pub trait RetryListener<E>: Send + Sync {
    /// Called once before the first attempt. Returning `false` vetoes the
    /// execution; the engine surfaces
    /// [`RetryError::Terminated`][crate::RetryError::Terminated] without
    /// invoking the operation.
    fn open(&self, ctx: &RetryContext<E>) -> bool {
        let _ = ctx;
        true
    }

    /// Called after every fault, once the context and policy have recorded
    /// it.
    fn on_fault(&self, ctx: &RetryContext<E>, fault: &E) {
        let _ = (ctx, fault);
    }

    /// Called after a successful attempt. Returning `Err` discards the
    /// result and forces another attempt; the returned fault is handled
    /// exactly like an operation failure.
    fn on_success(&self, ctx: &RetryContext<E>) -> Result<(), E> {
        let _ = ctx;
        Ok(())
    }

    /// Called once when the execution ends, with the final fault when it
    /// ended in failure. The result can no longer be altered here.
    fn close(&self, ctx: &RetryContext<E>, fault: Option<&E>) {
        let _ = (ctx, fault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl RetryListener<std::io::Error> for Silent {}

    #[test]
    fn defaults_are_permissive() {
        let ctx = RetryContext::new(None);
        let listener = Silent;

        assert!(listener.open(&ctx));
        listener.on_fault(&ctx, &std::io::Error::other("x"));
        listener.on_success(&ctx).expect("default on_success accepts");
        listener.close(&ctx, None);
    }
}
