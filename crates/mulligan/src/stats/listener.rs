// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::context::{RetryContext, attrs};
use crate::listener::RetryListener;
use crate::stats::StatsRepository;

/// Feeds a [`StatsRepository`] from retry lifecycle events.
///
/// Executions are observed under their label (the
/// [`context.name`][attrs::NAME] attribute, set via
/// [`RetrierBuilder::label`][crate::retrier::RetrierBuilder::label]);
/// unlabeled executions are ignored.
///
/// `started` counts *attempts*, not calls. For stateless executions every
/// fault and the final success each mark one attempt, so the rolling rate
/// stays meaningful across long in-call retry loops. Stateful executions
/// make one attempt per `execute` call, counted at close together with the
/// outcome.
#[derive(Debug)]
pub struct StatisticsListener {
    repository: Arc<StatsRepository>,
}

impl StatisticsListener {
    /// A listener reporting into `repository`.
    #[must_use]
    pub fn new(repository: Arc<StatsRepository>) -> Self {
        Self { repository }
    }

    fn is_stateful<E>(ctx: &RetryContext<E>) -> bool {
        ctx.attribute(attrs::STATE_KEY).is_some()
    }
}

impl<E: Send + Sync + 'static> RetryListener<E> for StatisticsListener {
    fn on_fault(&self, ctx: &RetryContext<E>, _fault: &E) {
        let Some(label) = ctx.name() else { return };
        let stats = self.repository.stats(&label);

        stats.add_error();
        if !Self::is_stateful(ctx) {
            stats.add_started();
        }
    }

    fn on_success(&self, ctx: &RetryContext<E>) -> Result<(), E> {
        if let Some(label) = ctx.name() {
            if !Self::is_stateful(ctx) {
                self.repository.stats(&label).add_started();
            }
        }
        Ok(())
    }

    fn close(&self, ctx: &RetryContext<E>, _fault: Option<&E>) {
        let Some(label) = ctx.name() else { return };
        let stats = self.repository.stats(&label);

        if Self::is_stateful(ctx) {
            stats.add_started();
        }

        if ctx.flag(attrs::RECOVERED) {
            stats.add_recovery();
        } else if ctx.flag(attrs::EXHAUSTED) {
            stats.add_abort();
        } else if ctx.flag(attrs::CLOSED) {
            stats.add_complete();
        }
    }
}
