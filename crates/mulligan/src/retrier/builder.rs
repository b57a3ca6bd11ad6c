// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use snooze::{Clock, Sleeper};
use triage::{BinaryClassifier, BinaryClassifierBuilder};

use crate::backoff::{BackoffPolicy, ExponentialBackoff, ExponentialRandomBackoff, FixedBackoff, NoBackoff, UniformRandomBackoff};
use crate::cache::{ContextCache, InMemoryContextCache};
use crate::listener::RetryListener;
use crate::policy::{CircuitBreakerPolicy, CompositePolicy, GatedPolicy, RetryPolicy, SimplePolicy, TimeoutPolicy};
use crate::retrier::Retrier;

/// The declarative backoff record.
///
/// The fields resolve to a concrete policy by these rules:
///
/// - `multiplier > 1` selects exponential backoff starting at `delay`, with
///   `max_delay` as the ceiling when it exceeds `delay`; `random` selects
///   the jitter variant.
/// - otherwise, `max_delay > delay` selects a uniform draw from
///   `[delay, max_delay]`.
/// - otherwise, a fixed pause of `delay`.
///
/// The default `delay` here is 1000 ms; the programmatic
/// [`ExponentialBackoff`] defaults to a 100 ms initial interval instead.
/// Both defaults are deliberate and this is the only place they meet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffOptions {
    /// Fixed delay, initial interval, or uniform minimum, by context.
    pub delay: Duration,
    /// Uniform maximum or exponential ceiling; ignored unless it exceeds
    /// `delay`.
    pub max_delay: Duration,
    /// Growth factor; values above `1` select exponential backoff.
    pub multiplier: f64,
    /// Selects the jitter variant of exponential backoff.
    pub random: bool,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            max_delay: Duration::ZERO,
            multiplier: 0.0,
            random: false,
        }
    }
}

/// The engine configuration was contradictory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// `retry_on` and `no_retry_on` cannot be combined: a rule list is
    /// either a whitelist or a blacklist.
    #[error("retry_on and no_retry_on cannot be combined")]
    MixedRetryRules,

    /// A custom policy replaces the built-in rule handling, so fault-type
    /// rules cannot be combined with it.
    #[error("a custom policy cannot be combined with fault-type rules")]
    PolicyConflict,
}

enum Rules {
    Unset,
    Accepting(BinaryClassifierBuilder),
    Rejecting(BinaryClassifierBuilder),
}

enum BackoffChoice<E> {
    Unset,
    Policy(Arc<dyn BackoffPolicy<E>>),
    Options(BackoffOptions),
}

/// Configures and builds a [`Retrier`].
///
/// This is the declarative surface of the engine: fault-type rules, the
/// attempt bound, the backoff record, a label for statistics, listeners, and
/// the circuit-breaker specialization all live here.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use mulligan::Retrier;
///
/// let retrier: Retrier<std::io::Error> = Retrier::builder()
///     .max_attempts(4)
///     .retry_on::<std::io::Error>()
///     .exponential_backoff(Duration::from_millis(100), 2.0, Duration::from_secs(5))
///     .label("transfer")
///     .build()?;
/// # Ok::<(), mulligan::BuildError>(())
/// ```
pub struct RetrierBuilder<E> {
    max_attempts: u32,
    custom_policy: Option<Arc<dyn RetryPolicy<E>>>,
    rules: Rules,
    mixed_rules: bool,
    traverse_causes: bool,
    not_recoverable: Option<BinaryClassifierBuilder>,
    predicate: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    backoff: BackoffChoice<E>,
    sleeper: Option<Arc<dyn Sleeper>>,
    listeners: Vec<Arc<dyn RetryListener<E>>>,
    label: Option<Arc<str>>,
    cache: Option<Arc<dyn ContextCache<E>>>,
    timeout: Option<Duration>,
    breaker: Option<(Duration, Duration)>,
    clock: Clock,
}

impl<E> Debug for RetrierBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrierBuilder")
            .field("max_attempts", &self.max_attempts)
            .field("label", &self.label)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<E> RetrierBuilder<E>
where
    E: Error + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            max_attempts: 3,
            custom_policy: None,
            rules: Rules::Unset,
            mixed_rules: false,
            traverse_causes: false,
            not_recoverable: None,
            predicate: None,
            backoff: BackoffChoice::Unset,
            sleeper: None,
            listeners: Vec::new(),
            label: None,
            cache: None,
            timeout: None,
            breaker: None,
            clock: Clock::new(),
        }
    }

    /// Sets the attempt bound, including the initial attempt. Default `3`.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Retries only faults whose type chain contains a `T` (whitelist).
    #[must_use]
    pub fn retry_on<T: Error + 'static>(mut self) -> Self {
        self.rules = match self.rules {
            Rules::Unset => Rules::Accepting(BinaryClassifier::accepting().on::<T>()),
            Rules::Accepting(rules) => Rules::Accepting(rules.on::<T>()),
            rejecting @ Rules::Rejecting(_) => {
                self.mixed_rules = true;
                rejecting
            }
        };
        self
    }

    /// Retries every fault except those of type `T` (blacklist).
    #[must_use]
    pub fn no_retry_on<T: Error + 'static>(mut self) -> Self {
        self.rules = match self.rules {
            Rules::Unset => Rules::Rejecting(BinaryClassifier::rejecting().on::<T>()),
            Rules::Rejecting(rules) => Rules::Rejecting(rules.on::<T>()),
            accepting @ Rules::Accepting(_) => {
                self.mixed_rules = true;
                accepting
            }
        };
        self
    }

    /// Probes fault `source()` chains when matching fault-type rules.
    #[must_use]
    pub fn traverse_causes(mut self) -> Self {
        self.traverse_causes = true;
        self
    }

    /// Marks faults of type `T` as not recoverable: they end the execution
    /// immediately and skip any recovery path.
    #[must_use]
    pub fn not_recoverable<T: Error + 'static>(mut self) -> Self {
        self.not_recoverable = Some(match self.not_recoverable {
            None => BinaryClassifier::accepting().on::<T>(),
            Some(rules) => rules.on::<T>(),
        });
        self
    }

    /// ANDs the retry decision with a predicate over the last fault.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Replaces the whole policy assembly with a custom policy.
    #[must_use]
    pub fn policy(mut self, policy: impl RetryPolicy<E> + 'static) -> Self {
        self.custom_policy = Some(Arc::new(policy));
        self
    }

    /// Pauses a fixed `delay` between attempts.
    #[must_use]
    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.backoff = BackoffChoice::Options(BackoffOptions {
            delay,
            ..BackoffOptions::default()
        });
        self
    }

    /// Pauses a uniformly drawn period from `[min, max]` between attempts.
    #[must_use]
    pub fn uniform_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = BackoffChoice::Options(BackoffOptions {
            delay: min,
            max_delay: max,
            ..BackoffOptions::default()
        });
        self
    }

    /// Pauses exponentially growing periods between attempts.
    #[must_use]
    pub fn exponential_backoff(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.backoff = BackoffChoice::Options(BackoffOptions {
            delay: initial,
            max_delay: max,
            multiplier,
            random: false,
        });
        self
    }

    /// As [`exponential_backoff`][Self::exponential_backoff], with jitter.
    #[must_use]
    pub fn exponential_random_backoff(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.backoff = BackoffChoice::Options(BackoffOptions {
            delay: initial,
            max_delay: max,
            multiplier,
            random: true,
        });
        self
    }

    /// Applies a declarative backoff record.
    #[must_use]
    pub fn backoff_options(mut self, options: BackoffOptions) -> Self {
        self.backoff = BackoffChoice::Options(options);
        self
    }

    /// No pause between attempts. This is the default.
    #[must_use]
    pub fn no_backoff(mut self) -> Self {
        self.backoff = BackoffChoice::Policy(Arc::new(NoBackoff));
        self
    }

    /// Replaces the backoff assembly with a custom policy.
    #[must_use]
    pub fn backoff(mut self, backoff: impl BackoffPolicy<E> + 'static) -> Self {
        self.backoff = BackoffChoice::Policy(Arc::new(backoff));
        self
    }

    /// Replaces the sleeper used by builder-assembled backoff policies.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Bounds the whole attempt series by wall-clock time.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wraps the policy in a circuit breaker. Implies stateful usage: share
    /// one state key per protected resource so callers share the circuit.
    #[must_use]
    pub fn circuit_breaker(mut self, open_timeout: Duration, reset_timeout: Duration) -> Self {
        self.breaker = Some((open_timeout, reset_timeout));
        self
    }

    /// Labels executions for statistics reporting.
    #[must_use]
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Registers a lifecycle listener; listeners keep registration order.
    #[must_use]
    pub fn listener(mut self, listener: impl RetryListener<E> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Replaces the context cache used by stateful executions.
    #[must_use]
    pub fn cache(mut self, cache: impl ContextCache<E> + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Replaces the clock used by time-bounded policies.
    #[must_use]
    pub fn with_clock(mut self, clock: &Clock) -> Self {
        self.clock = clock.clone();
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when the configuration is contradictory.
    pub fn build(self) -> Result<Retrier<E>, BuildError> {
        if self.mixed_rules {
            return Err(BuildError::MixedRetryRules);
        }

        let has_rules = !matches!(self.rules, Rules::Unset) || self.not_recoverable.is_some();
        let policy: Arc<dyn RetryPolicy<E>> = match self.custom_policy {
            Some(custom) => {
                if has_rules {
                    return Err(BuildError::PolicyConflict);
                }
                custom
            }
            None => {
                let mut simple = SimplePolicy::new(self.max_attempts);

                let classifier = match self.rules {
                    Rules::Unset => None,
                    Rules::Accepting(rules) | Rules::Rejecting(rules) => {
                        let rules = if self.traverse_causes { rules.traverse_causes() } else { rules };
                        Some(rules.build())
                    }
                };
                if let Some(classifier) = classifier {
                    simple = simple.retryable(classifier);
                }
                if let Some(rules) = self.not_recoverable {
                    let rules = if self.traverse_causes { rules.traverse_causes() } else { rules };
                    simple = simple.not_recoverable(rules.build());
                }

                let mut policy: Arc<dyn RetryPolicy<E>> = Arc::new(simple);
                if let Some(predicate) = self.predicate {
                    policy = Arc::new(GatedPolicy::new(policy, move |fault: &E| predicate(fault)));
                }
                if let Some(timeout) = self.timeout {
                    policy = Arc::new(CompositePolicy::pessimistic(vec![
                        policy,
                        Arc::new(TimeoutPolicy::new(timeout).with_clock(&self.clock)),
                    ]));
                }
                policy
            }
        };

        let policy: Arc<dyn RetryPolicy<E>> = match self.breaker {
            Some((open_timeout, reset_timeout)) => Arc::new(
                CircuitBreakerPolicy::new(policy)
                    .open_timeout(open_timeout)
                    .reset_timeout(reset_timeout)
                    .with_clock(&self.clock),
            ),
            None => policy,
        };

        let backoff: Arc<dyn BackoffPolicy<E>> = match self.backoff {
            BackoffChoice::Policy(backoff) => backoff,
            BackoffChoice::Unset => Arc::new(NoBackoff),
            BackoffChoice::Options(options) => resolve_backoff(options, self.sleeper.as_ref()),
        };

        let cache = self.cache.unwrap_or_else(|| Arc::new(InMemoryContextCache::default()));

        Ok(Retrier::new(policy, backoff, self.listeners, cache, self.label))
    }
}

fn resolve_backoff<E>(options: BackoffOptions, sleeper: Option<&Arc<dyn Sleeper>>) -> Arc<dyn BackoffPolicy<E>>
where
    E: Send + Sync + 'static,
{
    if options.multiplier > 1.0 {
        let ceiling = if options.max_delay > options.delay {
            options.max_delay
        } else {
            ExponentialBackoff::default_max_interval()
        };

        if options.random {
            let mut backoff = ExponentialRandomBackoff::new(options.delay).multiplier(options.multiplier).max_interval(ceiling);
            if let Some(sleeper) = sleeper {
                backoff = backoff.with_sleeper(Arc::clone(sleeper));
            }
            return Arc::new(backoff);
        }

        let mut backoff = ExponentialBackoff::new(options.delay).multiplier(options.multiplier).max_interval(ceiling);
        if let Some(sleeper) = sleeper {
            backoff = backoff.with_sleeper(Arc::clone(sleeper));
        }
        return Arc::new(backoff);
    }

    if options.max_delay > options.delay {
        let mut backoff = UniformRandomBackoff::new(options.delay, options.max_delay);
        if let Some(sleeper) = sleeper {
            backoff = backoff.with_sleeper(Arc::clone(sleeper));
        }
        return Arc::new(backoff);
    }

    let mut backoff = FixedBackoff::new(options.delay);
    if let Some(sleeper) = sleeper {
        backoff = backoff.with_sleeper(Arc::clone(sleeper));
    }
    Arc::new(backoff)
}
