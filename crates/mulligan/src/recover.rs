// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;

use crate::context::RetryContext;

/// Arguments passed to a recovery path.
#[derive(Debug)]
pub struct RecoverArgs<'a, E> {
    pub(crate) fault: Option<&'a E>,
    pub(crate) ctx: &'a RetryContext<E>,
}

impl<'a, E> RecoverArgs<'a, E> {
    /// The fault that exhausted the retries, when one is available.
    ///
    /// A short-circuited stateful execution can exhaust without a fresh
    /// fault; recovery then runs with `None`.
    #[must_use]
    pub fn fault(&self) -> Option<&'a E> {
        self.fault
    }

    /// The context of the exhausted execution.
    #[must_use]
    pub fn context(&self) -> &'a RetryContext<E> {
        self.ctx
    }
}

/// A fallback executed when retries are exhausted.
///
/// Returning `None` declines: the engine surfaces the original fault as if
/// no recovery were configured. Plain closures returning `Result<T, E>`
/// implement this trait and always accept.
pub trait Recover<T, E>: Send + Sync {
    /// Attempts to produce a fallback value.
    fn recover(&self, args: RecoverArgs<'_, E>) -> Option<Result<T, E>>;
}

impl<T, E, F> Recover<T, E> for F
where
    F: Fn(RecoverArgs<'_, E>) -> Result<T, E> + Send + Sync,
{
    fn recover(&self, args: RecoverArgs<'_, E>) -> Option<Result<T, E>> {
        Some(self(args))
    }
}

/// A set of recovery handlers dispatched by fault type.
///
/// Handlers registered with [`on`][Self::on] declare the concrete error type
/// they handle; [`any`][Self::any] registers a catch-all. Dispatch picks the
/// *closest* handler: the one whose declared type matches nearest the front
/// of the fault's [`source`][Error::source] chain (the fault itself is
/// distance zero). Catch-alls are farther than any typed match. Ties resolve
/// in registration order, so dispatch is deterministic across runs.
///
/// # Examples
///
/// ```
/// use mulligan::recover::RecoverRegistry;
///
/// let registry: RecoverRegistry<String, std::io::Error> = RecoverRegistry::new()
///     .on::<std::io::Error>(|_args| Ok("io fallback".to_string()))
///     .any(|_args| Ok("generic fallback".to_string()));
/// ```
pub struct RecoverRegistry<T, E> {
    entries: Vec<Entry<T, E>>,
}

struct Entry<T, E> {
    name: &'static str,
    matcher: Option<fn(&(dyn Error + 'static)) -> bool>,
    handler: Arc<dyn Fn(RecoverArgs<'_, E>) -> Result<T, E> + Send + Sync>,
}

impl<T, E> Debug for RecoverRegistry<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverRegistry")
            .field("handlers", &self.entries.iter().map(|entry| entry.name).collect::<Vec<_>>())
            .finish()
    }
}

impl<T, E> Default for RecoverRegistry<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> RecoverRegistry<T, E>
where
    E: Error + Send + Sync + 'static,
{
    /// An empty registry; dispatch declines every fault.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registers a handler for faults whose chain contains a `C`.
    #[must_use]
    pub fn on<C: Error + 'static>(mut self, handler: impl Fn(RecoverArgs<'_, E>) -> Result<T, E> + Send + Sync + 'static) -> Self {
        self.entries.push(Entry {
            name: std::any::type_name::<C>(),
            matcher: Some(|fault| fault.is::<C>()),
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers a catch-all handler.
    #[must_use]
    pub fn any(mut self, handler: impl Fn(RecoverArgs<'_, E>) -> Result<T, E> + Send + Sync + 'static) -> Self {
        self.entries.push(Entry {
            name: "any",
            matcher: None,
            handler: Arc::new(handler),
        });
        self
    }

    /// The distance from the fault to the first chain element the entry
    /// matches, if any. Catch-alls match at a distance past every typed one.
    fn distance(entry: &Entry<T, E>, fault: Option<&E>) -> Option<usize> {
        let Some(matcher) = entry.matcher else {
            return Some(usize::MAX);
        };

        let fault = fault?;
        let mut hop = 0usize;
        let mut current: Option<&(dyn Error + 'static)> = Some(fault);
        while let Some(err) = current {
            if matcher(err) {
                return Some(hop);
            }
            hop += 1;
            current = err.source();
        }
        None
    }
}

impl<T, E> Recover<T, E> for RecoverRegistry<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn recover(&self, args: RecoverArgs<'_, E>) -> Option<Result<T, E>> {
        let mut best: Option<(usize, &Entry<T, E>)> = None;

        for entry in &self.entries {
            let Some(distance) = Self::distance(entry, args.fault) else {
                continue;
            };
            // Strictly-closer wins; equal distance keeps the earlier entry.
            if best.is_none_or(|(best_distance, _)| distance < best_distance) {
                best = Some((distance, entry));
            }
        }

        best.map(|(_, entry)| (entry.handler)(args))
    }
}

impl<T, E> Recover<T, E> for &RecoverRegistry<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn recover(&self, args: RecoverArgs<'_, E>) -> Option<Result<T, E>> {
        (**self).recover(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("envelope")]
    struct Envelope {
        #[source]
        cause: std::io::Error,
    }

    fn args(fault: Option<&Envelope>, ctx: &RetryContext<Envelope>) -> Option<String> {
        let registry = registry();
        registry
            .recover(RecoverArgs { fault, ctx })
            .map(|result| result.expect("handlers never fail in these tests"))
    }

    fn registry() -> RecoverRegistry<String, Envelope> {
        RecoverRegistry::new()
            .any(|_| Ok("any".to_string()))
            .on::<std::io::Error>(|_| Ok("io".to_string()))
            .on::<Envelope>(|_| Ok("envelope".to_string()))
    }

    #[test]
    fn closest_chain_match_wins() {
        let ctx = RetryContext::new(None);
        let fault = Envelope {
            cause: std::io::Error::other("reset"),
        };

        // Envelope matches at distance 0, io::Error at distance 1, any last.
        assert_eq!(args(Some(&fault), &ctx).as_deref(), Some("envelope"));
    }

    #[test]
    fn typed_match_beats_catch_all() {
        let ctx = RetryContext::new(None);
        let registry: RecoverRegistry<String, Envelope> =
            RecoverRegistry::new().any(|_| Ok("any".to_string())).on::<std::io::Error>(|_| Ok("io".to_string()));
        let fault = Envelope {
            cause: std::io::Error::other("reset"),
        };

        let result = registry
            .recover(RecoverArgs {
                fault: Some(&fault),
                ctx: &ctx,
            })
            .expect("a handler matches")
            .expect("handler succeeds");
        assert_eq!(result, "io");
    }

    #[test]
    fn equal_distance_resolves_in_registration_order() {
        let ctx = RetryContext::new(None);
        let registry: RecoverRegistry<String, Envelope> = RecoverRegistry::new()
            .on::<Envelope>(|_| Ok("first".to_string()))
            .on::<Envelope>(|_| Ok("second".to_string()));
        let fault = Envelope {
            cause: std::io::Error::other("reset"),
        };

        let result = registry
            .recover(RecoverArgs {
                fault: Some(&fault),
                ctx: &ctx,
            })
            .expect("a handler matches")
            .expect("handler succeeds");
        assert_eq!(result, "first");
    }

    #[test]
    fn missing_fault_dispatches_to_the_catch_all() {
        let ctx = RetryContext::new(None);
        assert_eq!(args(None, &ctx).as_deref(), Some("any"));
    }

    #[test]
    fn no_match_declines() {
        let ctx: RetryContext<Envelope> = RetryContext::new(None);
        let registry: RecoverRegistry<String, Envelope> =
            RecoverRegistry::new().on::<std::fmt::Error>(|_| Ok("fmt".to_string()));
        let fault = Envelope {
            cause: std::io::Error::other("reset"),
        };

        assert!(
            registry
                .recover(RecoverArgs {
                    fault: Some(&fault),
                    ctx: &ctx,
                })
                .is_none()
        );
    }

    #[test]
    fn closures_always_accept() {
        let ctx: RetryContext<Envelope> = RetryContext::new(None);
        let fallback = |_args: RecoverArgs<'_, Envelope>| Ok::<_, Envelope>(17u32);

        let result = fallback
            .recover(RecoverArgs { fault: None, ctx: &ctx })
            .expect("closures accept")
            .expect("closure succeeds");
        assert_eq!(result, 17);
    }
}
