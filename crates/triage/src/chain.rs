// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Classifier;

/// Feeds the verdict of a router classifier into a mapper classifier.
///
/// The router reduces the fault to an intermediate key (typically a small
/// enum naming the fault category) and the mapper turns that key into the
/// final verdict. Composing the two keeps routing and policy lookup
/// independently testable.
///
/// # Examples
///
/// ```rust
/// use triage::{Chained, Classifier, KindClassifier};
///
/// #[derive(Debug)]
/// enum Fault {
///     Timeout,
///     Auth,
/// }
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Category {
///     Transient,
///     Permanent,
/// }
///
/// let router = KindClassifier::builder(Category::Permanent)
///     .when(|e: &Fault| matches!(e, Fault::Timeout), Category::Transient)
///     .build();
/// let mapper = KindClassifier::builder(0u32)
///     .when(|k: &Category| matches!(k, Category::Transient), 30)
///     .build();
///
/// let chained = Chained::new(router, mapper);
/// assert_eq!(chained.classify(Some(&Fault::Timeout)), 30);
/// assert_eq!(chained.classify(Some(&Fault::Auth)), 0);
/// ```
#[derive(Debug)]
pub struct Chained<R, M, K = ()> {
    router: R,
    mapper: M,
    _key: std::marker::PhantomData<fn() -> K>,
}

impl<R, M, K> Chained<R, M, K> {
    /// Combines a router and a mapper.
    pub fn new(router: R, mapper: M) -> Self {
        Self {
            router,
            mapper,
            _key: std::marker::PhantomData,
        }
    }
}

impl<E, K, C, R, M> Classifier<E, C> for Chained<R, M, K>
where
    E: ?Sized,
    K: Send + Sync,
    R: Classifier<E, K>,
    M: Classifier<K, C>,
{
    fn classify(&self, fault: Option<&E>) -> C {
        let key = fault.map(|fault| self.router.classify(Some(fault)));
        self.mapper.classify(key.as_ref())
    }
}
