// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Display};

use regex::Regex;

use crate::Classifier;

/// Classifies by matching regular expressions against the rendered fault.
///
/// Patterns are tried in registration order against the fault's `Display`
/// output; the first match decides. Useful at boundaries where faults arrive
/// as text, such as driver error strings or status lines relayed by a peer.
///
/// # Examples
///
/// ```rust
/// use triage::{Classifier, PatternClassifier};
///
/// let classifier = PatternClassifier::builder(false)
///     .rule("(?i)timed? ?out", true)
///     .rule("connection reset", true)
///     .build()?;
///
/// let fault = std::io::Error::other("operation timed out");
/// assert!(classifier.classify(Some(&fault)));
/// # Ok::<(), regex::Error>(())
/// ```
pub struct PatternClassifier<C> {
    rules: Vec<(Regex, C)>,
    default: C,
}

impl<C: Debug> Debug for PatternClassifier<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternClassifier")
            .field("rules", &self.rules.iter().map(|(regex, _)| regex.as_str()).collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

impl<C> PatternClassifier<C>
where
    C: Clone + Send + Sync,
{
    /// Starts building a classifier that falls back to `default`.
    #[must_use]
    pub fn builder(default: C) -> PatternClassifierBuilder<C> {
        PatternClassifierBuilder {
            rules: Vec::new(),
            default,
        }
    }
}

impl<E, C> Classifier<E, C> for PatternClassifier<C>
where
    E: Display + Send + Sync,
    C: Clone + Send + Sync,
{
    fn classify(&self, fault: Option<&E>) -> C {
        let Some(fault) = fault else {
            return self.default.clone();
        };

        let rendered = fault.to_string();
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(&rendered))
            .map_or_else(|| self.default.clone(), |(_, value)| value.clone())
    }
}

/// Builder for [`PatternClassifier`].
#[derive(Debug)]
pub struct PatternClassifierBuilder<C> {
    rules: Vec<(String, C)>,
    default: C,
}

impl<C> PatternClassifierBuilder<C>
where
    C: Clone + Send + Sync,
{
    /// Adds a pattern; patterns are tried in the order they were added.
    #[must_use]
    pub fn rule(mut self, pattern: impl Into<String>, value: C) -> Self {
        self.rules.push((pattern.into(), value));
        self
    }

    /// Compiles the patterns and finishes the builder.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`regex::Error`] when a pattern does not
    /// compile.
    pub fn build(self) -> Result<PatternClassifier<C>, regex::Error> {
        let rules = self
            .rules
            .into_iter()
            .map(|(pattern, value)| Ok((Regex::new(&pattern)?, value)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(PatternClassifier {
            rules,
            default: self.default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(message: &str) -> std::io::Error {
        std::io::Error::other(message.to_string())
    }

    #[test]
    fn first_matching_pattern_wins() {
        let classifier = PatternClassifier::builder(0u8)
            .rule("reset", 1)
            .rule("connection reset", 2)
            .build()
            .expect("patterns compile");

        assert_eq!(classifier.classify(Some(&fault("connection reset by peer"))), 1);
    }

    #[test]
    fn no_match_yields_default() {
        let classifier = PatternClassifier::builder(7u8).rule("timeout", 1).build().expect("patterns compile");

        assert_eq!(classifier.classify(Some(&fault("permission denied"))), 7);
        assert_eq!(Classifier::<std::io::Error, u8>::classify(&classifier, None), 7);
    }

    #[test]
    fn invalid_pattern_reports_build_error() {
        let result = PatternClassifier::builder(false).rule("(unclosed", true).build();
        assert!(result.is_err());
    }
}
