//! Bounded-concurrency fan-out.
//!
//! Applies an async operation to every item of a collection while keeping at
//! most `limit` operations outstanding. All futures are polled on the
//! caller's task: operations interleave at their await points but never run
//! in parallel.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::warn;

/// What the executor does once an operation has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop submitting new items; let in-flight operations finish.
    #[default]
    FailFast,
    /// Keep submitting every item; report the first failure at the end.
    ContinueOnError,
}

/// Options for [`for_each_limited_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForEachOptions {
    /// Maximum number of outstanding operations.
    pub limit: usize,
    /// Failure handling.
    #[serde(default)]
    pub policy: FailurePolicy,
}

impl ForEachOptions {
    /// Creates fail-fast options with the given limit.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            policy: FailurePolicy::FailFast,
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for ForEachOptions {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Runs `operation` over `items` with at most `limit` invocations in flight.
///
/// Items are submitted in iteration order, each exactly once. If an
/// invocation fails, no further items are submitted, invocations already in
/// flight run to completion, and the first error is returned.
pub async fn for_each_limited<I, F, Fut, E>(items: I, limit: usize, operation: F) -> Result<(), E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    for_each_limited_with(items, ForEachOptions::new(limit), operation).await
}

/// Like [`for_each_limited`], with an explicit [`FailurePolicy`].
pub async fn for_each_limited_with<I, F, Fut, E>(
    items: I,
    options: ForEachOptions,
    mut operation: F,
) -> Result<(), E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let limit = options.limit.max(1);
    let mut pending = items.into_iter();
    let mut in_flight = FuturesUnordered::new();
    let mut first_error: Option<E> = None;
    let mut failures = 0usize;

    loop {
        let accepting = first_error.is_none() || options.policy == FailurePolicy::ContinueOnError;
        while accepting && in_flight.len() < limit {
            match pending.next() {
                Some(item) => in_flight.push(operation(item)),
                None => break,
            }
        }

        match in_flight.next().await {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                failures += 1;
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    warn!(error = %err, "Additional fan-out operation failed");
                }
            }
            None => break,
        }
    }

    match first_error {
        Some(err) => {
            if failures > 1 {
                warn!(failures, "Fan-out finished with multiple failures");
            }
            Err(err)
        }
        None => Ok(()),
    }
}
