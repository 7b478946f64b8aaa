//! Fan-out/fan-in over independently fallible branches.
//!
//! Every branch runs concurrently and is awaited to completion; the outcomes are
//! then partitioned into successes and failures. No branch result is consumed
//! before all have settled, and a failing branch never affects its siblings.

use std::fmt;

use futures::future::{BoxFuture, join_all};
use metrics::counter;
use tracing::warn;

/// A named unit of work producing a list of values.
pub struct Branch<'a, T, E> {
    name: String,
    future: BoxFuture<'a, Result<Vec<T>, E>>,
}

impl<'a, T, E> Branch<'a, T, E> {
    pub fn new(name: impl Into<String>, future: BoxFuture<'a, Result<Vec<T>, E>>) -> Self {
        Self {
            name: name.into(),
            future,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A branch that did not produce a value.
#[derive(Debug)]
pub struct BranchFailure<E> {
    pub branch: String,
    pub error: E,
}

/// Partitioned outcome of [`settle`].
#[derive(Debug)]
pub struct Settled<T, E> {
    /// Values of the successful branches, flattened in declaration order.
    pub values: Vec<T>,
    pub failures: Vec<BranchFailure<E>>,
}

impl<T, E> Settled<T, E> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_branches(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|failure| failure.branch.as_str())
            .collect()
    }
}

impl<T, E: fmt::Display> Settled<T, E> {
    /// Emit one warning per failed branch.
    pub fn log_failures(&self, scope: &str) {
        for failure in &self.failures {
            warn!(
                target = "sitemapd::settle",
                scope,
                branch = failure.branch.as_str(),
                error = %failure.error,
                "branch failed; excluded from result"
            );
            counter!("sitemapd_branch_failure_total").increment(1);
        }
    }
}

/// Run every branch concurrently and partition the outcomes.
pub async fn settle<'a, T, E>(branches: Vec<Branch<'a, T, E>>) -> Settled<T, E> {
    let (names, futures): (Vec<_>, Vec<_>) = branches
        .into_iter()
        .map(|branch| (branch.name, branch.future))
        .unzip();

    let outcomes = join_all(futures).await;

    let mut values = Vec::new();
    let mut failures = Vec::new();
    for (branch, outcome) in names.into_iter().zip(outcomes) {
        match outcome {
            Ok(mut batch) => values.append(&mut batch),
            Err(error) => failures.push(BranchFailure { branch, error }),
        }
    }

    Settled { values, failures }
}

/// [`settle`], log the failures under `scope` and keep only the values.
pub async fn settle_values<'a, T, E: fmt::Display>(
    scope: &str,
    branches: Vec<Branch<'a, T, E>>,
) -> Vec<T> {
    let settled = settle(branches).await;
    settled.log_failures(scope);
    settled.values
}
