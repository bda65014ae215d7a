// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Request-scoped context threaded through every reconciliation.
//!
//! Each reconciliation receives its own [`RequestContext`] carrying:
//! - the identity of the cluster being reconciled, used as the structured
//!   logging key by every component
//! - a cancellation token; every remote call is raced against it
//!
//! Nothing in here is shared between reconciliations of different clusters.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::errors::{Error, Result};

/// Context of a single reconciliation.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// `namespace/name` of the cluster being reconciled
    pub cluster: String,

    cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context for `namespace/name` driven by the given token.
    pub fn new(namespace: &str, name: &str, cancel: CancellationToken) -> Self {
        Self {
            cluster: format!("{namespace}/{name}"),
            cancel,
        }
    }

    /// Create a context that is never cancelled.
    pub fn background(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Whether the reconciliation has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with [`Error::Cancelled`] if the reconciliation has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Run a remote call, aborting it if the reconciliation is cancelled.
    ///
    /// A token that has already fired short-circuits before the call is started,
    /// so a cancelled reconciliation never issues new mutations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token fires first, or the call's own error.
    pub async fn run<T, E, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = call => result.map_err(Into::into),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
