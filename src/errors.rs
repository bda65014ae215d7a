// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the CAPG firewall operator.
//!
//! This module provides:
//! - [`Error`] - the crate-wide error returned by reconcilers and collaborators
//! - [`ErrorKind`] - the category an error falls into, used for metrics and logging
//! - [`GcpError`] - failures talking to the Compute Engine REST API
//!
//! Only "not found" on delete and "already exists" on create are absorbed by the
//! collaborators; everything else reaches the controller, which requeues.

use reqwest::StatusCode;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed user or operator input; fails before any remote mutation
    Validation,
    /// Cross-resource ordering constraint violated
    Precondition,
    /// A prerequisite owned by another controller is not there yet
    NotReady,
    /// Kubernetes or GCP API failure
    Remote,
    /// The reconciliation was cancelled by the caller
    Cancelled,
}

impl ErrorKind {
    /// Label used for this category in metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Precondition => "precondition",
            Self::NotReady => "not_ready",
            Self::Remote => "remote",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Main error type for operator operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A comma-separated CIDR list contains an entry that is not a valid CIDR
    #[error("value: {value:?} contains invalid CIDRs")]
    InvalidCidrList {
        /// The full value that failed to parse
        value: String,
    },

    /// An allow-list annotation is present but carries no value
    #[error("annotation {annotation} is present but empty")]
    EmptyAllowList {
        /// The annotation key
        annotation: String,
    },

    /// A desired-state object is malformed
    #[error("invalid security policy: {reason}")]
    InvalidPolicy {
        /// What is wrong with the policy
        reason: String,
    },

    /// A security policy was applied before the backend service exists
    #[error("cluster {cluster} does not have backend service")]
    MissingBackendService {
        /// Namespaced cluster name
        cluster: String,
    },

    /// A security policy was deleted while still referenced by the backend service
    #[error("cluster {cluster} backend service not deleted yet")]
    BackendServiceStillAttached {
        /// Namespaced cluster name
        cluster: String,
    },

    /// The management cluster has no router yet
    #[error("cluster {namespace}/{name} does not have router yet")]
    RouterNotReady {
        /// Management cluster namespace
        namespace: String,
        /// Management cluster name
        name: String,
    },

    /// The management cluster router has no NAT IPs yet
    #[error("cluster {namespace}/{name} has no NAT IPs yet")]
    NoNatIps {
        /// Management cluster namespace
        namespace: String,
        /// Management cluster name
        name: String,
    },

    /// The owner reference points at a `Cluster` that does not exist
    #[error("owner cluster {namespace}/{name} not found")]
    OwnerNotFound {
        /// Owner namespace
        namespace: String,
        /// Owner name
        name: String,
    },

    /// A requested Kubernetes object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// Compute Engine API failure
    #[error("gcp error: {0}")]
    Gcp(#[from] GcpError),

    /// Kubernetes API failure
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The reconciliation was cancelled before it completed
    #[error("context canceled")]
    Cancelled,
}

impl Error {
    /// Create an invalid CIDR list error for the given value
    pub fn invalid_cidr_list(value: impl Into<String>) -> Self {
        Self::InvalidCidrList {
            value: value.into(),
        }
    }

    /// Create an invalid policy error with the given reason
    pub fn invalid_policy(reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            reason: reason.into(),
        }
    }

    /// The category this error falls into.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCidrList { .. }
            | Self::EmptyAllowList { .. }
            | Self::InvalidPolicy { .. } => ErrorKind::Validation,
            Self::MissingBackendService { .. } | Self::BackendServiceStillAttached { .. } => {
                ErrorKind::Precondition
            }
            Self::RouterNotReady { .. } | Self::NoNatIps { .. } => ErrorKind::NotReady,
            Self::OwnerNotFound { .. } | Self::NotFound { .. } | Self::Gcp(_) | Self::Kube(_) => {
                ErrorKind::Remote
            }
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error reports a missing object, locally or remotely.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::OwnerNotFound { .. } => true,
            Self::Gcp(e) => e.is_not_found(),
            Self::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}

/// Errors returned by the Compute Engine REST API.
#[derive(Debug, Error)]
pub enum GcpError {
    /// The API answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Api {
        /// HTTP status of the response
        status: StatusCode,
        /// Error message from the response body
        message: String,
        /// Machine-readable reason (e.g. `alreadyExists`), when present
        reason: Option<String>,
    },

    /// A long-running operation finished with an error
    #[error("operation {operation} failed ({status}): {message}")]
    Operation {
        /// Operation name
        operation: String,
        /// HTTP status code reported by the operation
        status: u16,
        /// Concatenated error messages of the operation
        message: String,
    },

    /// A long-running operation did not finish within the allowed wait calls
    #[error("operation {operation} still running after {calls} wait calls")]
    OperationTimeout {
        /// Operation name
        operation: String,
        /// Number of wait calls issued
        calls: u32,
    },

    /// An access token could not be obtained
    #[error("failed to obtain access token: {0}")]
    Auth(String),

    /// The request could not be sent or the response could not be read
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A URL could not be built from the configured endpoint
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl GcpError {
    /// The HTTP status code carried by the error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(status.as_u16()),
            Self::Operation { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error reports a missing resource (HTTP 404).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Whether the error reports a resource that already exists (HTTP 409).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(StatusCode::CONFLICT.as_u16())
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
