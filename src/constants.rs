// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the CAPG firewall operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Kubernetes Metadata Constants
// ============================================================================

/// Finalizer guarding both the bastion firewall rule and the API security policy
pub const FINALIZER_FIREWALL: &str = "capg-firewall-rule-operator.finalizers.giantswarm.io";

/// Annotation carrying a comma-separated list of CIDRs allowed to reach the bastion over SSH
pub const ANNOTATION_BASTION_ALLOWLIST: &str = "bastion.gcp.giantswarm.io/allowlist";

/// Annotation carrying a comma-separated list of CIDRs allowed to reach the Kubernetes API
pub const ANNOTATION_API_ALLOWLIST: &str = "api.gcp.giantswarm.io/allowlist";

/// Cluster API annotation marking an infrastructure cluster as paused
pub const ANNOTATION_PAUSED: &str = "cluster.x-k8s.io/paused";

/// API group of the Cluster API core resources
pub const CAPI_GROUP: &str = "cluster.x-k8s.io";

/// Kind name of the Cluster API `Cluster` resource
pub const KIND_CLUSTER: &str = "Cluster";

/// Kind name of the Cluster API GCP infrastructure cluster
pub const KIND_GCP_CLUSTER: &str = "GCPCluster";

// ============================================================================
// Firewall Rule Constants
// ============================================================================

/// Protocol allowed by the bastion firewall rule
pub const PROTOCOL_TCP: &str = "tcp";

/// SSH port opened on the bastion host
pub const PORT_SSH: u32 = 22;

/// Description attached to the bastion firewall rule
pub const BASTION_RULE_DESCRIPTION: &str = "allow port 22 for SSH";

// ============================================================================
// Security Policy Constants
// ============================================================================

/// Priority of the rule built from the API allow-list annotation
pub const PRIORITY_USER_ALLOWLIST: i32 = 0;

/// Priority of the rule allowing the management cluster NAT IPs
pub const PRIORITY_MANAGEMENT_CLUSTER_NAT: i32 = 1;

/// Priority of the rule built from the operator-configured default allow-list
pub const PRIORITY_DEFAULT_ALLOWLIST: i32 = 2;

/// Priority of the implicit default rule. It can be patched but never removed.
pub const PRIORITY_DEFAULT_RULE: i32 = i32::MAX;

/// Description attached to the implicit default rule
pub const DEFAULT_RULE_DESCRIPTION: &str = "Default rule, higher priority overrides it";

/// Source range matched by the implicit default rule
pub const DEFAULT_RULE_SOURCE_RANGE: &str = "*";

/// Versioned expression used by every security policy rule matcher
pub const SECURITY_POLICY_VERSIONED_EXPR: &str = "SRC_IPS_V1";

/// Description attached to the API security policy
pub const API_POLICY_DESCRIPTION: &str = "allow IPs to connect to kubernetes api";

// ============================================================================
// GCP Compute API Constants
// ============================================================================

/// Default base URL of the Compute Engine REST API
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1/";

/// Metadata server endpoint serving access tokens for the default service account
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Header required by the GCE metadata server
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

/// Seconds before expiry at which a cached access token is refreshed
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Status reported by a finished long-running operation
pub const OPERATION_STATUS_DONE: &str = "DONE";

/// Upper bound on `wait` calls issued for a single operation
pub const MAX_OPERATION_WAIT_CALLS: u32 = 20;

/// Timeout of a single operation `wait` call (seconds)
///
/// The Compute API answers a `wait` call after at most two minutes, so this must
/// stay above that window.
pub const OPERATION_WAIT_TIMEOUT_SECS: u64 = 150;

/// Page size used when listing regional addresses
pub const ADDRESS_LIST_PAGE_SIZE: u32 = 500;

/// Timeout of a single Compute API HTTP request (seconds)
pub const GCP_HTTP_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Controller Constants
// ============================================================================

/// Name of the lease used for leader election
pub const LEADER_LEASE_NAME: &str = "capg-firewall-rule-operator-leader";

/// Lease duration for leader election (seconds)
pub const LEADER_LEASE_DURATION_SECS: u64 = 15;

/// Grace period before a lease is considered lost (seconds)
pub const LEADER_LEASE_GRACE_SECS: u64 = 5;

/// Requeue interval while a cluster is waiting on a prerequisite (seconds)
pub const WAITING_REQUEUE_SECS: u64 = 30;

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Path of the Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path of the liveness probe
pub const HEALTHZ_PATH: &str = "/healthz";

/// Path of the readiness probe
pub const READYZ_PATH: &str = "/readyz";

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
