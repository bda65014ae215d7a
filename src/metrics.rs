// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the CAPG firewall operator.
//!
//! All metrics carry the prefix `capg_firewall_rule_operator_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcomes and duration of `GCPCluster` reconciliations
//! - **Cloud Resource Metrics** - Firewall rules, security policies and policy rules
//!   created, updated and deleted
//! - **Error Metrics** - Failed reconciliations by error category
//! - **Leader Election Metrics** - Whether this replica holds the lease
//!
//! # Example
//!
//! ```rust,no_run
//! use capg_firewall_operator::metrics::{gather_metrics, record_cloud_mutation};
//!
//! record_cloud_mutation("firewall_rule", "created");
//! let text = gather_metrics().unwrap();
//! assert!(text.contains("capg_firewall_rule_operator_cloud_mutations_total"));
//! ```

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

use crate::errors::ErrorKind;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all operator metrics
const METRICS_NAMESPACE: &str = "capg_firewall_rule_operator";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by outcome
///
/// Labels:
/// - `outcome`: `applied`, `deleted`, `waiting`, `paused`, `unowned`, `gone` or `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of GCPCluster reconciliations by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `outcome`: Same values as [`RECONCILIATION_TOTAL`]
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of GCPCluster reconciliations in seconds by outcome",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Cloud Resource Metrics
// ============================================================================

/// Total number of mutations applied to cloud resources
///
/// Labels:
/// - `resource_type`: `firewall_rule`, `security_policy` or `security_policy_rule`
/// - `operation`: `created`, `updated` or `deleted`
pub static CLOUD_MUTATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cloud_mutations_total"),
        "Total number of cloud resource mutations by resource type and operation",
    );
    let counter = CounterVec::new(opts, &["resource_type", "operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of failed reconciliations by error category
///
/// Labels:
/// - `kind`: `validation`, `precondition`, `not_ready`, `remote` or `cancelled`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of failed reconciliations by error category",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Current leader election status
///
/// Value: 1 if leader, 0 if follower
pub static LEADER_STATUS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leader election status (1 = leader, 0 = follower)",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a finished reconciliation
///
/// # Arguments
/// * `outcome` - Outcome label (e.g., `applied`, `waiting`)
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation(outcome: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `kind` - Category of the error
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(kind: ErrorKind, duration: Duration) {
    record_reconciliation("error", duration);
    ERRORS_TOTAL.with_label_values(&[kind.as_str()]).inc();
}

/// Record a mutation of a cloud resource
///
/// # Arguments
/// * `resource_type` - Kind of cloud resource (e.g., `firewall_rule`)
/// * `operation` - `created`, `updated` or `deleted`
pub fn record_cloud_mutation(resource_type: &str, operation: &str) {
    CLOUD_MUTATIONS_TOTAL
        .with_label_values(&[resource_type, operation])
        .inc();
}

/// Record whether this replica currently leads
pub fn record_leader_status(is_leader: bool) {
    LEADER_STATUS.set(if is_leader { 1.0 } else { 0.0 });
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
