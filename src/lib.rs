// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # CAPG Firewall Operator
//!
//! A Kubernetes operator that secures Cluster API GCP (CAPG) workload clusters.
//!
//! ## Overview
//!
//! For every `GCPCluster` owned by a Cluster API `Cluster`, the operator keeps two
//! cloud resources in line with the cluster's annotations and its own defaults:
//!
//! - an ingress firewall rule allowing SSH to the cluster's bastion host
//! - a Cloud Armor security policy restricting access to the Kubernetes API
//!   server, bound to the cluster's API backend service
//!
//! A finalizer on the `GCPCluster` guarantees both are removed before the object
//! goes away.
//!
//! ## Modules
//!
//! - [`crd`] - Views of the Cluster API resources the operator reads
//! - [`reconcilers`] - Top-level `GCPCluster` reconciliation
//! - [`firewall`] - Bastion firewall rule model, reconciler and GCP client
//! - [`security`] - API security policy model, rule diff, reconciler and GCP client
//! - [`nat`] - Management cluster NAT IP resolution
//! - [`gcp`] - Compute Engine REST transport
//! - [`cluster_store`] - Kubernetes access to clusters and finalizers
//! - [`context`] - Per-reconciliation context (cancellation, logging identity)
//! - [`config`] - Process configuration
//! - [`metrics`] / [`server`] - Prometheus metrics and probe endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use capg_firewall_operator::cidr::parse_comma_separated;
//!
//! let ranges = parse_comma_separated("10.0.0.0/24,172.158.0.0/24").unwrap();
//! assert_eq!(ranges.len(), 2);
//! ```

pub mod cidr;
pub mod cluster_store;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod firewall;
pub mod gcp;
pub mod metrics;
pub mod nat;
pub mod reconcilers;
pub mod security;
pub mod server;

#[cfg(test)]
pub mod testing;
