// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers.
//!
//! The operator follows the standard controller pattern:
//!
//! 1. **Watch** - `GCPCluster` changes arrive through the kube runtime controller
//! 2. **Reconcile** - The desired firewall rule and security policy are computed
//!    from the cluster's annotations and the operator defaults
//! 3. **Update** - The cloud resources are brought in line through the Compute API
//!
//! # Available Reconcilers
//!
//! - [`GCPClusterReconciler`] - Applies or cleans up the bastion firewall rule and
//!   API security policy of one `GCPCluster`

pub mod gcpcluster;

pub use gcpcluster::{CleanupStage, GCPClusterReconciler, ReconcileOutcome, WaitReason};
