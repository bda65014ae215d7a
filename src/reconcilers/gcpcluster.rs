// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `GCPCluster` reconciliation.
//!
//! Gates, in order:
//! 1. the object still exists
//! 2. it is owned by a Cluster API `Cluster`
//! 3. neither the owner nor the object is paused
//!
//! Then either the delete path (deletion timestamp set) or the normal path runs.
//! The normal path waits for the network and API backend service to be reported,
//! adds the finalizer, and applies the bastion firewall rule followed by the API
//! security policy. The delete path removes the firewall rule, then the policy,
//! then the finalizer; any failure leaves the finalizer in place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::cluster_store::{ClusterStore, ObjectKey};
use crate::constants::{FINALIZER_FIREWALL, WAITING_REQUEUE_SECS};
use crate::context::RequestContext;
use crate::crd::{is_paused, GCPCluster};
use crate::errors::Result;
use crate::firewall::RuleReconciler;
use crate::security::PolicyReconciler;

/// Prerequisite the normal path is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitReason {
    Network,
    BackendService,
    Router,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::BackendService => "backend service",
            Self::Router => "router",
        })
    }
}

/// Result of a successful reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The object no longer exists
    Gone,
    /// The object has no owning `Cluster` yet
    Unowned,
    /// The object or its owner is paused
    Paused,
    /// A prerequisite is not reported yet; nothing was changed
    Waiting(WaitReason),
    /// The firewall rule and security policy are in place
    Applied,
    /// The cloud resources are gone and the finalizer removed
    Deleted,
}

impl ReconcileOutcome {
    /// Label used for this outcome in metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gone => "gone",
            Self::Unowned => "unowned",
            Self::Paused => "paused",
            Self::Waiting(_) => "waiting",
            Self::Applied => "applied",
            Self::Deleted => "deleted",
        }
    }

    /// When the object should be looked at again, or `None` to wait for a change.
    ///
    /// A waiting object is polled on a short interval; an object that is gone or
    /// fully cleaned up needs no periodic resync.
    #[must_use]
    pub fn requeue_after(self, interval: Duration) -> Option<Duration> {
        match self {
            Self::Gone | Self::Deleted => None,
            Self::Waiting(_) => Some(Duration::from_secs(WAITING_REQUEUE_SECS)),
            Self::Unowned | Self::Paused | Self::Applied => Some(interval),
        }
    }
}

/// Progress of the delete path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CleanupStage {
    #[default]
    FirewallPending,
    PolicyPending,
    FinalizerPending,
    Removed,
}

impl CleanupStage {
    fn advance(self) -> Self {
        match self {
            Self::FirewallPending => Self::PolicyPending,
            Self::PolicyPending => Self::FinalizerPending,
            Self::FinalizerPending | Self::Removed => Self::Removed,
        }
    }
}

impl fmt::Display for CleanupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FirewallPending => "firewall-pending",
            Self::PolicyPending => "policy-pending",
            Self::FinalizerPending => "finalizer-pending",
            Self::Removed => "removed",
        })
    }
}

/// Top-level reconciler for `GCPCluster` objects.
#[derive(Clone)]
pub struct GCPClusterReconciler {
    store: Arc<dyn ClusterStore>,
    firewall: RuleReconciler,
    policy: PolicyReconciler,
    require_router: bool,
}

impl GCPClusterReconciler {
    /// # Arguments
    ///
    /// * `store` - Access to `GCPCluster`/`Cluster` objects and finalizers
    /// * `firewall` - Bastion firewall rule reconciler
    /// * `policy` - API security policy reconciler
    /// * `require_router` - Also wait for the router before applying
    pub fn new(
        store: Arc<dyn ClusterStore>,
        firewall: RuleReconciler,
        policy: PolicyReconciler,
        require_router: bool,
    ) -> Self {
        Self {
            store,
            firewall,
            policy,
            require_router,
        }
    }

    /// Reconcile one `GCPCluster`.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Context of this reconciliation
    /// * `key` - Namespace and name of the `GCPCluster`
    ///
    /// # Returns
    ///
    /// What was done. Every outcome other than [`ReconcileOutcome::Applied`] and
    /// [`ReconcileOutcome::Deleted`] made no change.
    ///
    /// # Errors
    ///
    /// Returns the first error from any collaborator, unchanged. A missing
    /// `GCPCluster` is not an error.
    pub async fn reconcile(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
    ) -> Result<ReconcileOutcome> {
        ctx.check()?;

        let cluster = match self.store.get(ctx, key).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => {
                info!(cluster = %ctx.cluster, "GCP Cluster no longer exists");
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => return Err(e),
        };

        let Some(owner) = self.store.get_owner(ctx, &cluster).await? else {
            info!(cluster = %ctx.cluster, "GCP Cluster does not have an owner cluster yet");
            return Ok(ReconcileOutcome::Unowned);
        };

        if is_paused(&owner, &cluster) {
            info!(
                cluster = %ctx.cluster,
                "Infrastructure or core cluster is marked as paused. Won't reconcile"
            );
            return Ok(ReconcileOutcome::Paused);
        }

        if cluster.is_being_deleted() {
            return self.reconcile_delete(ctx, &cluster).await;
        }

        self.reconcile_normal(ctx, &cluster).await
    }

    async fn reconcile_normal(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
    ) -> Result<ReconcileOutcome> {
        if let Some(reason) = self.missing_prerequisite(cluster) {
            info!(
                cluster = %ctx.cluster,
                waiting_for = %reason,
                "GCP Cluster prerequisite not set yet"
            );
            return Ok(ReconcileOutcome::Waiting(reason));
        }

        self.store
            .add_finalizer(ctx, cluster, FINALIZER_FIREWALL)
            .await?;
        self.firewall.reconcile(ctx, cluster).await?;
        self.policy.reconcile(ctx, cluster).await?;

        info!(cluster = %ctx.cluster, "Bastion firewall rule and API security policy applied");
        Ok(ReconcileOutcome::Applied)
    }

    fn missing_prerequisite(&self, cluster: &GCPCluster) -> Option<WaitReason> {
        if cluster.network_self_link().is_none() {
            return Some(WaitReason::Network);
        }
        if cluster.backend_service_self_link().is_none() {
            return Some(WaitReason::BackendService);
        }
        if self.require_router && cluster.router_self_link().is_none() {
            return Some(WaitReason::Router);
        }
        None
    }

    async fn reconcile_delete(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
    ) -> Result<ReconcileOutcome> {
        info!(cluster = %ctx.cluster, "GCP Cluster is being deleted");

        let mut stage = CleanupStage::default();
        match self.cleanup(ctx, cluster, &mut stage).await {
            Ok(()) => {
                info!(cluster = %ctx.cluster, stage = %stage, "Cleanup finished");
                Ok(ReconcileOutcome::Deleted)
            }
            Err(e) => {
                error!(cluster = %ctx.cluster, stage = %stage, error = %e, "Cleanup blocked");
                Err(e)
            }
        }
    }

    async fn cleanup(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        stage: &mut CleanupStage,
    ) -> Result<()> {
        self.firewall.reconcile_delete(ctx, cluster).await?;
        *stage = stage.advance();

        self.policy.reconcile_delete(ctx, cluster).await?;
        *stage = stage.advance();

        self.store
            .remove_finalizer(ctx, cluster, FINALIZER_FIREWALL)
            .await?;
        *stage = stage.advance();

        Ok(())
    }
}

#[cfg(test)]
#[path = "gcpcluster_tests.rs"]
mod gcpcluster_tests;
