// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired state of the API server security policy.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::info;

use super::{api_policy_name, Policy, PolicyAction, PolicyRule, SecurityPolicyClient};
use crate::cluster_store::ObjectKey;
use crate::constants::{
    ANNOTATION_API_ALLOWLIST, API_POLICY_DESCRIPTION, PRIORITY_DEFAULT_ALLOWLIST,
    PRIORITY_MANAGEMENT_CLUSTER_NAT, PRIORITY_USER_ALLOWLIST,
};
use crate::context::RequestContext;
use crate::crd::GCPCluster;
use crate::errors::Result;
use crate::nat::ClusterNatIpResolver;

/// Computes the API security policy of a cluster and pushes it through a
/// [`SecurityPolicyClient`].
#[derive(Clone)]
pub struct PolicyReconciler {
    default_api_allowlist: Vec<String>,
    management_cluster: ObjectKey,
    client: Arc<dyn SecurityPolicyClient>,
    ip_resolver: Arc<dyn ClusterNatIpResolver>,
}

impl PolicyReconciler {
    pub fn new(
        default_api_allowlist: Vec<String>,
        management_cluster: ObjectKey,
        client: Arc<dyn SecurityPolicyClient>,
        ip_resolver: Arc<dyn ClusterNatIpResolver>,
    ) -> Self {
        Self {
            default_api_allowlist,
            management_cluster,
            client,
            ip_resolver,
        }
    }

    /// Build the desired policy for a cluster.
    ///
    /// The annotation is validated before the NAT IPs are resolved, so a malformed
    /// annotation fails without any remote call.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or malformed API allow-list annotation,
    /// or the resolver's error if the management cluster NAT IPs are not available.
    pub async fn desired_policy(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
    ) -> Result<Policy> {
        let mut rules = Vec::with_capacity(3);

        match cluster.allowlist(ANNOTATION_API_ALLOWLIST)? {
            Some(ranges) => rules.push(PolicyRule {
                action: PolicyAction::Allow,
                description: "allow user specified ips to connect to kubernetes api".to_string(),
                source_ranges: ranges,
                priority: PRIORITY_USER_ALLOWLIST,
            }),
            None => info!(
                cluster = %ctx.cluster,
                "Cluster does not have api allow list annotation. Skipping user rule"
            ),
        }

        let nat_ips = self.ip_resolver.get_ips(ctx, &self.management_cluster).await?;
        rules.push(PolicyRule {
            action: PolicyAction::Allow,
            description: "allow MC NAT IPs".to_string(),
            source_ranges: nat_ips,
            priority: PRIORITY_MANAGEMENT_CLUSTER_NAT,
        });

        if self.default_api_allowlist.is_empty() {
            info!(cluster = %ctx.cluster, "Default api allow list is empty. Skipping default rule");
        } else {
            rules.push(PolicyRule {
                action: PolicyAction::Allow,
                description: "allow default IP ranges".to_string(),
                source_ranges: self.default_api_allowlist.clone(),
                priority: PRIORITY_DEFAULT_ALLOWLIST,
            });
        }

        Ok(Policy {
            name: api_policy_name(&cluster.name_any()),
            description: API_POLICY_DESCRIPTION.to_string(),
            default_action: PolicyAction::Deny403,
            rules,
        })
    }

    /// Apply the API security policy of a cluster.
    ///
    /// # Errors
    ///
    /// Returns any error from building the policy, before a remote mutation, or
    /// from the security policy client.
    pub async fn reconcile(&self, ctx: &RequestContext, cluster: &GCPCluster) -> Result<()> {
        let policy = self.desired_policy(ctx, cluster).await?;
        self.client.apply_policy(ctx, cluster, &policy).await
    }

    /// Delete the API security policy of a cluster.
    ///
    /// # Errors
    ///
    /// Returns whatever the security policy client returns; a missing policy is
    /// not an error.
    pub async fn reconcile_delete(&self, ctx: &RequestContext, cluster: &GCPCluster) -> Result<()> {
        let name = api_policy_name(&cluster.name_any());
        self.client.delete_policy(ctx, cluster, &name).await
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
