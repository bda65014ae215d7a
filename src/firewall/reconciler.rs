// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired state of the bastion SSH rule.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{info, warn};

use super::{bastion_rule_name, bastion_tag, Allowed, Direction, FirewallClient, FirewallRule};
use crate::constants::{
    ANNOTATION_BASTION_ALLOWLIST, BASTION_RULE_DESCRIPTION, PORT_SSH, PROTOCOL_TCP,
};
use crate::context::RequestContext;
use crate::crd::GCPCluster;
use crate::errors::Result;

/// Computes the bastion rule of a cluster and pushes it through a [`FirewallClient`].
#[derive(Clone)]
pub struct RuleReconciler {
    default_bastion_allowlist: Vec<String>,
    client: Arc<dyn FirewallClient>,
}

impl RuleReconciler {
    /// # Arguments
    ///
    /// * `default_bastion_allowlist` - CIDRs allowed on every cluster, appended after
    ///   the annotation ranges
    /// * `client` - Firewall client used to apply and delete the rule
    pub fn new(default_bastion_allowlist: Vec<String>, client: Arc<dyn FirewallClient>) -> Self {
        Self {
            default_bastion_allowlist,
            client,
        }
    }

    /// Build the desired bastion rule for a cluster.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the bastion allow-list annotation is blank or
    /// contains an invalid CIDR.
    pub fn desired_rule(&self, ctx: &RequestContext, cluster: &GCPCluster) -> Result<FirewallRule> {
        let cluster_name = cluster.name_any();

        let mut source_ranges = match cluster.allowlist(ANNOTATION_BASTION_ALLOWLIST)? {
            Some(ranges) => ranges,
            None => {
                info!(
                    cluster = %ctx.cluster,
                    "Cluster does not have bastion allow list annotation. Using default allow list"
                );
                Vec::new()
            }
        };
        source_ranges.extend(self.default_bastion_allowlist.iter().cloned());

        if source_ranges.is_empty() {
            warn!(
                cluster = %ctx.cluster,
                "Bastion rule has no source ranges; the cloud default applies"
            );
        }

        Ok(FirewallRule {
            name: bastion_rule_name(&cluster_name),
            description: BASTION_RULE_DESCRIPTION.to_string(),
            direction: Direction::Ingress,
            allowed: vec![Allowed {
                ip_protocol: PROTOCOL_TCP.to_string(),
                ports: vec![PORT_SSH],
            }],
            target_tags: vec![bastion_tag(&cluster_name)],
            source_ranges,
        })
    }

    /// Apply the bastion rule of a cluster.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any remote call if the annotation is
    /// malformed, otherwise whatever the firewall client returns.
    pub async fn reconcile(&self, ctx: &RequestContext, cluster: &GCPCluster) -> Result<()> {
        let rule = self.desired_rule(ctx, cluster)?;
        self.client.apply_rule(ctx, cluster, &rule).await
    }

    /// Delete the bastion rule of a cluster.
    ///
    /// # Errors
    ///
    /// Returns whatever the firewall client returns; a missing rule is not an error.
    pub async fn reconcile_delete(&self, ctx: &RequestContext, cluster: &GCPCluster) -> Result<()> {
        let name = bastion_rule_name(&cluster.name_any());
        self.client.delete_rule(ctx, cluster, &name).await
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
