// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`FirewallClient`] backed by the Compute Engine firewalls API.
//!
//! Apply inserts the rule. If it already exists, the remote rule is fetched and
//! replaced only when its source ranges, allowed entries or target tags differ,
//! so re-applying an unchanged rule costs one insert and one read.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::info;

use super::{FirewallClient, FirewallRule};
use crate::context::RequestContext;
use crate::crd::GCPCluster;
use crate::errors::{Error, Result};
use crate::gcp::types::{Firewall, FirewallAllowed};
use crate::gcp::ComputeClient;
use crate::metrics;

const RESOURCE_TYPE: &str = "firewall_rule";

/// Firewall client talking to the Compute Engine REST API.
#[derive(Clone, Debug)]
pub struct GcpFirewallClient {
    compute: ComputeClient,
}

impl GcpFirewallClient {
    pub fn new(compute: ComputeClient) -> Self {
        Self { compute }
    }

    async fn update_if_changed(
        &self,
        ctx: &RequestContext,
        project: &str,
        desired: &Firewall,
    ) -> Result<()> {
        let path = firewall_path(project, &desired.name);
        let current: Firewall = ctx.run(self.compute.get(&path)).await?;

        if !needs_update(&current, desired) {
            info!(
                cluster = %ctx.cluster,
                name = %desired.name,
                "No changes detected, not updating firewall rule"
            );
            return Ok(());
        }

        info!(
            cluster = %ctx.cluster,
            name = %desired.name,
            "Changes detected, updating firewall rule"
        );
        let op = ctx.run(self.compute.put(&path, desired)).await?;
        ctx.run(self.compute.wait_operation(project, op)).await?;
        metrics::record_cloud_mutation(RESOURCE_TYPE, "updated");

        info!(cluster = %ctx.cluster, name = %desired.name, "Firewall rule updated");
        Ok(())
    }
}

#[async_trait]
impl FirewallClient for GcpFirewallClient {
    async fn apply_rule(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        rule: &FirewallRule,
    ) -> Result<()> {
        let project = cluster.spec.project.as_str();
        let desired = to_gcp_firewall(cluster, rule);

        info!(cluster = %ctx.cluster, name = %rule.name, "Applying firewall rule");

        let created = ctx
            .run(self.compute.post(&firewalls_path(project), &[], &desired))
            .await;
        let op = match created {
            Ok(op) => op,
            Err(Error::Gcp(e)) if e.is_conflict() => {
                info!(cluster = %ctx.cluster, name = %rule.name, "Firewall rule already exists");
                return self.update_if_changed(ctx, project, &desired).await;
            }
            Err(e) => return Err(e),
        };

        match ctx.run(self.compute.wait_operation(project, op)).await {
            Ok(()) => {
                metrics::record_cloud_mutation(RESOURCE_TYPE, "created");
                info!(cluster = %ctx.cluster, name = %rule.name, "Created firewall rule");
                Ok(())
            }
            // Lost a race against a concurrent insert of the same rule.
            Err(Error::Gcp(e)) if e.is_conflict() => {
                info!(
                    cluster = %ctx.cluster,
                    name = %rule.name,
                    "Firewall rule created concurrently"
                );
                self.update_if_changed(ctx, project, &desired).await
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_rule(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        name: &str,
    ) -> Result<()> {
        let project = cluster.spec.project.as_str();

        info!(cluster = %ctx.cluster, name = %name, "Deleting firewall rule");

        let op = match ctx.run(self.compute.delete(&firewall_path(project, name))).await {
            Ok(op) => op,
            Err(e) if e.is_not_found() => {
                info!(cluster = %ctx.cluster, name = %name, "Firewall rule already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match ctx.run(self.compute.wait_operation(project, op)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        metrics::record_cloud_mutation(RESOURCE_TYPE, "deleted");
        info!(cluster = %ctx.cluster, name = %name, "Deleted firewall rule");
        Ok(())
    }
}

fn firewalls_path(project: &str) -> String {
    format!("projects/{project}/global/firewalls")
}

fn firewall_path(project: &str, name: &str) -> String {
    format!("projects/{project}/global/firewalls/{name}")
}

/// Wire representation of a rule, attached to the cluster network.
pub(crate) fn to_gcp_firewall(cluster: &GCPCluster, rule: &FirewallRule) -> Firewall {
    Firewall {
        name: rule.name.clone(),
        description: rule.description.clone(),
        direction: rule.direction.as_str().to_string(),
        network: cluster.network_self_link().map(str::to_string),
        allowed: rule
            .allowed
            .iter()
            .map(|a| FirewallAllowed {
                ip_protocol: a.ip_protocol.clone(),
                ports: a.ports.iter().map(u32::to_string).collect(),
            })
            .collect(),
        target_tags: rule.target_tags.clone(),
        source_ranges: rule.source_ranges.clone(),
    }
}

/// Whether the remote rule differs from the desired one in what the operator manages.
///
/// Source ranges and target tags compare as sets; the API does not preserve order.
pub(crate) fn needs_update(current: &Firewall, desired: &Firewall) -> bool {
    let as_set = |v: &[String]| v.iter().cloned().collect::<BTreeSet<_>>();

    as_set(&current.source_ranges) != as_set(&desired.source_ranges)
        || as_set(&current.target_tags) != as_set(&desired.target_tags)
        || current.allowed != desired.allowed
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
