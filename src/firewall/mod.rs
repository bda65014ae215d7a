// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bastion SSH firewall rule.
//!
//! Every workload cluster gets one ingress rule, `allow-<cluster>-bastion-ssh`,
//! opening TCP/22 on instances tagged `<cluster>-bastion` to the CIDRs from the
//! bastion allow-list annotation plus the operator-wide default list.
//!
//! - [`RuleReconciler`] - computes the desired rule and hands it to a [`FirewallClient`]
//! - [`GcpFirewallClient`] - applies rules through the Compute Engine firewalls API

pub mod client;
pub mod reconciler;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::crd::GCPCluster;
use crate::errors::Result;

pub use client::GcpFirewallClient;
pub use reconciler::RuleReconciler;

/// Direction of traffic a firewall rule applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ingress,
    Egress,
}

impl Direction {
    /// Value used by the Compute API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "INGRESS",
            Self::Egress => "EGRESS",
        }
    }
}

/// One protocol and the ports allowed for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allowed {
    pub ip_protocol: String,
    pub ports: Vec<u32>,
}

/// Desired state of a firewall rule. Replaces the remote rule on every apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirewallRule {
    pub name: String,
    pub description: String,
    pub direction: Direction,
    pub allowed: Vec<Allowed>,
    pub target_tags: Vec<String>,
    pub source_ranges: Vec<String>,
}

/// Applies and deletes firewall rules for a cluster.
#[async_trait]
pub trait FirewallClient: Send + Sync {
    /// Create the rule, or bring an existing rule of the same name up to date.
    async fn apply_rule(
        &self,
        ctx: &RequestContext,
        cluster: &GCPCluster,
        rule: &FirewallRule,
    ) -> Result<()>;

    /// Delete a rule by name. A rule that does not exist is not an error.
    async fn delete_rule(&self, ctx: &RequestContext, cluster: &GCPCluster, name: &str)
        -> Result<()>;
}

/// Name of the bastion SSH rule of a cluster.
#[must_use]
pub fn bastion_rule_name(cluster_name: &str) -> String {
    format!("allow-{cluster_name}-bastion-ssh")
}

/// Network tag carried by the bastion instances of a cluster.
#[must_use]
pub fn bastion_tag(cluster_name: &str) -> String {
    format!("{cluster_name}-bastion")
}
